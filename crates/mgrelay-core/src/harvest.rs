//! Recipient and subject extraction from an input header block.

use mgrelay_mime::{Address, Headers};

use crate::error::{Error, Result};

/// Fields taken from a message's own header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Harvest {
    /// Last `Subject` value, verbatim.
    pub subject: Option<String>,
    /// Addresses from `To`.
    pub to: Vec<Address>,
    /// Addresses from `Cc`.
    pub cc: Vec<Address>,
    /// Addresses from `Bcc`.
    pub bcc: Vec<Address>,
    /// Other fields, as `Name: value`.
    pub ignored: Vec<String>,
}

impl Harvest {
    /// Extracts `Subject`, `To`, `Cc` and `Bcc` from `headers`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Address`] naming the field whose list failed to parse.
    pub fn from_headers(headers: &Headers) -> Result<Self> {
        let mut harvest = Self::default();

        for (name, value) in headers.iter() {
            let list = match name {
                "Subject" => {
                    harvest.subject = Some(value.to_string());
                    continue;
                }
                "To" => &mut harvest.to,
                "Cc" => &mut harvest.cc,
                "Bcc" => &mut harvest.bcc,
                _ => {
                    harvest.ignored.push(format!("{name}: {value}"));
                    continue;
                }
            };
            let addrs =
                Address::parse_list(value).map_err(|e| Error::address(format!("{name}: list"), e))?;
            list.extend(addrs);
        }

        Ok(harvest)
    }

    /// Returns the number of harvested recipients.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    /// Returns all harvested recipients in to, cc, bcc order.
    #[must_use]
    pub fn recipients(&self) -> Vec<Address> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .cloned()
            .collect()
    }
}

/// Fails with [`Error::NoRecipients`] when `count` is zero.
///
/// # Errors
///
/// See above.
pub fn require_recipients(count: usize) -> Result<()> {
    if count == 0 {
        Err(Error::NoRecipients)
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn headers(lines: &[&str]) -> Headers {
        Headers::from_lines(lines).unwrap()
    }

    #[test]
    fn test_harvest_fields() {
        let h = headers(&[
            "subject: first\n",
            "TO: a@example.com, b@example.com\n",
            "cc: C <c@example.com>\n",
            "Bcc: hidden@example.com\n",
            "Subject: second\n",
            "X-Mailer: test\n",
        ]);
        let harvest = Harvest::from_headers(&h).unwrap();

        assert_eq!(harvest.subject.as_deref(), Some("second"));
        assert_eq!(harvest.to.len(), 2);
        assert_eq!(harvest.cc[0].name, "C");
        assert_eq!(harvest.bcc[0].mailbox, "hidden@example.com");
        assert_eq!(harvest.ignored, ["X-Mailer: test"]);
        assert_eq!(harvest.recipient_count(), 4);
        assert_eq!(harvest.recipients()[3].mailbox, "hidden@example.com");
    }

    #[test]
    fn test_harvest_bad_list_names_field() {
        let h = headers(&["Cc: \"unterminated <x@example.com\n"]);
        let err = Harvest::from_headers(&h).unwrap_err();
        assert!(err.to_string().starts_with("cannot parse Cc: list"));
    }

    #[test]
    fn test_require_recipients() {
        let harvest = Harvest::from_headers(&headers(&["Subject: x\n"])).unwrap();
        assert!(matches!(
            require_recipients(harvest.recipient_count()),
            Err(Error::NoRecipients)
        ));
        assert!(require_recipients(1).is_ok());
    }
}
