//! Header field collection.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Collection of header fields keyed by canonical name.
///
/// Iteration and rendering are sorted by field name; repeated fields keep
/// the order they were added in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: BTreeMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.fields
            .entry(canonical_name(name))
            .or_default()
            .push(value.into());
    }

    /// Sets a header value, replacing any existing values.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(canonical_name(name), vec![value.into()]);
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&canonical_name(name))
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Returns true if at least one value exists for the header.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(&canonical_name(name))
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.fields.remove(&canonical_name(name));
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns an iterator over `(name, value)` pairs in rendering order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    /// Builds headers from raw header lines.
    ///
    /// Lines starting with a space or tab continue the previous field and
    /// are joined with a single space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHeader`] for a leading continuation line, a
    /// line without `:`, or an empty or whitespace-containing field name.
    pub fn from_lines<L: AsRef<[u8]>>(lines: &[L]) -> Result<Self> {
        let (headers, rejected) = Self::parse(lines);
        match rejected.into_iter().next() {
            Some(line) => Err(Error::MalformedHeader(line)),
            None => Ok(headers),
        }
    }

    /// Builds headers from raw header lines, setting aside the lines
    /// [`Headers::from_lines`] would reject.
    ///
    /// A continuation of a rejected line is rejected with it.
    #[must_use]
    pub fn from_lines_lenient<L: AsRef<[u8]>>(lines: &[L]) -> (Self, Vec<String>) {
        Self::parse(lines)
    }

    fn parse<L: AsRef<[u8]>>(lines: &[L]) -> (Self, Vec<String>) {
        let mut headers = Self::new();
        let mut rejected = Vec::new();
        let mut current: Option<(String, String)> = None;

        for raw in lines {
            let line = String::from_utf8_lossy(raw.as_ref());
            let line = line.trim_end_matches(['\r', '\n']);

            if line.starts_with(' ') || line.starts_with('\t') {
                let Some((_, value)) = current.as_mut() else {
                    rejected.push(line.to_string());
                    continue;
                };
                let more = line.trim();
                if !more.is_empty() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(more);
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(&name, value);
            }

            match line.split_once(':') {
                Some((name, value)) if is_field_name(name) => {
                    current = Some((name.to_string(), value.trim().to_string()));
                }
                _ => rejected.push(line.to_string()),
            }
        }

        if let Some((name, value)) = current {
            headers.add(&name, value);
        }

        (headers, rejected)
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

fn is_field_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(char::is_whitespace)
}

/// Canonicalizes a field name (`content-type` -> `Content-Type`).
///
/// Names containing characters outside a header token are returned as-is.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
    {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain")); // Case insensitive
    }

    #[test]
    fn test_headers_set() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com");
        headers.add("To", "bob@example.com");
        assert_eq!(headers.iter().filter(|(name, _)| *name == "To").count(), 2);

        headers.set("To", "charlie@example.com");
        assert_eq!(headers.iter().count(), 1);
        assert_eq!(headers.get("To"), Some("charlie@example.com"));
    }

    #[test]
    fn test_headers_remove() {
        let mut headers = Headers::new();
        headers.add("BCC", "hidden@example.com");
        assert!(headers.contains("Bcc"));

        headers.remove("bcc");
        assert!(!headers.contains("Bcc"));
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("content-type"), "Content-Type");
        assert_eq!(canonical_name("MESSAGE-ID"), "Message-Id");
        assert_eq!(canonical_name("bcc"), "Bcc");
        assert_eq!(canonical_name("x y"), "x y");
    }

    #[test]
    fn test_from_lines() {
        let lines = [
            "From: sender@example.com\n",
            "to: recipient@example.com\n",
            "Subject: Test Message\n",
            "Content-Type: text/plain;\n",
            " charset=utf-8\n",
        ];

        let headers = Headers::from_lines(&lines).unwrap();
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("To"), Some("recipient@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
    }

    #[test]
    fn test_from_lines_leading_continuation() {
        let err = Headers::from_lines(&[" folded\n"]).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }

    #[test]
    fn test_from_lines_bad_name() {
        assert!(Headers::from_lines(&["Bad Name: x\n"]).is_err());
        assert!(Headers::from_lines(&[": x\n"]).is_err());
    }

    #[test]
    fn test_from_lines_lenient() {
        let lines = [
            "Subject: hi\n",
            "Hi Bob: are you there\n",
            " still Bob\n",
            "no colon at all\n",
            "To: a@example.com\n",
        ];
        let (headers, rejected) = Headers::from_lines_lenient(&lines);
        assert_eq!(headers.get("Subject"), Some("hi"));
        assert_eq!(headers.get("To"), Some("a@example.com"));
        assert_eq!(
            rejected,
            ["Hi Bob: are you there", " still Bob", "no colon at all"]
        );

        let err = Headers::from_lines(&lines).unwrap_err();
        assert_eq!(err.to_string(), "malformed header line: \"Hi Bob: are you there\"");
    }

    #[test]
    fn test_display_sorted() {
        let mut headers = Headers::new();
        headers.add("to", "b@example.com");
        headers.add("subject", "hi");
        headers.add("From", "a@example.com");
        headers.add("To", "c@example.com");

        assert_eq!(
            headers.to_string(),
            "From: a@example.com\nSubject: hi\nTo: b@example.com\nTo: c@example.com\n"
        );
    }
}
