//! Structured outbound messages.

use std::path::PathBuf;

use mgrelay_mime::Address;

use crate::harvest::Harvest;

/// An email message to send through the structured endpoint.
#[derive(Debug, Clone)]
pub struct Message {
    /// Sender address.
    pub from: Address,
    /// Recipient addresses.
    pub to: Vec<Address>,
    /// CC addresses.
    pub cc: Vec<Address>,
    /// BCC addresses. Sent only as API recipient fields, never as header text.
    pub bcc: Vec<Address>,
    /// Subject line (omitted from the request when empty).
    pub subject: Vec<u8>,
    /// Plain text body, sent byte for byte.
    pub body: Vec<u8>,
    /// Files to attach, in order.
    pub attachments: Vec<PathBuf>,
}

impl Message {
    /// Creates an empty message from `from`.
    #[must_use]
    pub const fn new(from: Address) -> Self {
        Self {
            from,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: Vec::new(),
            body: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: Address) -> Self {
        self.to.push(recipient);
        self
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn cc(mut self, recipient: Address) -> Self {
        self.cc.push(recipient);
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: Address) -> Self {
        self.bcc.push(recipient);
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<Vec<u8>>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the body text.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    /// Merges fields harvested from the input header block.
    ///
    /// A harvested subject replaces the current one; recipients are appended.
    pub fn absorb(&mut self, harvest: Harvest) {
        if let Some(subject) = harvest.subject {
            self.subject = subject.into_bytes();
        }
        self.to.extend(harvest.to);
        self.cc.extend(harvest.cc);
        self.bcc.extend(harvest.bcc);
    }

    /// Returns all recipients (to, cc, bcc).
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }

    /// Returns true if there is at least one recipient.
    #[must_use]
    pub fn has_recipients(&self) -> bool {
        self.recipients().next().is_some()
    }

    /// Qualifies every bare mailbox with `domain`.
    pub fn apply_local_domain(&mut self, domain: &str) {
        self.from.apply_local_domain(domain);
        for addr in self.to.iter_mut().chain(&mut self.cc).chain(&mut self.bcc) {
            addr.apply_local_domain(domain);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_recipients() {
        let message = Message::new(Address::new("me"))
            .to(Address::new("a@example.com"))
            .cc(Address::new("b@example.com"))
            .bcc(Address::new("c@example.com"))
            .subject("hi")
            .body("hello\n")
            .attach("/tmp/a.txt");

        let all: Vec<_> = message.recipients().map(|a| a.mailbox.as_str()).collect();
        assert_eq!(all, ["a@example.com", "b@example.com", "c@example.com"]);
        assert!(message.has_recipients());
        assert_eq!(message.attachments.len(), 1);
    }

    #[test]
    fn test_apply_local_domain() {
        let mut message = Message::new(Address::new("me"))
            .to(Address::new("you"))
            .bcc(Address::new("x@other.org"));
        message.apply_local_domain("example.com");

        assert_eq!(message.from.mailbox, "me@example.com");
        assert_eq!(message.to[0].mailbox, "you@example.com");
        assert_eq!(message.bcc[0].mailbox, "x@other.org");
    }

    #[test]
    fn test_absorb() {
        let mut message = Message::new(Address::new("me")).subject("old");
        assert!(!message.has_recipients());

        message.absorb(Harvest {
            subject: Some("new".into()),
            bcc: vec![Address::new("hidden@example.com")],
            ..Harvest::default()
        });

        assert_eq!(message.subject, b"new");
        assert_eq!(message.bcc.len(), 1);
        assert!(message.has_recipients());
    }
}
