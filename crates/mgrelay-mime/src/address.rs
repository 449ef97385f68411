//! Email address types and the lenient address resolver.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Characters that force an address through the structured parsers.
const SPECIALS: &[char] = &['<', '>', '(', ')', '"', ' ', '\t', '\r', '\n'];

/// Input bytes per encoded word; keeps each word within 75 characters.
const WORD_BYTES: usize = 45;

/// A display name and mailbox pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Address {
    /// Display name (empty when absent).
    pub name: String,
    /// Mailbox (`local@domain`, or a bare local part before qualification).
    pub mailbox: String,
}

impl Address {
    /// Creates an address with no display name.
    #[must_use]
    pub fn new(mailbox: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            mailbox: mailbox.into(),
        }
    }

    /// Creates an address with a display name.
    #[must_use]
    pub fn with_name(name: impl Into<String>, mailbox: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mailbox: mailbox.into(),
        }
    }

    /// Parses a loosely formatted address.
    ///
    /// Bare mailboxes are taken as-is. `Name (comment) <addr>` is split at
    /// the last `<`, which strict grammars reject. Everything else goes
    /// through the RFC 5322 mailbox grammar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the text is empty or the strict
    /// parser rejects it.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(Error::invalid_address(text, "empty address"));
        }

        if !text.contains(SPECIALS) {
            return Ok(Self::new(text));
        }

        if text.ends_with('>') && !text.starts_with('"') {
            if let Some(i) = text.rfind('<') {
                let mailbox = &text[i + 1..text.len() - 1];
                if mailbox.is_empty() {
                    return Err(Error::invalid_address(text, "empty angle address"));
                }
                return Ok(Self::with_name(text[..i].trim(), mailbox));
            }
        }

        Self::parse_strict(text)
    }

    fn parse_strict(text: &str) -> Result<Self> {
        let mailbox = lettre::message::Mailbox::from_str(text.trim())
            .map_err(|e| Error::invalid_address(text, e.to_string()))?;

        Ok(Self {
            name: mailbox.name.unwrap_or_default(),
            mailbox: mailbox.email.to_string(),
        })
    }

    /// Parses a comma-separated address list.
    ///
    /// Commas inside quoted strings, comments and angle brackets do not
    /// split. Empty elements are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first element that fails [`Address::parse`].
    pub fn parse_list(text: &str) -> Result<Vec<Self>> {
        split_list(text)
            .into_iter()
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Appends `@domain` to a mailbox that has no domain part.
    ///
    /// Already-qualified mailboxes are left alone.
    pub fn apply_local_domain(&mut self, domain: &str) {
        if !self.mailbox.contains('@') {
            self.mailbox.push('@');
            self.mailbox.push_str(domain);
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            return f.write_str(&self.mailbox);
        }

        if self.name.chars().all(is_phrase_char) {
            write!(f, "{} <{}>", self.name, self.mailbox)
        } else if !self.name.chars().all(|c| matches!(c, ' '..='~')) {
            write!(f, "{} <{}>", encode_words(&self.name), self.mailbox)
        } else {
            f.write_str("\"")?;
            for c in self.name.chars() {
                if c == '"' || c == '\\' {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
            write!(f, "\" <{}>", self.mailbox)
        }
    }
}

// atext plus the spaces allowed between atoms
const fn is_phrase_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            ' ' | '!'
                | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

/// RFC 2047 `B` encoding, split into words at character boundaries.
fn encode_words(text: &str) -> String {
    let mut words = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if i + c.len_utf8() - start > WORD_BYTES {
            words.push(&text[start..i]);
            start = i;
        }
    }
    words.push(&text[start..]);

    words
        .iter()
        .map(|word| format!("=?utf-8?B?{}?=", STANDARD.encode(word)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_list(text: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    let mut comment = 0usize;
    let mut angle = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted || comment > 0 => escaped = true,
            '"' if comment == 0 => quoted = !quoted,
            '(' if !quoted => comment += 1,
            ')' if !quoted => comment = comment.saturating_sub(1),
            '<' if !quoted && comment == 0 => angle = true,
            '>' if !quoted && comment == 0 => angle = false,
            ',' if !quoted && comment == 0 && !angle => {
                items.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&text[start..]);
    items
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
    use proptest::prelude::*;

    #[test]
    fn test_bare_mailbox() {
        let addr = Address::parse("user@example.com").unwrap();
        assert_eq!(addr.mailbox, "user@example.com");
        assert!(addr.name.is_empty());
    }

    #[test]
    fn test_bare_local_part() {
        let addr = Address::parse("root").unwrap();
        assert_eq!(addr.mailbox, "root");
        assert!(addr.name.is_empty());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(Address::parse("").is_err());
    }

    #[test]
    fn test_name_with_comment() {
        let addr = Address::parse("Foo (Bar) <baz@quux.com>").unwrap();
        assert_eq!(addr.name, "Foo (Bar)");
        assert_eq!(addr.mailbox, "baz@quux.com");
    }

    #[test]
    fn test_last_angle_wins() {
        let addr = Address::parse("a <b> <c@example.com>").unwrap();
        assert_eq!(addr.name, "a <b>");
        assert_eq!(addr.mailbox, "c@example.com");
    }

    #[test]
    fn test_quoted_name_uses_strict_parser() {
        let addr = Address::parse("\"Doe, John\" <john@example.com>").unwrap();
        assert_eq!(addr.name, "Doe, John");
        assert_eq!(addr.mailbox, "john@example.com");
    }

    #[test]
    fn test_strict_failure() {
        let err = Address::parse("not an address").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
    }

    #[test]
    fn test_apply_local_domain() {
        let mut addr = Address::new("root");
        addr.apply_local_domain("example.com");
        assert_eq!(addr.mailbox, "root@example.com");
        assert_eq!(addr.mailbox.matches("@example.com").count(), 1);

        addr.apply_local_domain("example.com");
        assert_eq!(addr.mailbox, "root@example.com");
    }

    #[test]
    fn test_apply_local_domain_keeps_qualified() {
        let mut addr = Address::new("user@other.org");
        addr.apply_local_domain("example.com");
        assert_eq!(addr.mailbox, "user@other.org");
    }

    #[test]
    fn test_parse_list() {
        let list =
            Address::parse_list("a@example.com, \"Doe, John\" <john@example.com>,, bob").unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].mailbox, "a@example.com");
        assert_eq!(list[1].name, "Doe, John");
        assert_eq!(list[2].mailbox, "bob");
    }

    #[test]
    fn test_parse_list_empty() {
        assert!(Address::parse_list("  ").unwrap().is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(Address::new("a@example.com").to_string(), "a@example.com");
        assert_eq!(
            Address::with_name("John Doe", "john@example.com").to_string(),
            "John Doe <john@example.com>"
        );
        assert_eq!(
            Address::with_name("Doe, John", "john@example.com").to_string(),
            "\"Doe, John\" <john@example.com>"
        );
    }

    #[test]
    fn test_display_encodes_non_ascii_name() {
        assert_eq!(
            Address::with_name("José", "j@example.com").to_string(),
            "=?utf-8?B?Sm9zw6k=?= <j@example.com>"
        );
    }

    #[test]
    fn test_display_encodes_line_breaks() {
        let addr = Address::with_name("Root\nBcc: leak@evil.example", "root@example.com");
        let text = addr.to_string();
        assert!(!text.contains('\n'));
        assert!(!text.contains("Bcc:"));
        assert!(text.starts_with("=?utf-8?B?"));
        assert!(text.ends_with("?= <root@example.com>"));
    }

    #[test]
    fn test_display_splits_long_names() {
        let name = "é".repeat(40);
        let text = Address::with_name(name.as_str(), "x@example.com").to_string();
        let words: Vec<&str> = text.trim_end_matches(" <x@example.com>").split(' ').collect();
        assert_eq!(words.len(), 2);
        assert!(words.iter().all(|w| w.len() <= 75));

        let decoded: Vec<u8> = words
            .iter()
            .flat_map(|w| {
                let inner = &w["=?utf-8?B?".len()..w.len() - 2];
                STANDARD.decode(inner).unwrap()
            })
            .collect();
        assert_eq!(String::from_utf8(decoded).unwrap(), name);
    }

    proptest! {
        #[test]
        fn prop_plain_text_is_mailbox(text in "[A-Za-z0-9@._+!#$%&'*/=?^`{|}~-]{1,40}") {
            let addr = Address::parse(&text).unwrap();
            prop_assert_eq!(addr.mailbox, text);
            prop_assert!(addr.name.is_empty());
        }

        #[test]
        fn prop_local_domain_appended_once(local in "[a-z0-9._-]{1,20}") {
            let mut addr = Address::new(local.clone());
            addr.apply_local_domain("example.com");
            prop_assert_eq!(addr.mailbox, format!("{local}@example.com"));
        }
    }
}
