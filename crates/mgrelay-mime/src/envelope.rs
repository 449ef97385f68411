//! Pre-formatted messages relayed as-is.

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};

use crate::address::Address;
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::ingest::LineIngest;

/// A header block plus the not-yet-read body of a message.
///
/// `Bcc` is removed on construction and can never be re-added through
/// this type.
#[derive(Debug)]
pub struct RawEnvelope<R> {
    headers: Headers,
    body: LineIngest<R>,
}

impl<R: AsyncBufRead + Unpin> RawEnvelope<R> {
    /// Creates an envelope from parsed headers and the remaining input.
    #[must_use]
    pub fn new(mut headers: Headers, body: LineIngest<R>) -> Self {
        headers.remove("Bcc");
        Self { headers, body }
    }

    /// Reads the header block from `ingest` and keeps the rest as body.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or a header line is malformed.
    pub async fn read(mut ingest: LineIngest<R>) -> Result<Self> {
        let headers = ingest.read_header().await?;
        Ok(Self::new(headers, ingest))
    }

    /// Returns the headers that will be transmitted.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Adds a `From` field if the message has none.
    pub fn ensure_from(&mut self, from: &Address) {
        if !self.headers.contains("From") {
            self.headers.set("From", from.to_string());
        }
    }

    /// Renders the header block, including the blank separator line.
    #[must_use]
    pub fn header_block(&self) -> String {
        format!("{}\n", self.headers)
    }

    /// Writes the header block and streams the body into `writer`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the body or writing fails.
    pub async fn write_to<W: AsyncWrite + Unpin>(mut self, writer: &mut W) -> Result<u64> {
        let block = self.header_block();
        writer
            .write_all(block.as_bytes())
            .await
            .map_err(Error::Write)?;
        let body = self.body.write_body(writer).await?;
        Ok(block.len() as u64 + body)
    }
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
    use crate::ingest::Termination;

    #[tokio::test]
    async fn test_bcc_removed_and_sorted() {
        let input = b"to: a@example.com\nBcc: hidden@example.com\nSubject: hi\n\nbody\n";
        let ingest = LineIngest::new(&input[..], Termination::Eof);
        let envelope = RawEnvelope::read(ingest).await.unwrap();

        assert!(!envelope.headers().contains("Bcc"));
        assert_eq!(envelope.header_block(), "Subject: hi\nTo: a@example.com\n\n");

        let mut out = Vec::new();
        let n = envelope.write_to(&mut out).await.unwrap();
        assert_eq!(out, b"Subject: hi\nTo: a@example.com\n\nbody\n".to_vec());
        assert_eq!(n, out.len() as u64);
        assert!(!String::from_utf8(out).unwrap().contains("hidden"));
    }

    #[tokio::test]
    async fn test_ensure_from() {
        let ingest = LineIngest::new(&b"hello\n"[..], Termination::Eof);
        let mut envelope = RawEnvelope::read(ingest).await.unwrap();
        envelope.ensure_from(&Address::with_name("Root", "root@example.com"));
        assert_eq!(envelope.headers().get("From"), Some("Root <root@example.com>"));

        let mut out = Vec::new();
        envelope.write_to(&mut out).await.unwrap();
        assert_eq!(out, b"From: Root <root@example.com>\n\nhello\n".to_vec());
    }

    #[tokio::test]
    async fn test_ensure_from_keeps_existing() {
        let ingest = LineIngest::new(&b"From: me@example.com\n\nx\n"[..], Termination::Eof);
        let mut envelope = RawEnvelope::read(ingest).await.unwrap();
        envelope.ensure_from(&Address::new("other@example.com"));
        assert_eq!(envelope.headers().get("From"), Some("me@example.com"));
    }
}
