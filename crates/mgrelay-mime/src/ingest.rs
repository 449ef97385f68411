//! Line ingestion state machine.
//!
//! Turns sendmail-style input into a header block and a body stream. Three
//! things are ambiguous in that input and are settled here:
//!
//! - where the message ends (`.` on a line by itself, or end of stream),
//! - where the header block ends (the first line that is neither a field
//!   nor a continuation),
//! - whether a line is complete (a final line may lack its newline).
//!
//! ```text
//! ┌──────────┐  non-field line  ┌────────┐
//! │ InHeader │ ───────────────→ │ InBody │
//! └──────────┘                  └────────┘
//!       │     "." (Dot policy) / EOF  │
//!       └──────────→ Terminated ←─────┘
//! ```

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::header::Headers;

const NEWLINE: &[u8] = b"\n";
const DOT_LINE: &[u8] = b".\n";

/// How the end of a message is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A line holding only `.` ends the message (interactive terminal).
    Dot,
    /// Terminal input where dot lines are ordinary text (`-i`).
    IgnoreDots,
    /// Only end of stream ends the message (piped input).
    Eof,
}

impl Termination {
    /// Picks the policy for an input source.
    #[must_use]
    pub const fn detect(interactive: bool, ignore_dots: bool) -> Self {
        match (interactive, ignore_dots) {
            (true, false) => Self::Dot,
            (true, true) => Self::IgnoreDots,
            (false, _) => Self::Eof,
        }
    }

    /// Returns true if a lone `.` line ends the message.
    #[must_use]
    pub const fn honors_dot(self) -> bool {
        matches!(self, Self::Dot)
    }
}

/// Ingestion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Reading header fields.
    InHeader,
    /// Reading body text.
    InBody,
    /// No more input will be consumed.
    Terminated,
}

/// A classified input line. Every variant ends with a newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A header field or continuation line.
    Header(Vec<u8>),
    /// The blank line between header block and body, real or synthetic.
    Separator,
    /// A body line.
    Body(Vec<u8>),
}

impl Line {
    /// Returns the bytes of the line.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Header(bytes) | Self::Body(bytes) => bytes,
            Self::Separator => NEWLINE,
        }
    }
}

/// Line-oriented reader that classifies its input.
#[derive(Debug)]
pub struct LineIngest<R> {
    reader: R,
    policy: Termination,
    state: State,
    // first body line, held back while the separator is emitted
    pending: Option<Vec<u8>>,
}

impl<R: AsyncBufRead + Unpin> LineIngest<R> {
    /// Creates a machine that starts in the header block.
    #[must_use]
    pub const fn new(reader: R, policy: Termination) -> Self {
        Self {
            reader,
            policy,
            state: State::InHeader,
            pending: None,
        }
    }

    /// Creates a machine whose whole input is body text.
    #[must_use]
    pub const fn body_only(reader: R, policy: Termination) -> Self {
        Self {
            reader,
            policy,
            state: State::InBody,
            pending: None,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Reads and classifies the next line.
    ///
    /// Returns `None` once the message has ended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] if the underlying reader fails.
    pub async fn next_line(&mut self) -> Result<Option<Line>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(Line::Body(line)));
        }
        if self.state == State::Terminated {
            return Ok(None);
        }

        let mut line = Vec::new();
        let n = self.reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            self.state = State::Terminated;
            return Ok(None);
        }

        if self.policy.honors_dot() && line == DOT_LINE {
            self.state = State::Terminated;
            return Ok(None);
        }

        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }

        if self.state == State::InHeader {
            if is_header_line(&line) {
                return Ok(Some(Line::Header(line)));
            }
            self.state = State::InBody;
            if line != NEWLINE {
                self.pending = Some(line);
            }
            return Ok(Some(Line::Separator));
        }

        Ok(Some(Line::Body(line)))
    }

    /// Consumes the header block and parses it.
    ///
    /// Leaves the machine positioned at the first body line.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or a header line is malformed.
    pub async fn read_header(&mut self) -> Result<Headers> {
        let lines = self.header_lines().await?;
        Headers::from_lines(&lines)
    }

    /// Consumes the header block, setting aside lines that are not fields.
    ///
    /// Returns the parsed fields and the rejected lines (without their
    /// newline), in input order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] if the underlying reader fails.
    pub async fn read_header_lenient(&mut self) -> Result<(Headers, Vec<String>)> {
        let lines = self.header_lines().await?;
        Ok(Headers::from_lines_lenient(&lines))
    }

    async fn header_lines(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        while self.state == State::InHeader {
            match self.next_line().await? {
                Some(Line::Header(line)) => lines.push(line),
                Some(_) | None => break,
            }
        }
        Ok(lines)
    }

    /// Streams the remaining body lines into `writer`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] or [`Error::Write`] on I/O failure.
    pub async fn write_body<W: AsyncWrite + Unpin>(&mut self, writer: &mut W) -> Result<u64> {
        let mut written = 0u64;
        while let Some(line) = self.next_line().await? {
            let bytes = line.as_bytes();
            writer.write_all(bytes).await.map_err(Error::Write)?;
            written += bytes.len() as u64;
        }
        Ok(written)
    }

    /// Reads the remaining body, bytes as given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] if the underlying reader fails.
    pub async fn read_body(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        self.write_body(&mut body).await?;
        Ok(body)
    }
}

/// A field line or a folded continuation.
fn is_header_line(line: &[u8]) -> bool {
    matches!(line.first(), Some(b' ' | b'\t')) || line.contains(&b':')
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
    use std::io;

    async fn collect(input: &[u8], policy: Termination) -> Vec<Line> {
        let mut ingest = LineIngest::new(input, policy);
        let mut lines = Vec::new();
        while let Some(line) = ingest.next_line().await.unwrap() {
            lines.push(line);
        }
        assert_eq!(ingest.state(), State::Terminated);
        lines
    }

    fn render(lines: &[Line]) -> Vec<u8> {
        lines.iter().flat_map(|l| l.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_termination_detect() {
        assert_eq!(Termination::detect(true, false), Termination::Dot);
        assert_eq!(Termination::detect(true, true), Termination::IgnoreDots);
        assert_eq!(Termination::detect(false, false), Termination::Eof);
        assert!(!Termination::IgnoreDots.honors_dot());
    }

    #[tokio::test]
    async fn test_dot_terminates_interactive_input() {
        let input = b"Subject: hi\n\nhello\n.\nnot read\n";
        let mut ingest = LineIngest::new(&input[..], Termination::Dot);

        let headers = ingest.read_header().await.unwrap();
        assert_eq!(headers.get("Subject"), Some("hi"));
        assert_eq!(headers.iter().count(), 1);

        let body = ingest.read_body().await.unwrap();
        assert_eq!(body, b"hello\n");
        assert_eq!(ingest.state(), State::Terminated);
    }

    #[tokio::test]
    async fn test_dot_is_text_when_ignored() {
        let input = b"Subject: hi\n\nhello\n.\nmore\n";
        let mut ingest = LineIngest::new(&input[..], Termination::IgnoreDots);
        ingest.read_header().await.unwrap();
        assert_eq!(ingest.read_body().await.unwrap(), b"hello\n.\nmore\n");
    }

    #[tokio::test]
    async fn test_synthetic_separator_before_bare_body() {
        let lines = collect(b"hello world\nsecond\n", Termination::Eof).await;
        assert_eq!(lines[0], Line::Separator);
        assert_eq!(render(&lines), b"\nhello world\nsecond\n");

        let mut ingest = LineIngest::new(&b"hello world\n"[..], Termination::Eof);
        assert!(ingest.read_header().await.unwrap().is_empty());
        assert_eq!(ingest.read_body().await.unwrap(), b"hello world\n");
    }

    #[tokio::test]
    async fn test_separator_after_headers_without_blank() {
        let lines = collect(b"To: a@example.com\nbody text\n", Termination::Eof).await;
        assert_eq!(
            render(&lines),
            b"To: a@example.com\n\nbody text\n".to_vec()
        );
    }

    #[tokio::test]
    async fn test_real_blank_line_not_doubled() {
        let lines = collect(b"To: a@example.com\n\nbody\n", Termination::Eof).await;
        assert_eq!(render(&lines), b"To: a@example.com\n\nbody\n".to_vec());
    }

    #[tokio::test]
    async fn test_folded_header() {
        let input = b"Subject: one\n two\nTo: a@example.com\n\nbody\n";
        let mut ingest = LineIngest::new(&input[..], Termination::Eof);
        let headers = ingest.read_header().await.unwrap();
        assert_eq!(headers.get("Subject"), Some("one two"));
        assert_eq!(ingest.state(), State::InBody);
    }

    #[tokio::test]
    async fn test_missing_final_newline() {
        let lines = collect(b"To: a@example.com\n\nlast line", Termination::Eof).await;
        assert_eq!(lines.last(), Some(&Line::Body(b"last line\n".to_vec())));
    }

    #[tokio::test]
    async fn test_empty_input_terminates() {
        let mut ingest = LineIngest::new(&b""[..], Termination::Dot);
        assert!(ingest.read_header().await.unwrap().is_empty());
        assert!(ingest.read_body().await.unwrap().is_empty());
        assert_eq!(ingest.state(), State::Terminated);
    }

    #[tokio::test]
    async fn test_header_only_input() {
        let mut ingest = LineIngest::new(&b"Subject: x"[..], Termination::Eof);
        let headers = ingest.read_header().await.unwrap();
        assert_eq!(headers.get("subject"), Some("x"));
        assert!(ingest.read_body().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_body_only_keeps_colons() {
        let input = b"Subject: not a header\n.\n";
        let mut ingest = LineIngest::body_only(&input[..], Termination::Dot);
        assert!(ingest.read_header().await.unwrap().is_empty());
        assert_eq!(ingest.read_body().await.unwrap(), b"Subject: not a header\n");
    }

    #[tokio::test]
    async fn test_dot_before_body() {
        let lines = collect(b"Subject: hi\n.\n", Termination::Dot).await;
        assert_eq!(lines, vec![Line::Header(b"Subject: hi\n".to_vec())]);
    }

    #[tokio::test]
    async fn test_body_bytes_kept() {
        let mut ingest = LineIngest::body_only(&b"caf\xe9\n"[..], Termination::Eof);
        assert_eq!(ingest.read_body().await.unwrap(), b"caf\xe9\n");
    }

    #[tokio::test]
    async fn test_lenient_header_sets_aside_bad_names() {
        let input = b"To: a@example.com\nHi Bob: are you there\n\nbody\n";
        let mut ingest = LineIngest::new(&input[..], Termination::Eof);
        let (headers, rejected) = ingest.read_header_lenient().await.unwrap();
        assert_eq!(headers.get("To"), Some("a@example.com"));
        assert_eq!(rejected, ["Hi Bob: are you there"]);
        assert_eq!(ingest.read_body().await.unwrap(), b"body\n");

        let mut strict = LineIngest::new(&input[..], Termination::Eof);
        assert!(matches!(
            strict.read_header().await,
            Err(Error::MalformedHeader(_))
        ));
    }

    #[tokio::test]
    async fn test_read_error_is_fatal() {
        let mock = tokio_test::io::Builder::new()
            .read_error(io::Error::other("device gone"))
            .build();
        let mut ingest = LineIngest::new(tokio::io::BufReader::new(mock), Termination::Eof);
        let err = ingest.next_line().await.unwrap_err();
        assert!(matches!(err, Error::Read(_)));
    }
}
