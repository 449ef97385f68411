//! Streaming `multipart/form-data` encoder.
//!
//! Parts are written straight to the underlying writer as they are
//! produced; nothing is buffered beyond a part header.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use rand::Rng;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Random bytes in a boundary (hex encoded, so twice as many characters).
const BOUNDARY_BYTES: usize = 30;

/// Multipart form writer.
///
/// Writing through the [`AsyncWrite`] impl appends to the current part.
#[derive(Debug)]
pub struct FormWriter<W> {
    writer: W,
    boundary: String,
    parts: usize,
}

impl<W: AsyncWrite + Unpin> FormWriter<W> {
    /// Creates a writer with a random boundary.
    #[must_use]
    pub fn new(writer: W) -> Self {
        let mut bytes = [0u8; BOUNDARY_BYTES];
        rand::thread_rng().fill(&mut bytes[..]);
        let boundary = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self::with_boundary(writer, boundary)
    }

    /// Creates a writer with a fixed boundary.
    #[must_use]
    pub const fn with_boundary(writer: W, boundary: String) -> Self {
        Self {
            writer,
            boundary,
            parts: 0,
        }
    }

    /// Returns the `Content-Type` value announcing this form.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Writes a complete field. The value is copied byte for byte.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub async fn write_field(&mut self, name: &str, value: impl AsRef<[u8]>) -> io::Result<()> {
        self.begin_part(&format!(
            "Content-Disposition: form-data; name=\"{}\"\r\n",
            escape_quotes(name)
        ))
        .await?;
        self.writer.write_all(value.as_ref()).await
    }

    /// Starts a file part; its contents follow through [`AsyncWrite`].
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub async fn begin_file(&mut self, name: &str, filename: &str) -> io::Result<()> {
        self.begin_part(&format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
             Content-Type: application/octet-stream\r\n",
            escape_quotes(name),
            escape_quotes(filename)
        ))
        .await
    }

    async fn begin_part(&mut self, headers: &str) -> io::Result<()> {
        let lead = if self.parts == 0 { "" } else { "\r\n" };
        let head = format!("{lead}--{}\r\n{headers}\r\n", self.boundary);
        self.writer.write_all(head.as_bytes()).await?;
        self.parts += 1;
        Ok(())
    }

    /// Writes the closing boundary and shuts the writer down.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub async fn finish(mut self) -> io::Result<W> {
        let tail = format!("\r\n--{}--\r\n", self.boundary);
        self.writer.write_all(tail.as_bytes()).await?;
        self.writer.shutdown().await?;
        Ok(self.writer)
    }

    /// Returns the underlying writer without closing the form.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for FormWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_shutdown(cx)
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fields_and_file() {
        let mut form = FormWriter::with_boundary(Vec::new(), "XYZ".to_string());
        assert_eq!(form.content_type(), "multipart/form-data; boundary=XYZ");

        form.write_field("from", "a@example.com").await.unwrap();
        form.write_field("to", "b@example.com").await.unwrap();
        form.begin_file("attachment", "note \"1\".txt").await.unwrap();
        form.write_all(b"file body").await.unwrap();
        let out = form.finish().await.unwrap();

        let expected = concat!(
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"from\"\r\n",
            "\r\n",
            "a@example.com",
            "\r\n--XYZ\r\n",
            "Content-Disposition: form-data; name=\"to\"\r\n",
            "\r\n",
            "b@example.com",
            "\r\n--XYZ\r\n",
            "Content-Disposition: form-data; name=\"attachment\"; filename=\"note \\\"1\\\".txt\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "file body",
            "\r\n--XYZ--\r\n",
        );
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_field_bytes_untouched() {
        let mut form = FormWriter::with_boundary(Vec::new(), "XYZ".to_string());
        form.write_field("text", b"caf\xe9\n").await.unwrap();
        let out = form.finish().await.unwrap();
        assert!(out.windows(8).any(|w| w == b"\r\ncaf\xe9\n\r"));
    }

    #[test]
    fn test_random_boundary() {
        let a = FormWriter::new(Vec::<u8>::new());
        let b = FormWriter::new(Vec::<u8>::new());
        let prefix = "multipart/form-data; boundary=".len();
        assert_eq!(a.content_type().len(), prefix + BOUNDARY_BYTES * 2);
        assert_ne!(a.content_type(), b.content_type());
    }
}
