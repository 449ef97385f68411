//! In-process byte pipe between the form encoder and the HTTP body.
//!
//! A bounded duplex stream with two additions: the read side counts every
//! byte it hands out, and the write side can be aborted so that the reader
//! sees an error instead of a clean end of stream.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Default conduit buffer size.
pub const CAPACITY: usize = 64 * 1024;

#[derive(Debug, Default)]
struct Shared {
    bytes: AtomicU64,
    aborted: AtomicBool,
}

/// Creates a conduit with `capacity` bytes of buffering.
#[must_use]
pub fn conduit(capacity: usize) -> (ConduitWriter, ConduitReader) {
    let (write, read) = tokio::io::duplex(capacity);
    let shared = Arc::new(Shared::default());
    (
        ConduitWriter {
            stream: write,
            shared: Arc::clone(&shared),
        },
        ConduitReader {
            stream: read,
            shared,
        },
    )
}

/// Producer end.
#[derive(Debug)]
pub struct ConduitWriter {
    stream: DuplexStream,
    shared: Arc<Shared>,
}

impl ConduitWriter {
    /// Closes the conduit so the reader fails instead of reaching end of
    /// stream.
    pub fn abort(self) {
        self.shared.aborted.store(true, Ordering::Release);
    }
}

impl AsyncWrite for ConduitWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

/// Consumer end.
#[derive(Debug)]
pub struct ConduitReader {
    stream: DuplexStream,
    shared: Arc<Shared>,
}

impl ConduitReader {
    /// Returns a handle that reports the bytes read so far.
    #[must_use]
    pub fn counter(&self) -> ByteCounter {
        ByteCounter(Arc::clone(&self.shared))
    }
}

impl AsyncRead for ConduitReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.stream).poll_read(cx, buf))?;
        let n = buf.filled().len() - before;

        if n == 0 && buf.remaining() > 0 && this.shared.aborted.load(Ordering::Acquire) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "message encoding aborted",
            )));
        }

        this.shared.bytes.fetch_add(n as u64, Ordering::Relaxed);
        Poll::Ready(Ok(()))
    }
}

/// Read-side byte total, usable after the reader has been handed off.
#[derive(Debug, Clone)]
pub struct ByteCounter(Arc<Shared>);

impl ByteCounter {
    /// Returns the number of bytes read from the conduit.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.0.bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_counts_bytes() {
        let (mut writer, mut reader) = conduit(8);
        let counter = reader.counter();

        let produce = async move {
            writer.write_all(b"hello, conduit").await.unwrap();
            writer.shutdown().await.unwrap();
        };
        let consume = async {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            out
        };
        let ((), out) = tokio::join!(produce, consume);

        assert_eq!(out, b"hello, conduit");
        assert_eq!(counter.bytes(), 14);
    }

    #[tokio::test]
    async fn test_abort_fails_reader() {
        let (mut writer, mut reader) = conduit(64);
        writer.write_all(b"partial").await.unwrap();
        writer.abort();

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"partial");
    }

    #[tokio::test]
    async fn test_writer_fails_after_reader_dropped() {
        let (mut writer, reader) = conduit(4);
        drop(reader);
        assert!(writer.write_all(b"too late").await.is_err());
    }
}
