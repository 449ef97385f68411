//! Operator-facing output (standard error by default).

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Shared destination for prompts, status lines and HTTP dumps.
///
/// Write failures are ignored.
#[derive(Clone)]
pub struct Console {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    /// Writes to standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self::from_writer(io::stderr())
    }

    /// Writes to any writer.
    #[must_use]
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Returns a console that records everything written to it.
    #[must_use]
    pub fn capture() -> (Self, Captured) {
        let captured = Captured::default();
        (Self::from_writer(captured.clone()), captured)
    }

    /// Writes raw bytes.
    pub fn write(&self, bytes: &[u8]) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.write_all(bytes);
            let _ = sink.flush();
        }
    }

    /// Writes `text` followed by a newline.
    pub fn line(&self, text: &str) {
        self.write(format!("{text}\n").as_bytes());
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

/// In-memory record of console output.
#[derive(Debug, Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    /// Returns everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    /// Returns everything written so far, as raw bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().map(|buf| buf.clone()).unwrap_or_default()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("console buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
