//! Append-only activity log.

use std::fmt::Display;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::{error, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Invocation;

/// Default log file.
pub const LOG_PATH: &str = "/var/log/mailgun.log";

/// Installs the global subscriber writing to `path`.
///
/// The file is only appended to, never created; if it cannot be opened,
/// log records are discarded. `RUST_LOG` overrides the default `info`
/// filter. Calling this twice is harmless.
pub fn init(path: &Path) {
    let writer = match OpenOptions::new().append(true).open(path) {
        Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
        Err(_) => BoxMakeWriter::new(std::io::sink),
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .try_init();
}

/// Records a decision not to send, or any other note about the run.
pub fn note(invocation: &Invocation, message: &str) {
    info!(user = %invocation.user, args = ?invocation.args, "{message}");
}

/// Records a failure that ends the run.
pub fn fatal(invocation: &Invocation, err: &dyn Display) {
    error!(
        user = %invocation.user,
        args = ?invocation.args,
        error = %err,
        "not sent"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_without_log_file() {
        init(Path::new("/nonexistent/mgrelay/mailgun.log"));
        assert!(!Path::new("/nonexistent/mgrelay/mailgun.log").exists());
        fatal(
            &Invocation {
                user: "tester".to_string(),
                args: vec!["mailgun-mail".to_string()],
            },
            &"boom",
        );
    }
}
