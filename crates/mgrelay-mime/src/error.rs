//! Error types for address parsing and message ingestion.

use std::io;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Address text could not be parsed.
    #[error("invalid address {input:?}: {reason}")]
    InvalidAddress {
        /// The offending text.
        input: String,
        /// Why the parser rejected it.
        reason: String,
    },

    /// Header line that is neither a field nor a continuation.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// Reading the input stream failed.
    #[error("reading message: {0}")]
    Read(#[from] io::Error),

    /// Writing the reconstructed message failed.
    #[error("writing message: {0}")]
    Write(#[source] io::Error),
}

impl Error {
    /// Creates an address error from the input and a reason.
    #[must_use]
    pub fn invalid_address(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            input: input.into(),
            reason: reason.into(),
        }
    }
}
