//! Error types for the core library.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while assembling or sending a message.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials missing or malformed.
    #[error("{0}")]
    Config(String),

    /// An address in the named field could not be parsed.
    #[error("cannot parse {field}: {source}")]
    Address {
        /// Field the address came from (e.g. `To`, `From`).
        field: String,
        /// Parser failure.
        source: mgrelay_mime::Error,
    },

    /// Reading the input message failed.
    #[error(transparent)]
    Ingest(#[from] mgrelay_mime::Error),

    /// Recipient harvesting found nobody to send to.
    #[error("no recipients found in message")]
    NoRecipients,

    /// An attachment could not be read.
    #[error("attaching file {}: {source}", path.display())]
    Attachment {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The HTTP exchange failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Creates an address error for a field.
    #[must_use]
    pub fn address(field: impl Into<String>, source: mgrelay_mime::Error) -> Self {
        Self::Address {
            field: field.into(),
            source,
        }
    }
}

/// Failures of the HTTP side of a send.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request could not be built or the network failed.
    #[error("sending mail: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a status other than 200.
    #[error("sending mail: {status}\n{body}")]
    Status {
        /// HTTP status.
        status: reqwest::StatusCode,
        /// Response body, verbatim.
        body: String,
    },

    /// Status 200 but the body is not the expected JSON.
    #[error("sending mail: invalid JSON response: {reason}\n{body}")]
    MalformedResponse {
        /// Decoder failure.
        reason: String,
        /// Response body, verbatim.
        body: String,
    },

    /// The in-process payload pipe failed.
    #[error("creating mailgun API request: {0}")]
    Conduit(#[from] io::Error),
}

impl TransportError {
    /// Returns the raw server detail, if the server answered.
    #[must_use]
    pub fn server_detail(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } | Self::MalformedResponse { body, .. } => Some(body),
            Self::Http(_) | Self::Conduit(_) => None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
