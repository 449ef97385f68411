//! # mgrelay-mime
//!
//! Input-side message handling for the `mgrelay` commands.
//!
//! ## Features
//!
//! - **Address resolution**: bare mailboxes, the informal
//!   `Name (comment) <addr>` form, and strict RFC 5322 mailboxes
//! - **Line ingestion**: header/body classification for sendmail-style
//!   input with dot or end-of-stream termination
//! - **Headers**: canonical field names, deterministic sorted rendering
//! - **Raw envelopes**: header block plus a streamed body, `Bcc` stripped
//!
//! ## Quick Start
//!
//! ```ignore
//! use mgrelay_mime::{LineIngest, RawEnvelope, Termination};
//!
//! let stdin = tokio::io::BufReader::new(tokio::io::stdin());
//! let ingest = LineIngest::new(stdin, Termination::detect(true, false));
//! let envelope = RawEnvelope::read(ingest).await?;
//! print!("{}", envelope.header_block());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod envelope;
mod error;
mod header;
pub mod ingest;

pub use address::Address;
pub use envelope::RawEnvelope;
pub use error::{Error, Result};
pub use header::{Headers, canonical_name};
pub use ingest::{Line, LineIngest, State, Termination};
