//! # mgrelay-core
//!
//! Message model and HTTP transport shared by the `mailgun-sendmail` and
//! `mailgun-mail` commands.
//!
//! This crate provides:
//! - Credentials and run configuration
//! - The structured [`Message`] and header harvesting
//! - A streaming `multipart/form-data` encoder
//! - The Mailgun [`Transport`], which pipes the encoder straight into the
//!   request body
//! - The append-only activity log

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod conduit;
pub mod config;
mod console;
mod error;
pub mod form;
mod harvest;
pub mod logging;
mod message;
mod response;
mod transport;

pub use config::{Config, Credentials, Invocation};
pub use console::{Captured, Console};
pub use error::{Error, Result, TransportError};
pub use harvest::{Harvest, require_recipients};
pub use message::Message;
pub use response::{ApiReply, Delivery, RawResponse, Reply};
pub use transport::{Endpoint, Transport};
