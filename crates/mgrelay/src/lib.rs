//! # mgrelay
//!
//! Drop-in replacements for the sending side of `sendmail` and `mail` that
//! deliver through the Mailgun HTTP API instead of a local mail transfer
//! agent.
//!
//! - [`sendmail`] relays a complete message read from standard input.
//! - [`mail`] builds a message from flags, a subject prompt and a body.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod mail;
pub mod sendmail;
