#![allow(clippy::expect_used)]
//! Example: encode a message and dump the request without sending it.
//!
//! ```bash
//! cargo run --package mgrelay-core --example dry_run -- you@example.com
//! ```

use mgrelay_core::{Config, Credentials, Invocation, Message, Transport};
use mgrelay_mime::Address;

#[tokio::main]
async fn main() {
    let to = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "postmaster".to_string());

    let mut config = Config::new(
        Credentials::new("mg.example.com", "key-0000000000"),
        Invocation::current(),
    );
    config.debug_http = true;
    config.disable_mail = true;

    let message = Message::new(Address::new("example"))
        .to(Address::parse(&to).expect("recipient address"))
        .subject("dry run")
        .body("This message never leaves the machine.\n");

    let delivery = Transport::new(&config)
        .send_message(message)
        .await
        .expect("dry run");
    println!("{} ({} bytes encoded)", delivery.message, delivery.bytes_sent);
}
