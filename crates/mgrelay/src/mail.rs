//! `mailgun-mail`: composes a message from flags and standard input.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use mgrelay_core::{
    Config, Console, Delivery, Error, Harvest, Message, Transport, logging, require_recipients,
};
use mgrelay_mime::{Address, LineIngest, Termination};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Command line of `mailgun-mail`.
#[derive(Debug, Parser)]
#[command(
    name = "mailgun-mail",
    version,
    about = "Send mail through Mailgun (mail compatible)"
)]
#[allow(clippy::struct_excessive_bools)] // one per flag
pub struct MailArgs {
    /// Discard (do not send) empty messages
    #[arg(short = 'E')]
    pub skip_empty: bool,

    /// Print debugging information
    #[arg(short = 'd')]
    pub debug: bool,

    /// Do not send actual mail
    #[arg(short = 'n')]
    pub no_send: bool,

    /// Read Subject:, To:, Cc: and Bcc: lines from message header
    #[arg(short = 't')]
    pub harvest: bool,

    /// Verbose mode
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Attach file to message
    #[arg(short = 'a', value_name = "FILE")]
    pub attach: Vec<PathBuf>,

    /// BCC address
    #[arg(short = 'b', value_name = "ADDRESS")]
    pub bcc: Vec<String>,

    /// CC address
    #[arg(short = 'c', value_name = "ADDRESS")]
    pub cc: Vec<String>,

    /// Send mail from address
    #[arg(short = 'r', value_name = "ADDRESS")]
    pub from: Vec<String>,

    /// Set message subject
    #[arg(short = 's', value_name = "SUBJECT")]
    pub subject: Vec<String>,

    /// Recipients
    #[arg(value_name = "ADDR")]
    pub to: Vec<String>,
}

impl MailArgs {
    fn sender(&self, config: &Config) -> anyhow::Result<Address> {
        if let Some(from) = self.from.last() {
            return Ok(Address::parse(from).map_err(|e| Error::address("From: address", e))?);
        }
        if config.invocation.user.is_empty() {
            bail!("cannot determine From address: -r not used, and $USER not set");
        }
        Ok(Address::new(config.invocation.user.clone()))
    }
}

fn parse_all(field: &str, list: &[String]) -> Result<Vec<Address>, Error> {
    list.iter()
        .map(|a| Address::parse(a).map_err(|e| Error::address(format!("{field}: address"), e)))
        .collect()
}

/// Reads the message body from `input` and sends it.
///
/// Returns `None` when nothing was sent on purpose (no subject and no text
/// at the prompt, or an empty body with `-E`).
///
/// # Errors
///
/// Returns an error for unusable addresses, unreadable input and any
/// failure to deliver.
pub async fn run<R: AsyncBufRead + Unpin>(
    args: MailArgs,
    mut config: Config,
    mut input: R,
    console: Console,
) -> anyhow::Result<Option<Delivery>> {
    config.debug_http = args.debug;
    config.disable_mail = args.no_send;
    config.verbose = args.verbose;

    if args.to.is_empty() && !args.harvest {
        bail!("mail reading is not supported");
    }

    let mut message = Message::new(args.sender(&config)?);
    message.to = parse_all("To", &args.to)?;
    message.cc = parse_all("Cc", &args.cc)?;
    message.bcc = parse_all("Bcc", &args.bcc)?;
    message.attachments.clone_from(&args.attach);

    if let Some(subject) = args.subject.last() {
        message.subject = subject.clone().into_bytes();
    } else if config.interactive {
        console.write(b"Subject: ");
        let mut line = Vec::new();
        let n = input
            .read_until(b'\n', &mut line)
            .await
            .context("reading subject")?;
        if n == 0 {
            logging::note(&config.invocation, "no subject, no text, not sending");
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        message.subject = line;
    }

    let policy = Termination::detect(config.interactive, false);
    let mut ingest = if args.harvest {
        let mut ingest = LineIngest::new(&mut input, policy);
        let (headers, rejected) = ingest.read_header_lenient().await?;
        let mut harvest = Harvest::from_headers(&headers)?;
        harvest.ignored.extend(rejected);
        for field in &harvest.ignored {
            console.line(&format!(
                "{}: ignoring header field {field:?}",
                config.invocation.program()
            ));
        }
        message.absorb(harvest);
        require_recipients(message.recipients().count())?;
        ingest
    } else {
        LineIngest::body_only(&mut input, policy)
    };
    message.body = ingest.read_body().await?;
    if config.interactive {
        console.line("EOT");
    }

    if args.skip_empty && message.body.is_empty() {
        logging::note(&config.invocation, "empty message, not sending");
        return Ok(None);
    }
    if config.verbose {
        describe(&message, &console);
    }

    let transport = Transport::new(&config).with_console(console);
    Ok(Some(transport.send_message(message).await?))
}

fn describe(message: &Message, console: &Console) {
    let list = |addrs: &[Address]| {
        addrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    console.line(&format!("from: {}", message.from));
    console.line(&format!("to: {}", list(&message.to)));
    console.line(&format!("cc: {}", list(&message.cc)));
    console.line(&format!("bcc: {}", list(&message.bcc)));
    console.line(&format!("subject: {}", String::from_utf8_lossy(&message.subject)));
    console.line(&format!("body: {} bytes", message.body.len()));
    if !message.attachments.is_empty() {
        console.line("attachments:");
        for path in &message.attachments {
            console.line(&format!("\t{}", path.display()));
        }
    }
}
