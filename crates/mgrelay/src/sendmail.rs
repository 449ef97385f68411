//! `mailgun-sendmail`: relays a complete message from standard input.
//!
//! The input header block is kept as written (minus `Bcc`, plus a `From`
//! if there is none) and forwarded to the MIME endpoint together with the
//! envelope recipients.

use anyhow::{Context, bail};
use clap::Parser;
use mgrelay_core::{Config, Console, Delivery, Error, Harvest, Transport, require_recipients};
use mgrelay_mime::{Address, LineIngest, RawEnvelope, Termination};
use tokio::io::AsyncBufRead;
use tracing::debug;

/// Command line of `mailgun-sendmail`.
#[derive(Debug, Parser)]
#[command(
    name = "mailgun-sendmail",
    version,
    about = "Send mail through Mailgun (sendmail compatible)"
)]
#[allow(clippy::struct_excessive_bools)] // one per flag
pub struct SendmailArgs {
    /// Ignore single dot lines on incoming message
    #[arg(short = 'i')]
    pub ignore_dots: bool,

    /// Read To:, Cc:, Bcc: lines from message
    #[arg(short = 't')]
    pub harvest: bool,

    /// Verbose mode
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Set body type (ignored)
    #[arg(short = 'B', value_name = "TYPE")]
    pub body_type: Option<String>,

    /// Run operation named by code (must be m)
    #[arg(short = 'b', value_name = "CODE", default_value = "m")]
    pub mode: String,

    /// Set debugging value (http, nosend)
    #[arg(short = 'd', value_name = "VALUE")]
    pub debug: Vec<String>,

    /// Set the full name of the sender
    #[arg(short = 'F', value_name = "NAME")]
    pub full_name: Option<String>,

    /// Set the from address of the mail (-r is an archaic alias)
    #[arg(short = 'f', short_alias = 'r', value_name = "ADDR")]
    pub from: Option<String>,

    /// Delivery addresses
    #[arg(value_name = "ADDR")]
    pub addrs: Vec<String>,
}

impl SendmailArgs {
    /// Applies `-d` and `-v` to `config`.
    ///
    /// # Errors
    ///
    /// Fails on a `-d` value other than `http` or `nosend`.
    pub fn configure(&self, config: &mut Config) -> anyhow::Result<()> {
        for value in &self.debug {
            match value.as_str() {
                "http" => config.debug_http = true,
                "nosend" => config.disable_mail = true,
                other => bail!("unknown debug value -d {other}"),
            }
        }
        config.verbose = self.verbose;
        Ok(())
    }

    fn sender(&self, config: &Config) -> anyhow::Result<Address> {
        let mailbox = match &self.from {
            Some(from) if !from.is_empty() => from.clone(),
            _ if !config.invocation.user.is_empty() => config.invocation.user.clone(),
            _ => bail!("cannot determine From address: -f/-r not used, and $USER not set"),
        };
        if mailbox.contains(char::is_control) {
            let reason = mgrelay_mime::Error::invalid_address(&mailbox, "control character");
            return Err(Error::address("From: address", reason).into());
        }
        let mut from = Address::with_name(self.full_name.clone().unwrap_or_default(), mailbox);
        from.apply_local_domain(config.domain());
        Ok(from)
    }
}

/// Reads a message from `input` and relays it.
///
/// # Errors
///
/// Returns an error for unsupported modes, unusable addresses, malformed
/// input and any failure to deliver.
pub async fn run<R: AsyncBufRead + Unpin>(
    args: SendmailArgs,
    mut config: Config,
    input: R,
    console: Console,
) -> anyhow::Result<Delivery> {
    args.configure(&mut config)?;

    if args.mode != "m" {
        bail!("only sendmail -bm is supported");
    }
    if args.addrs.is_empty() && !args.harvest {
        bail!("no delivery addresses given");
    }

    let mut to = args
        .addrs
        .iter()
        .map(|a| Address::parse(a).map_err(|e| Error::address("To: address", e)))
        .collect::<Result<Vec<_>, _>>()?;
    let from = args.sender(&config)?;

    let policy = Termination::detect(config.interactive, args.ignore_dots);
    let mut ingest = LineIngest::new(input, policy);
    let headers = ingest
        .read_header()
        .await
        .context("reading message header")?;

    if args.harvest {
        let harvest = Harvest::from_headers(&headers)?;
        to.extend(harvest.recipients());
        require_recipients(to.len())?;
    }

    let mut envelope = RawEnvelope::new(headers, ingest);
    envelope.ensure_from(&from);
    debug!(from = %from, recipients = to.len(), "relaying message");

    let transport = Transport::new(&config).with_console(console);
    Ok(transport.send_mime(from, to, envelope).await?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mgrelay_core::{Credentials, Invocation};

    fn config(user: &str) -> Config {
        Config::new(
            Credentials::new("mg.example.com", "key-test"),
            Invocation {
                user: user.to_string(),
                args: vec!["mailgun-sendmail".to_string()],
            },
        )
    }

    fn args(argv: &[&str]) -> SendmailArgs {
        let argv = std::iter::once("mailgun-sendmail").chain(argv.iter().copied());
        SendmailArgs::try_parse_from(argv).unwrap()
    }

    async fn dump(argv: &[&str], input: &str) -> (anyhow::Result<Delivery>, String) {
        let (console, captured) = Console::capture();
        let result = run(args(argv), config("root"), input.as_bytes(), console).await;
        (result, captured.contents())
    }

    #[test]
    fn test_parse_flags() {
        let args = args(&["-i"]);
        assert!(args.ignore_dots);

        let args = SendmailArgs::try_parse_from([
            "mailgun-sendmail", "-t", "-bm", "-d", "http", "-d", "nosend", "-F", "Root", "-r",
            "admin", "a@example.com",
        ])
        .unwrap();
        assert!(args.harvest);
        assert_eq!(args.mode, "m");
        assert_eq!(args.debug, ["http", "nosend"]);
        assert_eq!(args.full_name.as_deref(), Some("Root"));
        assert_eq!(args.from.as_deref(), Some("admin"));
        assert_eq!(args.addrs, ["a@example.com"]);
    }

    #[test]
    fn test_configure() {
        let mut config = config("root");
        args(&["-v", "-d", "nosend"]).configure(&mut config).unwrap();
        assert!(config.verbose);
        assert!(config.disable_mail);
        assert!(!config.debug_http);

        let err = args(&["-d", "smtp"]).configure(&mut config).unwrap_err();
        assert_eq!(err.to_string(), "unknown debug value -d smtp");
    }

    #[tokio::test]
    async fn test_only_bm_supported() {
        let (result, _) = dump(&["-bs", "a@example.com"], "").await;
        assert_eq!(result.unwrap_err().to_string(), "only sendmail -bm is supported");
    }

    #[tokio::test]
    async fn test_no_addresses() {
        let (result, _) = dump(&["-d", "nosend"], "Subject: x\n\nbody\n").await;
        assert_eq!(result.unwrap_err().to_string(), "no delivery addresses given");
    }

    #[tokio::test]
    async fn test_missing_user() {
        let (console, _) = Console::capture();
        let err = run(args(&["a@example.com"]), config(""), &b""[..], console)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("cannot determine From address"));
    }

    #[tokio::test]
    async fn test_relays_headers_sorted_with_from() {
        let input = "subject: hello\nBcc: secret@example.com\nTo: a@example.com\n\nbody line\n";
        let argv = ["-d", "http", "-d", "nosend", "-F", "Root User", "a@example.com"];
        let (result, out) = dump(&argv, input).await;

        let delivery = result.unwrap();
        assert!(delivery.suppressed);
        assert!(out.contains("POST /v3/mg.example.com/messages.mime HTTP/1.1\r\n"));
        assert!(out.contains(
            "From: Root User <root@mg.example.com>\nSubject: hello\nTo: a@example.com\n\nbody line\n"
        ));
        assert!(!out.contains("secret@example.com"));
        assert!(out.ends_with("not sending mail (disabled)\n"));
    }

    #[tokio::test]
    async fn test_harvest_recipients() {
        let input = "To: a@example.com\nBcc: secret@example.com\n\nhi\n";
        let (result, out) = dump(&["-t", "-d", "http", "-d", "nosend"], input).await;

        result.unwrap();
        assert!(out.contains("name=\"to\"\r\n\r\na@example.com\r\n"));
        assert!(out.contains("name=\"to\"\r\n\r\nsecret@example.com\r\n"));
        assert!(!out.contains("Bcc:"));
    }

    #[tokio::test]
    async fn test_harvest_finds_nobody() {
        let (result, _) = dump(&["-t", "-d", "nosend"], "Subject: lonely\n\nhi\n").await;
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "no recipients found in message");
    }

    #[tokio::test]
    async fn test_full_name_cannot_add_header_lines() {
        let name = "Root\nBcc: leak@evil.example";
        let argv = ["-d", "http", "-d", "nosend", "-F", name, "a@example.com"];
        let (result, out) = dump(&argv, "Subject: hi\n\nbody\n").await;

        result.unwrap();
        assert!(out.contains("From: =?utf-8?B?"));
        assert!(out.contains("?= <root@mg.example.com>\nSubject: hi\n\nbody\n"));
        assert!(!out.contains("leak@evil.example"));
        assert!(!out.contains("\nBcc:"));
    }

    #[tokio::test]
    async fn test_from_with_line_break_rejected() {
        let argv = ["-f", "root\nBcc: x@evil.example", "a@example.com"];
        let (result, out) = dump(&argv, "hi\n").await;
        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("cannot parse From: address"));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_bare_body_gets_separator() {
        let argv = ["-d", "http", "-d", "nosend", "a@example.com"];
        let (result, out) = dump(&argv, "just text\n").await;
        result.unwrap();
        assert!(out.contains("From: root@mg.example.com\n\njust text\n"));
    }
}
