//! Streaming Mailgun transport.
//!
//! A send runs two tasks joined on the current task. The producer encodes
//! the payload as `multipart/form-data` into one end of a bounded
//! [`conduit`](crate::conduit); the consumer hands the other end to reqwest
//! as a streamed request body. Neither side ever holds the whole message,
//! except in HTTP debug mode where the request is dumped before sending.
//!
//! When both sides fail, the producer's own failure (an unreadable
//! attachment or input) is reported in preference to whatever the HTTP side
//! saw as a consequence. A pipe failure on the producer side is only a
//! symptom of the consumer going away, so the consumer's error wins then.

use std::io;
use std::path::Path;

use mgrelay_mime::{Address, RawEnvelope};
use reqwest::Body;
use reqwest::header::CONTENT_TYPE;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::conduit::{CAPACITY, ConduitReader, conduit};
use crate::config::{API_USER, Config};
use crate::console::Console;
use crate::error::{Error, Result, TransportError};
use crate::form::FormWriter;
use crate::message::Message;
use crate::response::{self, Delivery, RawResponse};

/// Size of the read buffer used when streaming attachments.
const ATTACHMENT_CHUNK: usize = 32 * 1024;

/// API endpoint a payload is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Structured fields: from, to, cc, bcc, subject, text, attachments.
    Messages,
    /// Pre-built MIME message plus envelope recipients.
    Mime,
}

impl Endpoint {
    /// Path relative to the domain URL.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Mime => "messages.mime",
        }
    }
}

/// Something that can be encoded as a form body.
pub(crate) trait Payload {
    fn endpoint(&self) -> Endpoint;

    async fn encode<W: AsyncWrite + Unpin>(self, form: &mut FormWriter<W>) -> Result<()>;
}

impl Payload for Message {
    fn endpoint(&self) -> Endpoint {
        Endpoint::Messages
    }

    async fn encode<W: AsyncWrite + Unpin>(self, form: &mut FormWriter<W>) -> Result<()> {
        form.write_field("from", &self.from.to_string())
            .await
            .map_err(conduit_error)?;
        for (name, list) in [("to", &self.to), ("cc", &self.cc), ("bcc", &self.bcc)] {
            for addr in list {
                form.write_field(name, &addr.to_string())
                    .await
                    .map_err(conduit_error)?;
            }
        }
        if !self.subject.is_empty() {
            form.write_field("subject", &self.subject)
                .await
                .map_err(conduit_error)?;
        }
        form.write_field("text", &self.body)
            .await
            .map_err(conduit_error)?;

        for path in &self.attachments {
            attach(form, path).await?;
        }
        Ok(())
    }
}

/// A raw message forwarded to the MIME endpoint.
struct MimePayload<R> {
    to: Vec<Address>,
    envelope: RawEnvelope<R>,
}

impl<R: AsyncBufRead + Unpin> Payload for MimePayload<R> {
    fn endpoint(&self) -> Endpoint {
        Endpoint::Mime
    }

    async fn encode<W: AsyncWrite + Unpin>(self, form: &mut FormWriter<W>) -> Result<()> {
        for addr in &self.to {
            form.write_field("to", &addr.to_string())
                .await
                .map_err(conduit_error)?;
        }
        form.begin_file("message", "mime.msg")
            .await
            .map_err(conduit_error)?;
        self.envelope.write_to(form).await.map_err(|e| match e {
            mgrelay_mime::Error::Write(source) => conduit_error(source),
            other => Error::Ingest(other),
        })?;
        Ok(())
    }
}

async fn attach<W: AsyncWrite + Unpin>(form: &mut FormWriter<W>, path: &Path) -> Result<()> {
    let unreadable = |source| Error::Attachment {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).await.map_err(unreadable)?;
    let filename = path
        .file_name()
        .map_or_else(|| path.to_string_lossy(), |name| name.to_string_lossy());
    form.begin_file("attachment", &filename)
        .await
        .map_err(conduit_error)?;

    let mut buf = vec![0u8; ATTACHMENT_CHUNK];
    loop {
        let n = file.read(&mut buf).await.map_err(unreadable)?;
        if n == 0 {
            return Ok(());
        }
        form.write_all(&buf[..n]).await.map_err(conduit_error)?;
    }
}

fn conduit_error(e: io::Error) -> Error {
    TransportError::Conduit(e).into()
}

const fn is_conduit(e: &Error) -> bool {
    matches!(e, Error::Transport(TransportError::Conduit(_)))
}

/// Picks the error to report once both halves of a send have finished.
fn settle(
    produced: Result<()>,
    exchanged: Result<Option<RawResponse>>,
) -> Result<Option<RawResponse>> {
    match (produced, exchanged) {
        (Ok(()), exchanged) => exchanged,
        // The server answered before reading the whole body; its verdict is
        // the cause of the broken pipe.
        (Err(e), Ok(Some(raw))) if is_conduit(&e) && raw.status != reqwest::StatusCode::OK => {
            Ok(Some(raw))
        }
        (Err(e), Err(consumer)) if is_conduit(&e) => Err(consumer),
        (Err(e), _) => Err(e),
    }
}

/// Sends messages through the Mailgun HTTP API.
#[derive(Debug, Clone)]
pub struct Transport<'a> {
    config: &'a Config,
    client: reqwest::Client,
    console: Console,
}

impl<'a> Transport<'a> {
    /// Creates a transport reporting to standard error.
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            console: Console::stderr(),
        }
    }

    /// Replaces the console used for dumps and status lines.
    #[must_use]
    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Sends a structured message to the `messages` endpoint.
    ///
    /// Unqualified addresses are completed with the configured domain first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attachment`] if an attachment cannot be read, and
    /// [`Error::Transport`] if the HTTP exchange fails or is rejected.
    pub async fn send_message(&self, mut message: Message) -> Result<Delivery> {
        message.apply_local_domain(self.config.domain());
        let from = message.from.clone();
        let to: Vec<Address> = message.recipients().cloned().collect();
        self.send(message, &from, &to).await
    }

    /// Forwards a raw message to the `messages.mime` endpoint.
    ///
    /// `to` is the envelope recipient list; the message headers are sent
    /// unchanged (minus any `Bcc`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ingest`] if reading the rest of the input fails, and
    /// [`Error::Transport`] if the HTTP exchange fails or is rejected.
    pub async fn send_mime<R: AsyncBufRead + Unpin>(
        &self,
        mut from: Address,
        mut to: Vec<Address>,
        envelope: RawEnvelope<R>,
    ) -> Result<Delivery> {
        let domain = self.config.domain();
        from.apply_local_domain(domain);
        for addr in &mut to {
            addr.apply_local_domain(domain);
        }
        let payload = MimePayload {
            to: to.clone(),
            envelope,
        };
        self.send(payload, &from, &to).await
    }

    async fn send<P: Payload>(&self, payload: P, from: &Address, to: &[Address]) -> Result<Delivery> {
        let url = self.config.endpoint_url(payload.endpoint().path());
        let (writer, reader) = conduit(CAPACITY);
        let counter = reader.counter();
        let mut form = FormWriter::new(writer);
        let content_type = form.content_type();

        debug!(url = %url, recipients = to.len(), "encoding message");

        let produce = async move {
            match payload.encode(&mut form).await {
                Ok(()) => form.finish().await.map(drop).map_err(conduit_error),
                Err(e) => {
                    form.into_inner().abort();
                    Err(e)
                }
            }
        };
        let (produced, exchanged) =
            tokio::join!(produce, self.exchange(&url, &content_type, reader));
        let response = settle(produced, exchanged)?;
        let bytes_sent = counter.bytes();

        let Some(raw) = response else {
            info!(
                user = %self.config.invocation.user,
                len = bytes_sent,
                "{}",
                Delivery::SUPPRESSED
            );
            return Ok(Delivery::suppressed(bytes_sent));
        };

        let reply = raw.interpret()?;
        response::record(self.config, from, to, bytes_sent, &reply);
        if self.config.announce() {
            self.console.line(&format!("mailgun: {}", reply.api.message));
        }
        Ok(Delivery::accepted(reply, bytes_sent))
    }

    /// Consumer half: drains the conduit into an HTTP request.
    ///
    /// Returns `None` when sending is disabled.
    async fn exchange(
        &self,
        url: &str,
        content_type: &str,
        mut reader: ConduitReader,
    ) -> Result<Option<RawResponse>> {
        let builder = self
            .client
            .post(url)
            .basic_auth(API_USER, Some(&self.config.credentials.api_key))
            .header(CONTENT_TYPE, content_type);

        let request = if self.config.debug_http {
            let mut body = Vec::new();
            reader.read_to_end(&mut body).await.map_err(conduit_error)?;
            let request = builder.body(body).build().map_err(TransportError::Http)?;
            self.console.write(&response::dump_request(&request));
            self.console.line("");
            request
        } else if self.config.disable_mail {
            tokio::io::copy(&mut reader, &mut tokio::io::sink())
                .await
                .map_err(conduit_error)?;
            self.console.line(Delivery::SUPPRESSED);
            return Ok(None);
        } else {
            builder
                .body(Body::wrap_stream(ReaderStream::new(reader)))
                .build()
                .map_err(TransportError::Http)?
        };

        if self.config.disable_mail {
            self.console.line(Delivery::SUPPRESSED);
            return Ok(None);
        }

        let response = self
            .client
            .execute(request)
            .await
            .map_err(TransportError::Http)?;
        let raw = RawResponse::read(response).await?;
        if self.config.debug_http {
            self.console.write(&raw.dump());
            self.console.line("");
        }
        Ok(Some(raw))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use mgrelay_mime::{LineIngest, Termination};

    use crate::config::{Credentials, Invocation};

    fn config() -> Config {
        let mut config = Config::new(
            Credentials::new("mg.example.com", "key-test"),
            Invocation {
                user: "tester".to_string(),
                args: vec!["mailgun-mail".to_string()],
            },
        );
        config.disable_mail = true;
        config
    }

    async fn encoded<P: Payload>(payload: P) -> String {
        let mut form = FormWriter::with_boundary(Vec::new(), "B".to_string());
        payload.encode(&mut form).await.unwrap();
        String::from_utf8(form.finish().await.unwrap()).unwrap()
    }

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(Endpoint::Messages.path(), "messages");
        assert_eq!(Endpoint::Mime.path(), "messages.mime");
    }

    #[tokio::test]
    async fn test_message_field_order() {
        let message = Message::new(Address::new("me@mg.example.com"))
            .to(Address::new("a@example.com"))
            .cc(Address::new("c@example.com"))
            .bcc(Address::new("hidden@example.com"))
            .body("hi\n");
        let body = encoded(message).await;

        let names: Vec<&str> = body
            .match_indices("name=\"")
            .map(|(i, _)| {
                let rest = &body[i + 6..];
                &rest[..rest.find('"').unwrap()]
            })
            .collect();
        assert_eq!(names, ["from", "to", "cc", "bcc", "text"]);
        assert!(body.contains("\r\n\r\nhidden@example.com\r\n"));
    }

    #[tokio::test]
    async fn test_mime_payload_keeps_headers_drops_bcc() {
        let input = b"From: me@mg.example.com\nBcc: hidden@example.com\nSubject: hi\n\nbody\n";
        let mut ingest = LineIngest::new(Cursor::new(&input[..]), Termination::Eof);
        let headers = ingest.read_header().await.unwrap();
        let envelope = RawEnvelope::new(headers, ingest);

        let body = encoded(MimePayload {
            to: vec![Address::new("hidden@example.com")],
            envelope,
        })
        .await;

        assert!(body.contains("name=\"to\"\r\n\r\nhidden@example.com\r\n"));
        assert!(body.contains("name=\"message\"; filename=\"mime.msg\""));
        assert!(body.contains("From: me@mg.example.com\nSubject: hi\n\nbody\n"));
        assert!(!body.contains("Bcc:"));
    }

    #[tokio::test]
    async fn test_missing_attachment_aborts() {
        let config = config();
        let (console, _captured) = Console::capture();
        let transport = Transport::new(&config).with_console(console);
        let message = Message::new(Address::new("me"))
            .to(Address::new("you"))
            .attach("/nonexistent/mgrelay/attachment.bin");

        let err = transport.send_message(message).await.unwrap_err();
        match err {
            Error::Attachment { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/mgrelay/attachment.bin"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_disabled_counts_bytes() {
        let config = config();
        let (console, captured) = Console::capture();
        let transport = Transport::new(&config).with_console(console);
        let message = Message::new(Address::new("me"))
            .to(Address::new("you"))
            .body("hello\n");

        let delivery = transport.send_message(message.clone()).await.unwrap();
        assert!(delivery.suppressed);
        assert_eq!(captured.contents(), "not sending mail (disabled)\n");

        let mut qualified = message;
        qualified.apply_local_domain(config.domain());
        let expected = encoded(qualified).await;
        // The random boundary is 60 characters against the fixed "B".
        let boundaries = expected.matches("--B").count();
        assert_eq!(boundaries, 4);
        assert_eq!(
            delivery.bytes_sent,
            (expected.len() + 59 * boundaries) as u64
        );
    }

    #[test]
    fn test_settle_prefers_root_cause() {
        let attachment = || Error::Attachment {
            path: "x".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let pipe = || conduit_error(io::Error::from(io::ErrorKind::BrokenPipe));
        let http = || Error::Transport(TransportError::Conduit(io::Error::other("body aborted")));

        assert!(matches!(
            settle(Err(attachment()), Err(http())),
            Err(Error::Attachment { .. })
        ));
        assert!(matches!(
            settle(Err(pipe()), Err(Error::NoRecipients)),
            Err(Error::NoRecipients)
        ));
        assert!(matches!(settle(Ok(()), Ok(None)), Ok(None)));
        assert!(matches!(settle(Err(pipe()), Ok(None)), Err(e) if is_conduit(&e)));
    }
}
