//! Interpretation and logging of API responses.

use std::fmt::Write;

use bytes::{Bytes, BytesMut};
use mgrelay_mime::{Address, canonical_name};
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Version};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::TransportError;

/// Success body returned by the messages endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiReply {
    /// Human-readable status (`Queued. Thank you.`).
    pub message: String,
    /// Message id assigned by the API.
    pub id: String,
}

/// A decoded success response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// The decoded fields.
    pub api: ApiReply,
    /// The response JSON without insignificant whitespace.
    pub compact: String,
}

/// Outcome of a completed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Message id, absent when sending was suppressed.
    pub id: Option<String>,
    /// Status text from the API, or the suppression note.
    pub message: String,
    /// Bytes that passed through the payload conduit.
    pub bytes_sent: u64,
    /// True if the network call was skipped.
    pub suppressed: bool,
}

impl Delivery {
    /// Note used when sending is disabled.
    pub const SUPPRESSED: &str = "not sending mail (disabled)";

    /// Creates the synthetic result of a dry run.
    #[must_use]
    pub fn suppressed(bytes_sent: u64) -> Self {
        Self {
            id: None,
            message: Self::SUPPRESSED.to_string(),
            bytes_sent,
            suppressed: true,
        }
    }

    /// Creates the result of an accepted message.
    #[must_use]
    pub fn accepted(reply: Reply, bytes_sent: u64) -> Self {
        Self {
            id: Some(reply.api.id),
            message: reply.api.message,
            bytes_sent,
            suppressed: false,
        }
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Status code.
    pub status: StatusCode,
    /// Protocol version.
    pub version: Version,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl RawResponse {
    /// Reads the whole response.
    ///
    /// A rejection stays a rejection when its body breaks off: the status is
    /// kept with whatever arrived before the failure.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the body of a 200 response cannot
    /// be read.
    pub async fn read(mut response: reqwest::Response) -> Result<Self, TransportError> {
        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();

        let mut body = BytesMut::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) if status == StatusCode::OK => return Err(e.into()),
                Err(e) => {
                    debug!(status = %status, "error response body cut short: {e}");
                    break;
                }
            }
        }

        Ok(Self {
            status,
            version,
            headers,
            body: body.freeze(),
        })
    }

    /// Decodes the response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Status`] for any status but 200, and
    /// [`TransportError::MalformedResponse`] if a 200 body is not the
    /// expected JSON object.
    pub fn interpret(&self) -> Result<Reply, TransportError> {
        let text = String::from_utf8_lossy(&self.body).into_owned();
        if self.status != StatusCode::OK {
            return Err(TransportError::Status {
                status: self.status,
                body: text,
            });
        }

        let malformed = |e: serde_json::Error| TransportError::MalformedResponse {
            reason: e.to_string(),
            body: text.clone(),
        };
        let api: ApiReply = serde_json::from_slice(&self.body).map_err(malformed)?;

        Ok(Reply {
            api,
            compact: compact_json(&text),
        })
    }

    /// Renders status line, headers and body.
    #[must_use]
    pub fn dump(&self) -> Vec<u8> {
        let mut head = format!("{:?} {}\r\n", self.version, self.status);
        write_headers(&mut head, &self.headers);
        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Drops the whitespace between JSON tokens, leaving strings and key order
/// as the server sent them.
fn compact_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if !matches!(c, ' ' | '\t' | '\n' | '\r') {
            in_string = c == '"';
            out.push(c);
        }
    }
    out
}

/// Renders a request the way it goes on the wire (body included if buffered).
#[must_use]
pub fn dump_request(request: &reqwest::Request) -> Vec<u8> {
    let url = request.url();
    let target = url
        .query()
        .map_or_else(|| url.path().to_string(), |q| format!("{}?{q}", url.path()));

    let mut head = format!("{} {target} HTTP/1.1\r\n", request.method());
    if let Some(host) = url.host_str() {
        match url.port() {
            Some(port) => {
                let _ = write!(head, "Host: {host}:{port}\r\n");
            }
            None => {
                let _ = write!(head, "Host: {host}\r\n");
            }
        }
    }
    write_headers(&mut head, request.headers());

    let mut out = head.into_bytes();
    if let Some(body) = request.body().and_then(reqwest::Body::as_bytes) {
        out.extend_from_slice(body);
    }
    out
}

fn write_headers(out: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        let value = value.to_str().unwrap_or("<binary>");
        let _ = write!(out, "{}: {value}\r\n", canonical_name(name.as_str()));
    }
    out.push_str("\r\n");
}

/// Writes the log record for an accepted message.
pub fn record(config: &Config, from: &Address, to: &[Address], bytes_sent: u64, reply: &Reply) {
    let to: Vec<String> = to.iter().map(ToString::to_string).collect();
    info!(
        user = %config.invocation.user,
        args = ?config.invocation.args,
        from = %from,
        to = ?to,
        len = bytes_sent,
        resp = %reply.compact,
        "mail accepted"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn raw(status: u16, body: &'static str) -> RawResponse {
        RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_success() {
        let reply = raw(
            200,
            "{\n  \"id\": \"<2024.1@mg.example.com>\",\n  \"message\": \"Queued. Thank you.\"\n}\n",
        )
        .interpret()
        .unwrap();
        assert_eq!(reply.api.message, "Queued. Thank you.");
        assert_eq!(reply.api.id, "<2024.1@mg.example.com>");
        assert_eq!(
            reply.compact,
            "{\"id\":\"<2024.1@mg.example.com>\",\"message\":\"Queued. Thank you.\"}"
        );
    }

    #[test]
    fn test_compact_keeps_order_and_strings() {
        let reply = raw(
            200,
            "{ \"message\" : \"Queued.  \\\"Thank\\\" \\u00e9\",\n\t\"id\": \"<a b>\" }",
        )
        .interpret()
        .unwrap();
        assert_eq!(reply.api.message, "Queued.  \"Thank\" \u{e9}");
        assert_eq!(
            reply.compact,
            "{\"message\":\"Queued.  \\\"Thank\\\" \\u00e9\",\"id\":\"<a b>\"}"
        );
    }

    #[test]
    fn test_malformed_success() {
        let err = raw(200, "<html>oops</html>").interpret().unwrap_err();
        match err {
            TransportError::MalformedResponse { body, .. } => assert_eq!(body, "<html>oops</html>"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_fields_is_malformed() {
        let err = raw(200, "{\"message\": \"ok\"}").interpret().unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse { .. }));
    }

    #[test]
    fn test_error_status_keeps_body() {
        let err = raw(401, "Forbidden").interpret().unwrap_err();
        assert_eq!(err.server_detail(), Some("Forbidden"));
        assert_eq!(err.to_string(), "sending mail: 401 Unauthorized\nForbidden");
    }

    #[test]
    fn test_dump_response() {
        let mut response = raw(200, "{}");
        response
            .headers
            .insert("content-type", "application/json".parse().unwrap());
        let dump = String::from_utf8(response.dump()).unwrap();
        assert_eq!(
            dump,
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{}"
        );
    }

    #[test]
    fn test_suppressed_delivery() {
        let delivery = Delivery::suppressed(42);
        assert!(delivery.suppressed);
        assert!(delivery.id.is_none());
        assert_eq!(delivery.bytes_sent, 42);
    }
}
