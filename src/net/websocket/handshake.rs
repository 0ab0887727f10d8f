//! Server side of the opening handshake (RFC 6455 Section 4.2).
//!
//! # Client Handshake
//!
//! ```http
//! GET /chat HTTP/1.1
//! Host: server.example.com
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! Sec-WebSocket-Version: 13
//! ```
//!
//! # Server Response
//!
//! ```http
//! HTTP/1.1 101 Web Socket Protocols
//! Upgrade: WebSocket
//! Connection: Upgrade
//! Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```
//!
//! Only `Sec-WebSocket-Key` is required to accept; checking that the request
//! is an upgrade at all is left to the listener ([`HttpRequest::is_upgrade`]).

use base64::Engine;
use sha1::{Digest, Sha1};
use std::fmt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// RFC 6455 GUID for Sec-WebSocket-Accept calculation.
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Header carrying the client's handshake nonce.
pub const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";

/// Status line of the upgrade response.
const SWITCHING_STATUS_LINE: &str = "HTTP/1.1 101 Web Socket Protocols";

/// Derives the `Sec-WebSocket-Accept` token: the base64 encoding of the
/// SHA-1 digest of `client_key` followed by the RFC 6455 GUID.
///
/// The key is used as sent, without trimming or decoding.
///
/// # Example
///
/// ```
/// use textws::net::websocket::compute_accept_key;
///
/// let client_key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(client_key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// WebSocket handshake errors.
#[derive(Debug)]
pub enum HandshakeError {
    /// The request carries no `Sec-WebSocket-Key` header.
    MissingHandshakeKey,
    /// Invalid HTTP request.
    InvalidRequest(String),
    /// I/O error.
    Io(std::io::Error),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHandshakeKey => write!(f, "missing Sec-WebSocket-Key header"),
            Self::InvalidRequest(msg) => write!(f, "invalid HTTP request: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for HandshakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HandshakeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Result of accepting a WebSocket upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptResponse {
    /// Computed Sec-WebSocket-Accept value.
    pub accept_key: String,
}

impl AcceptResponse {
    /// Generate the HTTP 101 response as bytes.
    #[must_use]
    pub fn response_bytes(&self) -> Vec<u8> {
        format!(
            "{SWITCHING_STATUS_LINE}\r\n\
             Upgrade: WebSocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             \r\n",
            self.accept_key
        )
        .into_bytes()
    }
}

/// Derives the accept response for an upgrade request.
///
/// # Errors
///
/// Returns [`HandshakeError::MissingHandshakeKey`] if the request has no
/// `Sec-WebSocket-Key` header.
pub fn accept(request: &HttpRequest) -> Result<AcceptResponse, HandshakeError> {
    let client_key = request
        .header(SEC_WEBSOCKET_KEY)
        .ok_or(HandshakeError::MissingHandshakeKey)?;

    Ok(AcceptResponse {
        accept_key: compute_accept_key(client_key),
    })
}

/// Completes the upgrade by writing the 101 response to `stream`.
///
/// Nothing is written when the key header is missing. Moving the connection
/// to `Open` is the caller's job once this returns `Ok`.
pub async fn accept_handshake<W>(
    request: &HttpRequest,
    stream: &mut W,
) -> Result<AcceptResponse, HandshakeError>
where
    W: AsyncWrite + Unpin,
{
    let response = accept(request)?;
    stream.write_all(&response.response_bytes()).await?;
    stream.flush().await?;
    Ok(response)
}

/// Generate a rejection response with the given HTTP status code.
#[must_use]
pub fn reject(status: u16, reason: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Connection: close\r\n\
         Content-Length: 0\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Request line and headers of an HTTP/1.x request head.
///
/// Header names are matched case-insensitively. A header sent more than once
/// is kept as one comma-separated value, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target up to (not including) any `?`.
    pub path: String,
    /// Query string after the `?`, if the target had one.
    pub query: Option<String>,
    /// Protocol version from the request line, e.g. `HTTP/1.1`.
    pub version: String,
    headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Parses a request head. Lines end in CRLF; parsing stops at the first
    /// empty line.
    ///
    /// # Errors
    ///
    /// Returns `HandshakeError::InvalidRequest` for a head that is not UTF-8,
    /// a malformed request line, a version other than HTTP/1.x, or a header
    /// line without a name.
    pub fn parse(head: &[u8]) -> Result<Self, HandshakeError> {
        let text = std::str::from_utf8(head)
            .map_err(|_| HandshakeError::InvalidRequest("request head is not UTF-8".into()))?;

        let mut lines = text.split("\r\n");
        let (method, target, version) = parse_request_line(lines.next().unwrap_or_default())?;
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in lines.take_while(|line| !line.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .map(|(name, value)| (name.trim(), value.trim()))
                .filter(|(name, _)| !name.is_empty() && !name.contains(char::is_whitespace))
                .ok_or_else(|| {
                    HandshakeError::InvalidRequest(format!("malformed header line {line:?}"))
                })?;

            match headers
                .iter_mut()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            {
                Some((_, joined)) => {
                    joined.push_str(", ");
                    joined.push_str(value);
                }
                None => headers.push((name.to_ascii_lowercase(), value.to_string())),
            }
        }

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            query,
            version: version.to_string(),
            headers,
        })
    }

    /// Get a header value by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns true if the comma-separated header `name` lists `token`.
    #[must_use]
    pub fn header_has_token(&self, name: &str, token: &str) -> bool {
        self.header(name).is_some_and(|value| {
            value
                .split(',')
                .any(|item| item.trim().eq_ignore_ascii_case(token))
        })
    }

    /// All headers with lower-cased names.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns true for a `GET` carrying `Upgrade: websocket` and a
    /// `Connection` header that lists `upgrade`.
    #[must_use]
    pub fn is_upgrade(&self) -> bool {
        self.method == "GET"
            && self.header_has_token("upgrade", "websocket")
            && self.header_has_token("connection", "upgrade")
    }
}

/// Splits `METHOD SP target SP HTTP/1.x`.
fn parse_request_line(line: &str) -> Result<(&str, &str, &str), HandshakeError> {
    let mut parts = line.split(' ');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version), None)
            if !method.is_empty() && target.starts_with('/') && version.starts_with("HTTP/1.") =>
        {
            Ok((method, target, version))
        }
        _ => Err(HandshakeError::InvalidRequest(format!(
            "malformed request line {line:?}"
        ))),
    }
}

/// Returns the length of the request head (through the blank line), if the
/// buffer holds a complete one.
#[must_use]
pub fn request_head_len(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}
