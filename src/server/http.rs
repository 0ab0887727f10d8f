//! The plain HTTP side of the listener: reading request heads and answering
//! requests that are not WebSocket upgrades.

use crate::error::{Error, Result};
use crate::net::websocket::{request_head_len, HandshakeError, HttpRequest};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Body of the plain `GET /` route.
pub const HELLO_BODY: &str = "Hello!";

/// A parsed request head and whatever followed it in the same reads.
#[derive(Debug)]
pub struct RequestHead {
    /// The parsed request line and headers.
    pub request: HttpRequest,
    /// Bytes received after the blank line ending the head.
    pub leftover: BytesMut,
}

/// Reads one HTTP request head from `stream`.
///
/// Returns `Ok(None)` if the peer closes before sending anything. Fails with
/// [`Error::HeaderTooLarge`] once `limit` bytes arrived without a complete
/// head.
pub async fn read_request_head<R>(stream: &mut R, limit: usize) -> Result<Option<RequestHead>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(limit.min(4096));
    loop {
        if let Some(len) = request_head_len(&buf) {
            let head = buf.split_to(len);
            let request = HttpRequest::parse(&head)?;
            return Ok(Some(RequestHead {
                request,
                leftover: buf,
            }));
        }
        if buf.len() >= limit {
            return Err(Error::HeaderTooLarge { limit });
        }

        if stream.read_buf(&mut buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(HandshakeError::InvalidRequest(
                "connection closed before end of request head".into(),
            )
            .into());
        }
    }
}

/// Builds the response for a request that is not a WebSocket upgrade.
///
/// `GET /` answers `200 OK` with [`HELLO_BODY`]; every response carries
/// `Access-Control-Allow-Origin: allowed_origin`.
#[must_use]
pub fn plain_response(request: &HttpRequest, allowed_origin: &str) -> Vec<u8> {
    let (status, reason, body) = match (request.method.as_str(), request.path.as_str()) {
        ("GET" | "HEAD", "/") => (200, "OK", HELLO_BODY),
        (_, "/") => (405, "Method Not Allowed", "Method Not Allowed"),
        _ => (404, "Not Found", "Not Found"),
    };
    let body = if request.method == "HEAD" { "" } else { body };

    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: {allowed_origin}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{upgrade_request, TEST_KEY};

    const ORIGIN: &str = "http://localhost:3000";

    fn request(raw: &[u8]) -> HttpRequest {
        HttpRequest::parse(raw).unwrap()
    }

    #[test]
    fn root_says_hello_with_cors() {
        let response = plain_response(&request(b"GET / HTTP/1.1\r\n\r\n"), ORIGIN);
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: http://localhost:3000\r\n"));
        assert!(text.contains("Content-Length: 6\r\n"));
        assert!(text.ends_with("\r\n\r\nHello!"));
    }

    #[test]
    fn root_with_query_says_hello() {
        let response = plain_response(&request(b"GET /?v=1 HTTP/1.1\r\n\r\n"), ORIGIN);
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn head_has_no_body() {
        let response = plain_response(&request(b"HEAD / HTTP/1.1\r\n\r\n"), ORIGIN);
        let text = String::from_utf8(response).unwrap();
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn other_paths_are_not_found() {
        let response = plain_response(&request(b"GET /missing HTTP/1.1\r\n\r\n"), ORIGIN);
        assert!(response.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn post_to_root_is_not_allowed() {
        let response = plain_response(&request(b"POST / HTTP/1.1\r\n\r\n"), ORIGIN);
        assert!(response.starts_with(b"HTTP/1.1 405 Method Not Allowed\r\n"));
    }

    #[tokio::test]
    async fn reads_head_and_keeps_leftover() {
        let mut raw = upgrade_request(TEST_KEY);
        raw.extend_from_slice(&[0x81, 0x80]);
        let mut stream = &raw[..];

        let head = read_request_head(&mut stream, 8192).await.unwrap().unwrap();
        assert!(head.request.is_upgrade());
        assert_eq!(head.leftover.as_ref(), &[0x81, 0x80]);
    }

    #[tokio::test]
    async fn empty_stream_yields_none() {
        let mut stream: &[u8] = &[];
        assert!(read_request_head(&mut stream, 8192).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_head_is_invalid() {
        let mut stream: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n";
        assert!(matches!(
            read_request_head(&mut stream, 8192).await,
            Err(Error::Handshake(HandshakeError::InvalidRequest(_)))
        ));
    }

    #[tokio::test]
    async fn oversized_head_is_rejected() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        raw.extend(std::iter::repeat(b'x').take(200));
        let mut stream = &raw[..];
        assert!(matches!(
            read_request_head(&mut stream, 64).await,
            Err(Error::HeaderTooLarge { limit: 64 })
        ));
    }
}
