//! Test utilities for textws.
//!
//! This module provides shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Builders for client-side (masked) frames and upgrade requests
//! - Readers for server responses and server frames
//!
//! # Example
//! ```
//! use textws::test_utils::{client_text, init_test_logging};
//!
//! init_test_logging();
//! let frame = client_text("Hello");
//! assert_eq!(frame[0], 0x81);
//! ```

use parking_lot::{Mutex, MutexGuard};
use std::io;
use std::sync::Once;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Handshake key from RFC 6455 Section 1.3.
pub const TEST_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
/// Accept token matching [`TEST_KEY`].
pub const TEST_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";
/// Mask used by [`client_text`] and [`client_close`].
pub const TEST_MASK: [u8; 4] = [0x37, 0xFA, 0x21, 0x3D];

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Acquire the global environment lock for tests that mutate env vars.
pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock()
}

/// Builds an upgrade request carrying `key`.
#[must_use]
pub fn upgrade_request(key: &str) -> Vec<u8> {
    format!(
        "GET / HTTP/1.1\r\n\
         Host: localhost:4000\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Builds a final, masked frame as a client would send it.
#[must_use]
pub fn client_frame(opcode: u8, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(0x80 | (opcode & 0x0F));

    let len = payload.len();
    if len <= 125 {
        out.push(0x80 | len as u8);
    } else if len <= usize::from(u16::MAX) {
        out.push(0x80 | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0x80 | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    out.extend_from_slice(&mask);
    out.extend(
        payload
            .iter()
            .enumerate()
            .map(|(i, byte)| byte ^ mask[i % 4]),
    );
    out
}

/// Builds a masked text frame.
#[must_use]
pub fn client_text(text: &str) -> Vec<u8> {
    client_frame(0x1, text.as_bytes(), TEST_MASK)
}

/// Builds a masked close frame with an optional status code.
#[must_use]
pub fn client_close(code: Option<u16>) -> Vec<u8> {
    let payload = code.map(u16::to_be_bytes);
    client_frame(0x8, payload.as_ref().map_or(&[][..], |p| &p[..]), TEST_MASK)
}

/// Reads an HTTP response head (through the blank line) and returns it as
/// text.
pub async fn read_response_head<R>(reader: &mut R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        match reader.read_u8().await {
            Ok(byte) => head.push(byte),
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Reads one unmasked server frame and returns its first header byte and
/// payload.
pub async fn read_server_frame<R>(reader: &mut R) -> io::Result<(u8, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let first = reader.read_u8().await?;
    let second = reader.read_u8().await?;
    if second & 0x80 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "server frame is masked",
        ));
    }

    let len = match second & 0x7F {
        126 => u64::from(reader.read_u16().await?),
        127 => reader.read_u64().await?,
        short => u64::from(short),
    };
    let len = usize::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame length overflow"))?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok((first, payload))
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
