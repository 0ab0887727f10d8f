//! Server-side WebSocket connection over an upgraded byte stream.
//!
//! A [`Connection`] owns the stream exclusively. It runs the handshake,
//! sends the greeting, and from then on decodes client frames in arrival
//! order until the peer closes, the stream ends, or a protocol error occurs.
//!
//! # Example
//!
//! ```ignore
//! let request = HttpRequest::parse(&head)?;
//! let mut conn = Connection::accept(&request, stream, &ConnectionConfig::default()).await?;
//!
//! while let Some(msg) = conn.recv().await? {
//!     if let Message::Text(text) = msg {
//!         conn.send_text(&text).await?;
//!     }
//! }
//! ```

use super::close::{CloseCode, CloseHandshake, CloseReason};
use super::frame::{encode_text_frame, Frame, FrameCodec, Opcode, WsError};
use super::handshake::{self, HandshakeError, HttpRequest};
use super::state::StateHandle;
use crate::codec::{Decoder, Encoder};
use bytes::BytesMut;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Greeting sent right after the upgrade unless configured otherwise.
pub const DEFAULT_GREETING: &str = "Hey client, this is server talking!";

const READ_CHUNK: usize = 4096;

/// Per-connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Text frame sent once the connection is open. `None` sends nothing.
    pub greeting: Option<String>,
    /// Largest accepted frame payload in bytes.
    pub max_payload_size: usize,
    /// Close the connection when no bytes arrive for this long.
    pub idle_timeout: Option<Duration>,
    /// How long a server-initiated close waits for the peer's reply.
    pub close_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            greeting: Some(DEFAULT_GREETING.to_string()),
            max_payload_size: FrameCodec::DEFAULT_MAX_PAYLOAD_SIZE,
            idle_timeout: None,
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionConfig {
    /// Set the greeting text.
    #[must_use]
    pub fn greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    /// Send no greeting.
    #[must_use]
    pub fn no_greeting(mut self) -> Self {
        self.greeting = None;
        self
    }

    /// Set the maximum frame payload size.
    #[must_use]
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the close handshake timeout.
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

/// Message delivered by [`Connection::recv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A complete text frame.
    Text(String),
    /// The peer closed the connection. Carries the parsed close payload when
    /// it was well formed.
    Close(Option<CloseReason>),
}

/// Errors from [`Connection::accept`].
#[derive(Debug)]
pub enum AcceptError {
    /// The upgrade request could not be answered.
    Handshake(HandshakeError),
    /// The connection failed right after the upgrade (greeting write).
    WebSocket(WsError),
}

impl fmt::Display for AcceptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshake(e) => write!(f, "handshake failed: {e}"),
            Self::WebSocket(e) => write!(f, "websocket error: {e}"),
        }
    }
}

impl std::error::Error for AcceptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Handshake(e) => Some(e),
            Self::WebSocket(e) => Some(e),
        }
    }
}

impl From<HandshakeError> for AcceptError {
    fn from(err: HandshakeError) -> Self {
        Self::Handshake(err)
    }
}

impl From<WsError> for AcceptError {
    fn from(err: WsError) -> Self {
        Self::WebSocket(err)
    }
}

/// An upgraded, server-side WebSocket connection.
pub struct Connection<IO> {
    io: IO,
    codec: FrameCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    state: StateHandle,
    close_handshake: CloseHandshake,
    idle_timeout: Option<Duration>,
}

impl<IO> Connection<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    /// Answers `request` on `stream` and opens the connection.
    ///
    /// On a missing `Sec-WebSocket-Key` a `400 Bad Request` is written
    /// instead of the 101 and the connection never opens. Once open, the
    /// configured greeting is sent as the first text frame.
    pub async fn accept(
        request: &HttpRequest,
        mut stream: IO,
        config: &ConnectionConfig,
    ) -> Result<Self, AcceptError> {
        let state = StateHandle::new();

        match handshake::accept_handshake(request, &mut stream).await {
            Ok(_) => {}
            Err(HandshakeError::MissingHandshakeKey) => {
                state.close();
                // The upgrade is aborted either way; a failed 400 write adds nothing.
                let _ = stream
                    .write_all(&handshake::reject(400, "Bad Request"))
                    .await;
                let _ = stream.shutdown().await;
                return Err(HandshakeError::MissingHandshakeKey.into());
            }
            Err(err) => {
                state.close();
                return Err(err.into());
            }
        }

        if !state.open() {
            return Err(WsError::ConnectionClosed.into());
        }
        tracing::debug!(path = %request.path, "websocket upgrade complete");

        let mut conn = Self::from_upgraded(stream, config, state);
        if let Some(greeting) = &config.greeting {
            conn.send_text(greeting).await?;
        }
        Ok(conn)
    }

    fn from_upgraded(io: IO, config: &ConnectionConfig, state: StateHandle) -> Self {
        Self {
            io,
            codec: FrameCodec::new().max_payload_size(config.max_payload_size),
            read_buf: BytesMut::with_capacity(8192),
            write_buf: BytesMut::with_capacity(8192),
            close_handshake: CloseHandshake::new(state.clone(), config.close_timeout),
            state,
            idle_timeout: config.idle_timeout,
        }
    }

    /// Queues bytes that were read past the end of the request head.
    ///
    /// They are decoded before anything else read from the stream.
    #[must_use]
    pub fn with_buffered(mut self, bytes: &[u8]) -> Self {
        self.read_buf.extend_from_slice(bytes);
        self
    }

    /// Returns a handle observing this connection's state.
    #[must_use]
    pub fn state(&self) -> StateHandle {
        self.state.clone()
    }

    /// Check if the connection is open for data.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.get().is_open()
    }

    /// Check if the connection reached its terminal state.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.get().is_closed()
    }

    /// Close reason sent by the peer, if any.
    #[must_use]
    pub fn peer_close_reason(&self) -> Option<&CloseReason> {
        self.close_handshake.peer_reason()
    }

    /// Sends `text` as one text frame.
    ///
    /// Fails with [`WsError::ConnectionClosed`] unless the connection is open.
    /// A write failure closes the connection.
    pub async fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        if !self.is_open() {
            return Err(WsError::ConnectionClosed);
        }
        let frame = encode_text_frame(text);
        if let Err(err) = self.write_bytes(&frame).await {
            self.close_handshake
                .force_close(CloseReason::new(CloseCode::Abnormal, None));
            return Err(err);
        }
        Ok(())
    }

    /// Receives the next message.
    ///
    /// Frames are handled in the order they arrive. Frames other than text
    /// and close are skipped. A close frame is echoed and reported once as
    /// [`Message::Close`]; after that, and after the stream ends, this
    /// returns `None`.
    ///
    /// A decode error, an idle timeout or a read failure closes the
    /// connection and is returned.
    ///
    /// Dropping the future loses no input. A frame write it interrupts, such
    /// as the close echo, is finished by the next write or by
    /// [`close`](Self::close).
    pub async fn recv(&mut self) -> Result<Option<Message>, WsError> {
        loop {
            if self.is_closed() {
                return Ok(None);
            }

            let frame = match self.codec.decode(&mut self.read_buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    match self.read_more().await {
                        Ok(0) => return self.on_eof(),
                        Ok(_) => continue,
                        Err(err) => return Err(self.fail(err).await),
                    }
                }
                Err(err) => return Err(self.fail(err).await),
            };

            match frame.opcode {
                Opcode::Text if frame.fin => match String::from_utf8(frame.payload.to_vec()) {
                    Ok(text) => return Ok(Some(Message::Text(text))),
                    Err(_) => return Err(self.fail(WsError::InvalidUtf8).await),
                },
                Opcode::Close => return self.on_close_frame(&frame).await,
                opcode => {
                    tracing::debug!(
                        ?opcode,
                        fin = frame.fin,
                        len = frame.payload.len(),
                        "ignoring frame"
                    );
                }
            }
        }
    }

    /// Starts a server-side close and waits for the peer's close frame.
    ///
    /// The wait is bounded by the configured close timeout. The connection
    /// is closed when this returns, whatever the peer did.
    ///
    /// If a close exchange is already under way, only its pending output is
    /// flushed before the connection is closed.
    pub async fn close(&mut self, reason: CloseReason) -> Result<(), WsError> {
        let limit = self.close_handshake.close_timeout();
        let Some(frame) = self.close_handshake.initiate(reason) else {
            if self.is_closed() {
                return Ok(());
            }
            let flushed = match tokio::time::timeout(limit, self.flush_pending()).await {
                Ok(result) => result,
                Err(_) => Err(WsError::Timeout),
            };
            self.close_handshake.force_close(CloseReason::going_away());
            let _ = self.io.shutdown().await;
            return flushed;
        };

        if let Err(err) = self.write_frame(frame).await {
            self.close_handshake.force_close(CloseReason::going_away());
            return Err(err);
        }

        let result = match tokio::time::timeout(limit, self.await_peer_close()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(timeout_ms = limit.as_millis(), "close handshake timed out");
                Ok(())
            }
        };

        if !self.is_closed() {
            self.close_handshake.force_close(CloseReason::going_away());
        }
        result
    }

    async fn on_close_frame(&mut self, frame: &Frame) -> Result<Option<Message>, WsError> {
        let reason = CloseReason::parse(&frame.payload).ok();
        let Some(echo) = self.close_handshake.receive_close(frame) else {
            // Reply to our own close frame: the handshake is finished.
            return Ok(Some(Message::Close(reason)));
        };

        let written = self.write_frame(echo).await;
        self.close_handshake.complete();
        if let Err(err) = written {
            tracing::debug!(error = %err, "close echo not delivered");
        }
        let _ = self.io.shutdown().await;
        Ok(Some(Message::Close(reason)))
    }

    fn on_eof(&mut self) -> Result<Option<Message>, WsError> {
        let pending = self.codec.decode_eof(&mut self.read_buf);
        self.close_handshake
            .force_close(CloseReason::new(CloseCode::Abnormal, None));
        match pending {
            Ok(_) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Closes the connection after a fatal error, telling the peer why when
    /// the error maps to a close code.
    async fn fail(&mut self, err: WsError) -> WsError {
        let code = err.close_code();
        if let Some(code) = code.filter(|_| self.is_open()) {
            let frame = CloseReason::new(code, None).to_frame();
            if let Err(write_err) = self.write_frame(frame).await {
                tracing::debug!(error = %write_err, "close frame not delivered");
            }
        }
        self.close_handshake
            .force_close(CloseReason::new(code.unwrap_or(CloseCode::Abnormal), None));
        err
    }

    async fn await_peer_close(&mut self) -> Result<(), WsError> {
        while !self.is_closed() {
            match self.codec.decode(&mut self.read_buf)? {
                Some(frame) if frame.opcode == Opcode::Close => {
                    self.close_handshake.receive_close(&frame);
                }
                Some(_) => {}
                None => {
                    self.read_buf.reserve(READ_CHUNK);
                    if self.io.read_buf(&mut self.read_buf).await? == 0 {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    async fn read_more(&mut self) -> Result<usize, WsError> {
        let idle_timeout = self.idle_timeout;
        self.read_buf.reserve(READ_CHUNK);
        let read = self.io.read_buf(&mut self.read_buf);
        let n = match idle_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| WsError::Timeout)??,
            None => read.await?,
        };
        Ok(n)
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<(), WsError> {
        self.flush_pending().await?;
        self.codec.encode(frame, &mut self.write_buf)?;
        self.flush_pending().await
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WsError> {
        self.flush_pending().await?;
        self.write_buf.extend_from_slice(bytes);
        self.flush_pending().await
    }

    /// Writes whatever is left in `write_buf`. The buffer only loses the
    /// bytes already written, so an interrupted call can be resumed.
    async fn flush_pending(&mut self) -> Result<(), WsError> {
        if !self.write_buf.is_empty() {
            self.io.write_all_buf(&mut self.write_buf).await?;
        }
        self.io.flush().await?;
        Ok(())
    }
}

impl<IO> fmt::Debug for Connection<IO> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state.get())
            .field("buffered", &self.read_buf.len())
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}
