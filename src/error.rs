//! Crate-level error type.
//!
//! Protocol errors ([`WsError`], [`HandshakeError`]) stay connection-local;
//! [`Error`] gathers them with configuration and listener failures for the
//! server and the binary.

use crate::config::ConfigError;
use crate::net::websocket::{AcceptError, HandshakeError, WsError};
use thiserror::Error;

/// Errors surfaced by the server and the `textws` binary.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The upgrade handshake failed.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// A WebSocket protocol or stream error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// The HTTP request head exceeded the configured limit.
    #[error("request head exceeds {limit} bytes")]
    HeaderTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// I/O error (bind, accept, plain HTTP responses).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AcceptError> for Error {
    fn from(err: AcceptError) -> Self {
        match err {
            AcceptError::Handshake(e) => Self::Handshake(e),
            AcceptError::WebSocket(e) => Self::WebSocket(e),
        }
    }
}

/// Result alias using the crate [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
