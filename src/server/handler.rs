//! Application hooks for received text.

use std::net::SocketAddr;

/// Handles text messages received on a connection.
///
/// Called once per text frame, in arrival order. A returned string is sent
/// back to the same client as a text frame.
pub trait MessageHandler: Send + Sync {
    /// Handles one text message from `peer`.
    fn on_text(&self, peer: SocketAddr, text: &str) -> Option<String>;
}

impl<F> MessageHandler for F
where
    F: Fn(SocketAddr, &str) -> Option<String> + Send + Sync,
{
    fn on_text(&self, peer: SocketAddr, text: &str) -> Option<String> {
        self(peer, text)
    }
}

/// Logs every message and never replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHandler;

impl MessageHandler for LogHandler {
    fn on_text(&self, peer: SocketAddr, text: &str) -> Option<String> {
        tracing::info!(peer = %peer, len = text.len(), text = %text, "client websocket frame");
        None
    }
}

/// Logs every message and sends it back unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl MessageHandler for EchoHandler {
    fn on_text(&self, peer: SocketAddr, text: &str) -> Option<String> {
        LogHandler.on_text(peer, text);
        Some(text.to_string())
    }
}
