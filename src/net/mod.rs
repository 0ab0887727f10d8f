//! Networking protocols.
//!
//! The only protocol implemented here is WebSocket; TCP itself comes from
//! `tokio::net`.

pub mod websocket;
