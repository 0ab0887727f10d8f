//! textws: a text-only WebSocket server written directly against a byte stream.
//!
//! # Overview
//!
//! textws implements the server side of RFC 6455 without a WebSocket
//! library: it answers the HTTP upgrade, encodes outbound text frames and
//! decodes masked client frames itself. Anything other than text and close
//! frames is ignored.
//!
//! # Core Guarantees
//!
//! - **Exact handshake**: the accept token is `base64(SHA-1(key ++ GUID))` and
//!   the 101 response is written byte for byte
//! - **Bounds-checked decoding**: a frame shorter than its header declares is
//!   rejected, never read past
//! - **Masking enforced**: unmasked client frames close the connection
//! - **Ordered processing**: frames are decoded in arrival order, whatever the
//!   read boundaries
//! - **Connection-local failures**: an error closes its own connection only
//!
//! # Module Structure
//!
//! - [`net::websocket`]: handshake, frame codec, close handshake, connection
//! - [`codec`]: `Decoder` / `Encoder` traits the frame codec implements
//! - [`server`]: TCP listener, message handlers, shutdown
//! - [`config`]: server configuration (defaults, TOML file, environment)
//! - [`error`]: crate-level error type
//! - [`test_utils`]: helpers shared by unit and integration tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod codec;
pub mod config;
pub mod error;
pub mod net;
pub mod server;
pub mod test_utils;

pub use config::{ConfigError, ServerConfig};
pub use error::{Error, Result};
pub use net::websocket::{
    CloseReason, Connection, ConnectionConfig, ConnectionState, Decoded, Frame, FrameCodec,
    HandshakeError, Message, Opcode, WsError,
};
pub use server::{EchoHandler, LogHandler, MessageHandler, Server};
