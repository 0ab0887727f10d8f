//! WebSocket protocol implementation (RFC 6455), server side, text only.
//!
//! This module provides the upgrade handshake, the frame codec and a
//! connection type driving both over any `AsyncRead + AsyncWrite` stream.
//!
//! # Architecture
//!
//! - `handshake`: HTTP upgrade negotiation (RFC 6455 Section 4)
//! - `frame`: Wire format encoding/decoding (RFC 6455 Section 5)
//! - `close`: Close handshake protocol (RFC 6455 Section 7)
//! - `state`: Connection lifecycle shared behind a mutex
//! - `connection`: Handshake, greeting and frame loop for one client
//!
//! # Example
//!
//! ```
//! use textws::net::websocket::{decode_frame, encode_text_frame, Decoded};
//!
//! let frame = encode_text_frame("Hey");
//! assert_eq!(frame.as_ref(), &[0x81, 0x03, b'H', b'e', b'y']);
//!
//! let masked = [0x81, 0x85, 0x37, 0xFA, 0x21, 0x3D, 0x7F, 0x9F, 0x4D, 0x51, 0x58];
//! let Decoded::Frame(decoded) = decode_frame(&masked).unwrap() else {
//!     unreachable!()
//! };
//! assert_eq!(decoded.text, "Hello");
//! ```

mod close;
mod connection;
mod frame;
mod handshake;
mod state;

pub use close::{CloseCode, CloseHandshake, CloseReason};
pub use connection::{AcceptError, Connection, ConnectionConfig, Message, DEFAULT_GREETING};
pub use frame::{
    apply_mask, decode_frame, encode_text_frame, Decoded, DecodedFrame, Frame, FrameCodec, Opcode,
    WsError,
};
pub use handshake::{
    accept, accept_handshake, compute_accept_key, reject, request_head_len, AcceptResponse,
    HandshakeError, HttpRequest,
};
pub use state::{ConnectionState, InvalidTransition, StateHandle};
