//! Close frames and the close exchange (RFC 6455 Section 7).
//!
//! A client close is answered with a close frame carrying the client's
//! status code (1000 when it sent none), after which the connection is
//! closed. A server close sends a frame first and waits for the client's
//! reply. [`CloseHandshake`] tracks both directions and moves the
//! connection's [`StateHandle`] from `Open` through `Closing` to `Closed`.

use super::frame::{Frame, Opcode, WsError};
use super::state::{ConnectionState, StateHandle};
use std::time::Duration;

/// Close codes defined by RFC 6455.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure (1000).
    Normal = 1000,
    /// Going away (1001).
    GoingAway = 1001,
    /// Protocol error (1002).
    ProtocolError = 1002,
    /// Unsupported data type (1003).
    Unsupported = 1003,
    /// No status received (1005) - must not be sent in a frame.
    NoStatusReceived = 1005,
    /// Abnormal closure (1006) - must not be sent in a frame.
    Abnormal = 1006,
    /// Invalid payload data (1007).
    InvalidPayload = 1007,
    /// Policy violation (1008).
    PolicyViolation = 1008,
    /// Message too big (1009).
    MessageTooBig = 1009,
    /// Internal server error (1011).
    InternalError = 1011,
}

impl CloseCode {
    /// Parse a close code from a u16 value.
    ///
    /// Returns `None` for codes without a named variant, including the
    /// registered and private ranges (3000-4999).
    #[must_use]
    pub const fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::ProtocolError),
            1003 => Some(Self::Unsupported),
            1005 => Some(Self::NoStatusReceived),
            1006 => Some(Self::Abnormal),
            1007 => Some(Self::InvalidPayload),
            1008 => Some(Self::PolicyViolation),
            1009 => Some(Self::MessageTooBig),
            1011 => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Check if a raw code value is valid on the wire.
    ///
    /// Valid ranges per RFC 6455:
    /// - 1000-1003, 1007-1011: Standard codes
    /// - 3000-3999: Registered (IANA)
    /// - 4000-4999: Private use
    #[must_use]
    pub const fn is_valid_code(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code as Self
    }
}

/// Parsed close frame payload.
///
/// A close frame may contain:
/// - No payload (empty)
/// - 2 bytes: status code only
/// - 2+ bytes: status code followed by UTF-8 reason text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReason {
    /// Raw close status code (if present).
    pub code: Option<u16>,
    /// Close reason text (if present).
    pub text: Option<String>,
}

impl CloseReason {
    /// Create a new close reason.
    #[must_use]
    pub fn new(code: CloseCode, text: Option<&str>) -> Self {
        Self {
            code: Some(code.into()),
            text: text.map(String::from),
        }
    }

    /// Create an empty close reason (no code or text).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a close reason for normal closure.
    #[must_use]
    pub fn normal() -> Self {
        Self::new(CloseCode::Normal, None)
    }

    /// Create a close reason for going away (shutdown, idle timeout).
    #[must_use]
    pub fn going_away() -> Self {
        Self::new(CloseCode::GoingAway, None)
    }

    /// Returns the named close code, if the raw code has one.
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        self.code.and_then(CloseCode::from_u16)
    }

    /// Parse a close frame payload.
    ///
    /// # Errors
    ///
    /// Returns `WsError::InvalidClosePayload` if:
    /// - Payload is exactly 1 byte
    /// - The status code is outside the valid ranges
    /// - Reason text is not valid UTF-8
    pub fn parse(payload: &[u8]) -> Result<Self, WsError> {
        match payload.len() {
            0 => Ok(Self::empty()),
            1 => Err(WsError::InvalidClosePayload),
            _ => {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                if !CloseCode::is_valid_code(code) {
                    return Err(WsError::InvalidClosePayload);
                }

                let text = if payload.len() > 2 {
                    let text = std::str::from_utf8(&payload[2..])
                        .map_err(|_| WsError::InvalidClosePayload)?;
                    Some(text.to_string())
                } else {
                    None
                };

                Ok(Self {
                    code: Some(code),
                    text,
                })
            }
        }
    }

    /// Convert to a close frame.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        Frame::close(self.code, self.text.as_deref())
    }
}

/// Close handshake state machine.
///
/// Tracks who initiated the close and with which reason, and moves the
/// shared connection state through `Open → Closing → Closed`.
#[derive(Debug)]
pub struct CloseHandshake {
    state: StateHandle,
    close_timeout: Duration,
    our_reason: Option<CloseReason>,
    peer_reason: Option<CloseReason>,
}

impl CloseHandshake {
    /// Create a close handshake driving `state`.
    #[must_use]
    pub fn new(state: StateHandle, close_timeout: Duration) -> Self {
        Self {
            state,
            close_timeout,
            our_reason: None,
            peer_reason: None,
        }
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Get our close reason (if we sent one).
    #[must_use]
    pub fn our_reason(&self) -> Option<&CloseReason> {
        self.our_reason.as_ref()
    }

    /// Get peer's close reason (if they sent one).
    #[must_use]
    pub fn peer_reason(&self) -> Option<&CloseReason> {
        self.peer_reason.as_ref()
    }

    /// How long to wait for the peer's close frame after sending ours.
    #[must_use]
    pub const fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    /// Initiate a close handshake.
    ///
    /// Returns the close frame to send, or `None` if the connection is not
    /// open.
    pub fn initiate(&mut self, reason: CloseReason) -> Option<Frame> {
        if !self.state.begin_closing() {
            return None;
        }
        let frame = reason.to_frame();
        self.our_reason = Some(reason);
        Some(frame)
    }

    /// Handle a received close frame.
    ///
    /// - `Open`: moves to `Closing` and returns the echo frame to send. The
    ///   caller completes the handshake with [`complete`](Self::complete)
    ///   once the echo is written.
    /// - `Closing` after our own close frame: the exchange is finished, moves
    ///   to `Closed` and returns `None`.
    /// - Otherwise the frame is a duplicate and is ignored.
    ///
    /// A malformed payload is answered with a protocol-error close code.
    pub fn receive_close(&mut self, frame: &Frame) -> Option<Frame> {
        debug_assert_eq!(frame.opcode, Opcode::Close);

        let (reason, response) = match CloseReason::parse(&frame.payload) {
            // `parse` only accepts sendable codes, so the peer's code is echoed as is.
            Ok(reason) => {
                let response = CloseReason {
                    code: Some(reason.code.unwrap_or(CloseCode::Normal as u16)),
                    text: None,
                };
                (reason, response)
            }
            Err(_) => (
                CloseReason::empty(),
                CloseReason::new(CloseCode::ProtocolError, None),
            ),
        };

        match self.state.get() {
            ConnectionState::Open => {
                self.state.begin_closing();
                self.peer_reason = Some(reason);
                let frame = response.to_frame();
                self.our_reason = Some(response);
                Some(frame)
            }
            ConnectionState::Closing if self.peer_reason.is_none() => {
                self.peer_reason = Some(reason);
                self.state.close();
                None
            }
            _ => None,
        }
    }

    /// Marks the handshake finished after our echo frame was written.
    pub fn complete(&mut self) {
        self.state.close();
    }

    /// Force transition to closed state.
    ///
    /// Used when the connection terminates without a full handshake
    /// (timeout, error, end of stream).
    pub fn force_close(&mut self, reason: CloseReason) {
        self.state.close();
        if self.our_reason.is_none() {
            self.our_reason = Some(reason);
        }
    }
}
