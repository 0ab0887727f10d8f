//! WebSocket frame codec according to RFC 6455.
//!
//! Server-side only: inbound frames must be masked by the client, outbound
//! frames are never masked.
//!
//! # Frame Format (RFC 6455 Section 5.2)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! :                     Payload Data continued ...                :
//! + - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - +
//! |                     Payload Data (continued)                  |
//! +---------------------------------------------------------------+
//! ```
//!
//! Two decoding entry points exist. [`decode_frame`] treats one chunk as one
//! complete frame and rejects anything shorter than the header declares.
//! [`FrameCodec`] is incremental: it buffers partial input across reads and
//! yields frames as soon as they are complete.

use crate::codec::{Decoder, Encoder};
use bytes::{BufMut, Bytes, BytesMut};
use std::io;

use super::close::CloseCode;

/// FIN flag in the first header byte.
pub const FIN_BIT: u8 = 0x80;
/// RSV1..RSV3 flags in the first header byte.
pub const RSV_BITS: u8 = 0x70;
/// Opcode field in the first header byte.
pub const OPCODE_MASK: u8 = 0x0F;
/// MASK flag in the second header byte.
pub const MASK_BIT: u8 = 0x80;
/// 7-bit payload length field in the second header byte.
pub const PAYLOAD_LEN_MASK: u8 = 0x7F;
/// Largest payload length encodable directly in the 7-bit field.
pub const MAX_SHORT_PAYLOAD: usize = 125;
/// 7-bit marker announcing a 16-bit extended length.
pub const EXTENDED_LEN_16: u8 = 126;
/// 7-bit marker announcing a 64-bit extended length.
pub const EXTENDED_LEN_64: u8 = 127;
/// Control frame payloads are capped at this many bytes.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// WebSocket frame opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continuation frame (fragmented message).
    Continuation,
    /// Text data frame.
    Text,
    /// Binary data frame.
    Binary,
    /// Connection close control frame.
    Close,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
    /// Reserved opcode (0x3-0x7 non-control, 0xB-0xF control).
    Reserved(u8),
}

impl Opcode {
    /// Maps the low four bits of `value` to an opcode.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value & OPCODE_MASK {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            other => Self::Reserved(other),
        }
    }

    /// Returns the 4-bit wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
            Self::Reserved(value) => value & OPCODE_MASK,
        }
    }

    /// Returns true for control opcodes (high bit of the opcode set).
    #[must_use]
    pub const fn is_control(self) -> bool {
        self.as_u8() & 0x8 != 0
    }
}

/// WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag (FIN bit).
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Masking key, present on every frame a client sends.
    pub mask_key: Option<[u8; 4]>,
    /// Payload data, already unmasked.
    pub payload: Bytes,
}

impl Frame {
    /// Create a final, unmasked text frame.
    #[must_use]
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Text,
            mask_key: None,
            payload: payload.into(),
        }
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: Option<&str>) -> Self {
        let payload = match (code, reason) {
            (Some(c), Some(r)) => {
                let mut buf = BytesMut::with_capacity(2 + r.len());
                buf.put_u16(c);
                buf.put_slice(r.as_bytes());
                buf.freeze()
            }
            (Some(c), None) => Bytes::copy_from_slice(&c.to_be_bytes()),
            _ => Bytes::new(),
        };

        Self {
            fin: true,
            opcode: Opcode::Close,
            mask_key: None,
            payload,
        }
    }
}

/// WebSocket codec errors.
#[derive(Debug)]
pub enum WsError {
    /// I/O error.
    Io(io::Error),
    /// Protocol violation (e.g. unmasked client frame).
    ProtocolViolation(&'static str),
    /// The input ended before the frame it declares was complete.
    TruncatedFrame {
        /// Bytes the frame still requires.
        needed: usize,
        /// Bytes that were actually available.
        available: usize,
    },
    /// Reserved bits set without extension support.
    ReservedBitsSet,
    /// Payload exceeds maximum allowed size.
    PayloadTooLarge {
        /// Declared payload size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        max: usize,
    },
    /// Control frame payload exceeds 125 bytes.
    ControlFrameTooLarge(usize),
    /// Control frame is fragmented (FIN not set).
    FragmentedControlFrame,
    /// Invalid UTF-8 in text frame.
    InvalidUtf8,
    /// Invalid close frame payload.
    InvalidClosePayload,
    /// The connection is no longer open.
    ConnectionClosed,
    /// No data arrived within the idle timeout.
    Timeout,
}

impl WsError {
    /// Close code to report to the peer before dropping the connection, if
    /// the error warrants one.
    #[must_use]
    pub const fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::ProtocolViolation(_)
            | Self::TruncatedFrame { .. }
            | Self::ReservedBitsSet
            | Self::ControlFrameTooLarge(_)
            | Self::FragmentedControlFrame
            | Self::InvalidClosePayload => Some(CloseCode::ProtocolError),
            Self::PayloadTooLarge { .. } => Some(CloseCode::MessageTooBig),
            Self::InvalidUtf8 => Some(CloseCode::InvalidPayload),
            Self::Timeout => Some(CloseCode::GoingAway),
            Self::Io(_) | Self::ConnectionClosed => None,
        }
    }
}

impl std::fmt::Display for WsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            Self::TruncatedFrame { needed, available } => {
                write!(
                    f,
                    "truncated frame: needed {needed} bytes, {available} available"
                )
            }
            Self::ReservedBitsSet => write!(f, "reserved bits set without extension"),
            Self::PayloadTooLarge { size, max } => {
                write!(f, "payload too large: {size} bytes (max: {max})")
            }
            Self::ControlFrameTooLarge(size) => {
                write!(
                    f,
                    "control frame payload too large: {size} bytes (max: 125)"
                )
            }
            Self::FragmentedControlFrame => write!(f, "control frame cannot be fragmented"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 in text frame"),
            Self::InvalidClosePayload => write!(f, "invalid close frame payload"),
            Self::ConnectionClosed => write!(f, "connection is closed"),
            Self::Timeout => write!(f, "connection idle timeout elapsed"),
        }
    }
}

impl std::error::Error for WsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WsError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Apply XOR masking to payload data.
///
/// Byte `i` is XORed with `mask_key[i % 4]`. The transform is its own
/// inverse, so the same call masks and unmasks.
pub fn apply_mask(payload: &mut [u8], mask_key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }
}

/// Serializes `text` as a single final, unmasked text frame.
#[must_use]
pub fn encode_text_frame(text: &str) -> Bytes {
    let mut dst = BytesMut::with_capacity(header_len(text.len()) + text.len());
    put_frame(&mut dst, FIN_BIT | Opcode::Text.as_u8(), text.as_bytes());
    dst.freeze()
}

/// Size of an unmasked frame header for a payload of `payload_len` bytes.
const fn header_len(payload_len: usize) -> usize {
    if payload_len <= MAX_SHORT_PAYLOAD {
        2
    } else if payload_len <= u16::MAX as usize {
        4
    } else {
        10
    }
}

fn put_frame(dst: &mut BytesMut, first_byte: u8, payload: &[u8]) {
    let payload_len = payload.len();
    dst.reserve(header_len(payload_len) + payload_len);
    dst.put_u8(first_byte);

    if payload_len <= MAX_SHORT_PAYLOAD {
        dst.put_u8(payload_len as u8);
    } else if payload_len <= u16::MAX as usize {
        dst.put_u8(EXTENDED_LEN_16);
        dst.put_u16(payload_len as u16);
    } else {
        dst.put_u8(EXTENDED_LEN_64);
        dst.put_u64(payload_len as u64);
    }

    dst.put_slice(payload);
}

/// Result of decoding one complete chunk with [`decode_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A text frame with its unmasked payload.
    Frame(DecodedFrame),
    /// The peer asked to close the connection.
    Close,
    /// A frame this server does not handle (anything but text and close).
    Ignored(Opcode),
}

/// Decoded view of one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Frame opcode.
    pub opcode: Opcode,
    /// Declared payload length.
    pub payload_len: usize,
    /// Masking key as sent on the wire.
    pub mask_key: [u8; 4],
    /// Unmasked payload.
    pub text: String,
}

/// Decodes a chunk holding exactly one client frame.
///
/// Close frames are reported as soon as the opcode is read, whatever follows
/// it. Opcodes other than text and close are reported as ignored without
/// looking at the payload.
///
/// # Errors
///
/// - [`WsError::TruncatedFrame`] if the chunk is shorter than the header,
///   extended length, mask or payload it declares.
/// - [`WsError::ProtocolViolation`] if the mask bit is not set.
/// - [`WsError::InvalidUtf8`] if the unmasked payload is not UTF-8.
pub fn decode_frame(chunk: &[u8]) -> Result<Decoded, WsError> {
    let mut offset = 0;

    let first_byte = take(chunk, &mut offset, 1)?[0];
    let opcode = Opcode::from_u8(first_byte);
    match opcode {
        Opcode::Close => return Ok(Decoded::Close),
        Opcode::Text => {}
        other => return Ok(Decoded::Ignored(other)),
    }

    let second_byte = take(chunk, &mut offset, 1)?[0];
    if second_byte & MASK_BIT == 0 {
        return Err(WsError::ProtocolViolation("client frame is not masked"));
    }

    let payload_len = match second_byte & PAYLOAD_LEN_MASK {
        EXTENDED_LEN_16 => {
            let bytes = take(chunk, &mut offset, 2)?;
            u64::from(u16::from_be_bytes([bytes[0], bytes[1]]))
        }
        EXTENDED_LEN_64 => {
            let bytes = take(chunk, &mut offset, 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            u64::from_be_bytes(raw)
        }
        short => u64::from(short),
    };

    let mut mask_key = [0u8; 4];
    mask_key.copy_from_slice(take(chunk, &mut offset, 4)?);

    let available = chunk.len() - offset;
    let payload_len = usize::try_from(payload_len)
        .ok()
        .filter(|len| *len <= available)
        .ok_or(WsError::TruncatedFrame {
            needed: usize::try_from(payload_len).unwrap_or(usize::MAX),
            available,
        })?;

    let mut payload = take(chunk, &mut offset, payload_len)?.to_vec();
    apply_mask(&mut payload, mask_key);
    let text = String::from_utf8(payload).map_err(|_| WsError::InvalidUtf8)?;

    Ok(Decoded::Frame(DecodedFrame {
        opcode,
        payload_len,
        mask_key,
        text,
    }))
}

/// Returns the next `n` bytes of `chunk` and advances `offset`, or reports
/// how many bytes were missing.
fn take<'a>(chunk: &'a [u8], offset: &mut usize, n: usize) -> Result<&'a [u8], WsError> {
    let available = chunk.len().saturating_sub(*offset);
    if available < n {
        return Err(WsError::TruncatedFrame {
            needed: n,
            available,
        });
    }
    let bytes = &chunk[*offset..*offset + n];
    *offset += n;
    Ok(bytes)
}

/// Decode state machine for the frame codec.
#[derive(Debug, Clone, Copy)]
enum DecodeState {
    /// Waiting for the first 2 header bytes.
    Header,
    /// Reading extended payload length.
    ExtendedLength {
        fin: bool,
        opcode: Opcode,
        bytes_needed: usize,
    },
    /// Reading mask key (4 bytes).
    MaskKey {
        fin: bool,
        opcode: Opcode,
        payload_len: usize,
    },
    /// Reading payload data.
    Payload {
        fin: bool,
        opcode: Opcode,
        mask_key: [u8; 4],
        payload_len: usize,
    },
}

impl DecodeState {
    /// Bytes the current state waits for before it can advance.
    const fn bytes_needed(self) -> usize {
        match self {
            Self::Header => 2,
            Self::ExtendedLength { bytes_needed, .. } => bytes_needed,
            Self::MaskKey { .. } => 4,
            Self::Payload { payload_len, .. } => payload_len,
        }
    }
}

/// Incremental server-side WebSocket frame codec.
///
/// Decoding consumes input as each part of the frame (header, extended
/// length, mask, payload) becomes available, so a frame may arrive split over
/// any number of reads, and one read may carry several frames.
#[derive(Debug)]
pub struct FrameCodec {
    /// Maximum frame payload size (default: 16MB).
    max_payload_size: usize,
    /// Current decode state.
    state: DecodeState,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Default maximum payload size (16 MB).
    pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

    /// Creates a codec with the default payload limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_payload_size: Self::DEFAULT_MAX_PAYLOAD_SIZE,
            state: DecodeState::Header,
        }
    }

    /// Sets the maximum payload size.
    #[must_use]
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Returns true when no partially decoded frame is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::Header)
    }

    fn check_payload_len(&self, payload_len: u64) -> Result<usize, WsError> {
        usize::try_from(payload_len)
            .ok()
            .filter(|len| *len <= self.max_payload_size)
            .ok_or(WsError::PayloadTooLarge {
                size: payload_len,
                max: self.max_payload_size,
            })
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = WsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if src.len() < 2 {
                        return Ok(None);
                    }

                    let first_byte = src[0];
                    let second_byte = src[1];

                    let fin = first_byte & FIN_BIT != 0;
                    let opcode = Opcode::from_u8(first_byte);
                    let masked = second_byte & MASK_BIT != 0;
                    let payload_len_7 = second_byte & PAYLOAD_LEN_MASK;

                    if first_byte & RSV_BITS != 0 {
                        return Err(WsError::ReservedBitsSet);
                    }
                    if !masked {
                        return Err(WsError::ProtocolViolation("client frame is not masked"));
                    }
                    if opcode.is_control() {
                        if !fin {
                            return Err(WsError::FragmentedControlFrame);
                        }
                        if usize::from(payload_len_7) > MAX_CONTROL_PAYLOAD {
                            return Err(WsError::ControlFrameTooLarge(usize::from(
                                payload_len_7,
                            )));
                        }
                    }

                    let _ = src.split_to(2);

                    self.state = match payload_len_7 {
                        EXTENDED_LEN_16 => DecodeState::ExtendedLength {
                            fin,
                            opcode,
                            bytes_needed: 2,
                        },
                        EXTENDED_LEN_64 => DecodeState::ExtendedLength {
                            fin,
                            opcode,
                            bytes_needed: 8,
                        },
                        short => DecodeState::MaskKey {
                            fin,
                            opcode,
                            payload_len: self.check_payload_len(u64::from(short))?,
                        },
                    };
                }

                DecodeState::ExtendedLength {
                    fin,
                    opcode,
                    bytes_needed,
                } => {
                    if src.len() < bytes_needed {
                        return Ok(None);
                    }

                    let bytes = src.split_to(bytes_needed);
                    let payload_len = if bytes_needed == 2 {
                        u64::from(u16::from_be_bytes([bytes[0], bytes[1]]))
                    } else {
                        let mut raw = [0u8; 8];
                        raw.copy_from_slice(&bytes);
                        u64::from_be_bytes(raw)
                    };

                    if payload_len >> 63 != 0 {
                        self.state = DecodeState::Header;
                        return Err(WsError::ProtocolViolation(
                            "64-bit payload length has its most significant bit set",
                        ));
                    }

                    // Length bytes are already consumed; start over on the next call.
                    let payload_len = match self.check_payload_len(payload_len) {
                        Ok(len) => len,
                        Err(err) => {
                            self.state = DecodeState::Header;
                            return Err(err);
                        }
                    };

                    self.state = DecodeState::MaskKey {
                        fin,
                        opcode,
                        payload_len,
                    };
                }

                DecodeState::MaskKey {
                    fin,
                    opcode,
                    payload_len,
                } => {
                    if src.len() < 4 {
                        return Ok(None);
                    }

                    let mut mask_key = [0u8; 4];
                    mask_key.copy_from_slice(&src.split_to(4));

                    self.state = DecodeState::Payload {
                        fin,
                        opcode,
                        mask_key,
                        payload_len,
                    };
                }

                DecodeState::Payload {
                    fin,
                    opcode,
                    mask_key,
                    payload_len,
                } => {
                    if src.len() < payload_len {
                        src.reserve(payload_len - src.len());
                        return Ok(None);
                    }

                    let mut payload = src.split_to(payload_len);
                    apply_mask(&mut payload, mask_key);

                    self.state = DecodeState::Header;

                    return Ok(Some(Frame {
                        fin,
                        opcode,
                        mask_key: Some(mask_key),
                        payload: payload.freeze(),
                    }));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() && self.is_idle() {
            return Ok(None);
        }
        let needed = self.state.bytes_needed();
        self.state = DecodeState::Header;
        Err(WsError::TruncatedFrame {
            needed,
            available: src.len(),
        })
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = WsError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if frame.opcode.is_control() {
            if !frame.fin {
                return Err(WsError::FragmentedControlFrame);
            }
            if frame.payload.len() > MAX_CONTROL_PAYLOAD {
                return Err(WsError::ControlFrameTooLarge(frame.payload.len()));
            }
        }

        let mut first_byte = frame.opcode.as_u8();
        if frame.fin {
            first_byte |= FIN_BIT;
        }

        put_frame(dst, first_byte, &frame.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::client_frame;

    const HELLO_FRAME: [u8; 11] = [
        0x81, 0x85, 0x37, 0xFA, 0x21, 0x3D, 0x7F, 0x9F, 0x4D, 0x51, 0x58,
    ];

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(Opcode::from_u8(0x0), Opcode::Continuation);
        assert_eq!(Opcode::from_u8(0x1), Opcode::Text);
        assert_eq!(Opcode::from_u8(0x2), Opcode::Binary);
        assert_eq!(Opcode::from_u8(0x8), Opcode::Close);
        assert_eq!(Opcode::from_u8(0x9), Opcode::Ping);
        assert_eq!(Opcode::from_u8(0xA), Opcode::Pong);
        assert_eq!(Opcode::from_u8(0x3), Opcode::Reserved(0x3));
        // FIN and reserved bits are stripped.
        assert_eq!(Opcode::from_u8(0x81), Opcode::Text);
        assert_eq!(Opcode::from_u8(0x88), Opcode::Close);
    }

    #[test]
    fn test_opcode_is_control() {
        assert!(!Opcode::Continuation.is_control());
        assert!(!Opcode::Text.is_control());
        assert!(!Opcode::Binary.is_control());
        assert!(!Opcode::Reserved(0x7).is_control());
        assert!(Opcode::Close.is_control());
        assert!(Opcode::Ping.is_control());
        assert!(Opcode::Pong.is_control());
        assert!(Opcode::Reserved(0xB).is_control());
    }

    #[test]
    fn test_apply_mask() {
        let mask_key = [0x37, 0xfa, 0x21, 0x3d];
        let mut payload = b"Hello".to_vec();
        let original = payload.clone();

        apply_mask(&mut payload, mask_key);
        assert_eq!(payload, [0x7F, 0x9F, 0x4D, 0x51, 0x58]);

        apply_mask(&mut payload, mask_key);
        assert_eq!(payload, original);
    }

    #[test]
    fn decode_frame_hello() {
        let decoded = decode_frame(&HELLO_FRAME).unwrap();
        let Decoded::Frame(frame) = decoded else {
            panic!("expected text frame, got {decoded:?}");
        };
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload_len, 5);
        assert_eq!(frame.mask_key, [0x37, 0xFA, 0x21, 0x3D]);
        assert_eq!(frame.text, "Hello");
    }

    #[test]
    fn decode_frame_close_ignores_trailing_bytes() {
        assert_eq!(decode_frame(&[0x88]).unwrap(), Decoded::Close);
        assert_eq!(
            decode_frame(&[0x88, 0x82, 0xFF, 0xFF]).unwrap(),
            Decoded::Close
        );
    }

    #[test]
    fn decode_frame_ignores_binary() {
        let chunk = client_frame(0x2, &[1, 2, 3], [1, 2, 3, 4]);
        assert_eq!(
            decode_frame(&chunk).unwrap(),
            Decoded::Ignored(Opcode::Binary)
        );
    }

    #[test]
    fn decode_frame_rejects_unmasked() {
        let chunk = [0x81, 0x02, b'h', b'i'];
        assert!(matches!(
            decode_frame(&chunk),
            Err(WsError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn unmasked_frame_without_extended_length_is_a_violation_for_both_decoders() {
        for chunk in [&[0x81u8, 0x7E][..], &[0x81, 0x7F, 0x00][..]] {
            assert!(
                matches!(decode_frame(chunk), Err(WsError::ProtocolViolation(_))),
                "decode_frame {chunk:02X?}"
            );
            let mut buf = BytesMut::from(chunk);
            assert!(
                matches!(
                    FrameCodec::new().decode(&mut buf),
                    Err(WsError::ProtocolViolation(_))
                ),
                "codec {chunk:02X?}"
            );
        }
    }

    #[test]
    fn decode_frame_rejects_truncated_payload() {
        // Declares 5 bytes of payload, carries 3.
        let chunk = &HELLO_FRAME[..9];
        let err = decode_frame(chunk).unwrap_err();
        assert!(matches!(
            err,
            WsError::TruncatedFrame {
                needed: 5,
                available: 3
            }
        ));
    }

    #[test]
    fn decode_frame_rejects_truncated_header() {
        assert!(matches!(
            decode_frame(&[]),
            Err(WsError::TruncatedFrame {
                needed: 1,
                available: 0
            })
        ));
        assert!(matches!(
            decode_frame(&[0x81]),
            Err(WsError::TruncatedFrame { .. })
        ));
        // Extended 16-bit length missing its second byte.
        assert!(matches!(
            decode_frame(&[0x81, 0xFE, 0x01]),
            Err(WsError::TruncatedFrame {
                needed: 2,
                available: 1
            })
        ));
        // Mask key cut short.
        assert!(matches!(
            decode_frame(&[0x81, 0x85, 0x37, 0xFA]),
            Err(WsError::TruncatedFrame {
                needed: 4,
                available: 2
            })
        ));
    }

    #[test]
    fn decode_frame_rejects_huge_declared_length() {
        let mut chunk = vec![0x81, 0xFF];
        chunk.extend_from_slice(&u64::MAX.to_be_bytes());
        chunk.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            decode_frame(&chunk),
            Err(WsError::TruncatedFrame { available: 0, .. })
        ));
    }

    #[test]
    fn decode_frame_rejects_invalid_utf8() {
        let chunk = client_frame(0x1, &[0xFF, 0xFE], [9, 8, 7, 6]);
        assert!(matches!(decode_frame(&chunk), Err(WsError::InvalidUtf8)));
    }

    #[test]
    fn encode_text_frame_short() {
        let frame = encode_text_frame("Hey");
        assert_eq!(frame.as_ref(), &[0x81, 0x03, b'H', b'e', b'y']);
    }

    #[test]
    fn encode_text_frame_extended_lengths() {
        let text = "a".repeat(126);
        let frame = encode_text_frame(&text);
        assert_eq!(&frame[..4], &[0x81, 126, 0x00, 126]);
        assert_eq!(frame.len(), 4 + 126);

        let text = "a".repeat(65_536);
        let frame = encode_text_frame(&text);
        assert_eq!(frame[1], 127);
        assert_eq!(&frame[2..10], &65_536u64.to_be_bytes());
        assert_eq!(frame.len(), 10 + 65_536);
    }

    #[test]
    fn codec_decodes_hello() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&HELLO_FRAME[..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload.as_ref(), b"Hello");
        assert!(buf.is_empty());
        assert!(codec.is_idle());
    }

    #[test]
    fn codec_reassembles_split_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        for (i, byte) in HELLO_FRAME.iter().enumerate() {
            buf.put_u8(*byte);
            let result = codec.decode(&mut buf).unwrap();
            if i + 1 < HELLO_FRAME.len() {
                assert!(result.is_none(), "frame completed early at byte {i}");
            } else {
                assert_eq!(result.unwrap().payload.as_ref(), b"Hello");
            }
        }
    }

    #[test]
    fn codec_yields_packed_frames_in_order() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&client_frame(0x1, b"first", [1, 2, 3, 4]));
        buf.extend_from_slice(&client_frame(0x1, b"second", [5, 6, 7, 8]));

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"first");
        assert_eq!(second.payload.as_ref(), b"second");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn codec_rejects_unmasked_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x81u8, 0x02, b'h', b'i'][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(WsError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn codec_rejects_reserved_bits() {
        let mut codec = FrameCodec::new();
        let mut chunk = client_frame(0x1, b"x", [0, 0, 0, 0]);
        chunk[0] |= 0x40;
        let mut buf = BytesMut::from(&chunk[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(WsError::ReservedBitsSet)
        ));
    }

    #[test]
    fn codec_rejects_oversized_payload() {
        let mut codec = FrameCodec::new().max_payload_size(16);
        let chunk = client_frame(0x1, &[b'a'; 200], [1, 1, 1, 1]);
        let mut buf = BytesMut::from(&chunk[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(WsError::PayloadTooLarge { size: 200, max: 16 })
        ));
        assert!(codec.is_idle());
    }

    #[test]
    fn codec_rejects_fragmented_control_frame() {
        let mut codec = FrameCodec::new();
        let mut chunk = client_frame(0x8, &[], [1, 2, 3, 4]);
        chunk[0] &= !FIN_BIT;
        let mut buf = BytesMut::from(&chunk[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(WsError::FragmentedControlFrame)
        ));
    }

    #[test]
    fn codec_decode_eof_reports_truncation() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&HELLO_FRAME[..8]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            WsError::TruncatedFrame {
                needed: 5,
                available: 2
            }
        ));
    }

    #[test]
    fn codec_decode_eof_clean() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn codec_skips_payload_of_ignored_opcodes() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&client_frame(0x2, &[0xAB; 300], [1, 2, 3, 4]));
        buf.extend_from_slice(&client_frame(0x1, b"after", [4, 3, 2, 1]));

        let binary = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(binary.opcode, Opcode::Binary);
        assert_eq!(binary.payload.len(), 300);

        let text = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(text.payload.as_ref(), b"after");
    }

    #[test]
    fn encoder_writes_close_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::close(Some(1000), Some("bye")), &mut buf)
            .unwrap();
        assert_eq!(&buf[..4], &[0x88, 0x05, 0x03, 0xE8]);
        assert_eq!(&buf[4..], b"bye");
    }

    #[test]
    fn encoder_rejects_large_control_frame() {
        let mut codec = FrameCodec::new();
        let mut frame = Frame::close(None, None);
        frame.payload = Bytes::from(vec![0u8; 130]);

        let mut buf = BytesMut::new();
        assert!(matches!(
            codec.encode(frame, &mut buf),
            Err(WsError::ControlFrameTooLarge(130))
        ));
    }

    #[test]
    fn test_ws_error_display_variants() {
        let err = WsError::TruncatedFrame {
            needed: 10,
            available: 4,
        };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains('4'));

        let err = WsError::PayloadTooLarge {
            size: 10_000,
            max: 1024,
        };
        assert!(err.to_string().contains("10000"));
        assert!(err.to_string().contains("1024"));

        let err = WsError::ProtocolViolation("client frame is not masked");
        assert!(err.to_string().contains("masked"));

        let err = WsError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn close_codes_for_errors() {
        assert_eq!(
            WsError::ProtocolViolation("x").close_code(),
            Some(CloseCode::ProtocolError)
        );
        assert_eq!(
            WsError::InvalidUtf8.close_code(),
            Some(CloseCode::InvalidPayload)
        );
        assert_eq!(
            WsError::PayloadTooLarge { size: 1, max: 0 }.close_code(),
            Some(CloseCode::MessageTooBig)
        );
        assert_eq!(WsError::ConnectionClosed.close_code(), None);
    }
}
