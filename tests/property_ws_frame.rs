//! Property tests for the WebSocket frame codec (RFC 6455).
//!
//! Verifies mask involution, payload length encoding boundaries, incremental
//! decoding over arbitrary read boundaries, and the one-shot decoder's bounds
//! checks.

mod common;

use bytes::{Bytes, BytesMut};
use common::{client_frame, init_test_logging, test_proptest_config};
use proptest::prelude::*;
use textws::codec::{Decoder, Encoder};
use textws::net::websocket::{
    apply_mask, decode_frame, encode_text_frame, Decoded, Frame, FrameCodec, Opcode, WsError,
};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_mask_key() -> impl Strategy<Value = [u8; 4]> {
    any::<[u8; 4]>()
}

fn arb_payload_any() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=4096)
}

fn arb_text_short() -> impl Strategy<Value = String> {
    ".{0,125}"
}

fn arb_text_medium() -> impl Strategy<Value = String> {
    "[a-z0-9 ]{126,1024}"
}

fn arb_text_any() -> impl Strategy<Value = String> {
    prop_oneof![arb_text_short(), arb_text_medium()]
}

fn arb_ignored_opcode() -> impl Strategy<Value = u8> {
    prop_oneof![Just(0x0u8), Just(0x2), 3u8..=7u8, Just(0x9), Just(0xA), 0x0Bu8..=0x0Fu8]
}

/// Parses the header of an unmasked server frame, returning header length and
/// declared payload length.
fn server_header(bytes: &[u8]) -> (usize, usize) {
    match bytes[1] & 0x7F {
        126 => (4, usize::from(u16::from_be_bytes([bytes[2], bytes[3]]))),
        127 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[2..10]);
            (10, u64::from_be_bytes(raw) as usize)
        }
        short => (2, usize::from(short)),
    }
}

// ============================================================================
// Mask Involution: apply_mask(apply_mask(data, key), key) == data
// ============================================================================

proptest! {
    #![proptest_config(test_proptest_config(500))]

    /// XOR masking is self-inverse (involution).
    #[test]
    fn mask_is_involution(data in arb_payload_any(), key in arb_mask_key()) {
        init_test_logging();
        let original = data.clone();
        let mut buf = data;
        apply_mask(&mut buf, key);
        apply_mask(&mut buf, key);
        prop_assert_eq!(buf, original, "double masking must yield original data");
    }

    /// Masking with zero key is identity.
    #[test]
    fn mask_zero_key_is_identity(data in arb_payload_any()) {
        init_test_logging();
        let original = data.clone();
        let mut buf = data;
        apply_mask(&mut buf, [0, 0, 0, 0]);
        prop_assert_eq!(buf, original, "zero mask key should be identity");
    }
}

// ============================================================================
// Outbound Encoding
// ============================================================================

proptest! {
    #![proptest_config(test_proptest_config(300))]

    /// Encoded text frames are final, unmasked and declare their exact length.
    #[test]
    fn encoded_text_frame_layout(text in arb_text_any()) {
        init_test_logging();
        let bytes = encode_text_frame(&text);
        prop_assert_eq!(bytes[0], 0x81);
        prop_assert_eq!(bytes[1] & 0x80, 0, "server frames are never masked");

        let (header, len) = server_header(&bytes);
        let expected_header = if text.len() <= 125 { 2 } else { 4 };
        prop_assert_eq!(header, expected_header);
        prop_assert_eq!(len, text.len());
        prop_assert_eq!(&bytes[header..], text.as_bytes());
    }

    /// The codec encoder and the standalone encoder agree on text frames.
    #[test]
    fn codec_encoder_matches_encode_text_frame(text in arb_text_any()) {
        init_test_logging();
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Frame::text(Bytes::from(text.clone())), &mut buf).unwrap();
        prop_assert_eq!(buf.freeze(), encode_text_frame(&text));
    }
}

#[test]
fn payload_length_boundaries() {
    init_test_logging();
    for (len, header) in [(0, 2), (1, 2), (125, 2), (126, 4), (65_535, 4), (65_536, 10)] {
        let text = "a".repeat(len);
        let bytes = encode_text_frame(&text);
        assert_eq!(server_header(&bytes), (header, len), "payload of {len} bytes");
        assert_eq!(bytes.len(), header + len);
    }
}

#[test]
fn client_frames_decode_at_length_boundaries() {
    init_test_logging();
    let key = [0x5A, 0x01, 0xC3, 0x7E];
    for len in [0usize, 1, 125, 126, 65_535, 65_536] {
        let text: String = (0..len).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let frame = client_frame(0x1, text.as_bytes(), key);

        let Decoded::Frame(decoded) = decode_frame(&frame).unwrap() else {
            panic!("payload of {len} bytes not decoded as text");
        };
        assert_eq!(decoded.payload_len, len);
        assert_eq!(decoded.mask_key, key);
        assert_eq!(decoded.text, text, "payload of {len} bytes");

        let mut codec = FrameCodec::new();
        let mut whole = BytesMut::from(&frame[..]);
        let out = codec.decode(&mut whole).unwrap().expect("complete frame");
        assert_eq!(out.payload.len(), len);
        assert_eq!(out.payload.as_ref(), text.as_bytes());
        assert!(whole.is_empty());

        // Feed the header byte by byte, then the payload in uneven chunks.
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let header_len = frame.len() - len;
        let pieces = frame[..header_len]
            .chunks(1)
            .chain(frame[header_len..].chunks(4093));
        let mut decoded = None;
        for piece in pieces {
            buf.extend_from_slice(piece);
            if let Some(out) = codec.decode(&mut buf).unwrap() {
                assert!(decoded.is_none(), "one frame expected");
                decoded = Some(out.payload);
            }
        }
        assert_eq!(decoded.as_deref(), Some(text.as_bytes()), "split payload of {len} bytes");
        assert!(codec.is_idle());
    }
}

// ============================================================================
// Inbound Decoding
// ============================================================================

proptest! {
    #![proptest_config(test_proptest_config(300))]

    /// A masked client text frame decodes back to its text.
    #[test]
    fn decode_frame_recovers_text(text in arb_text_any(), key in arb_mask_key()) {
        init_test_logging();
        let frame = client_frame(0x1, text.as_bytes(), key);
        let decoded = decode_frame(&frame).unwrap();
        let Decoded::Frame(decoded) = decoded else {
            panic!("expected a text frame, got {decoded:?}");
        };
        prop_assert_eq!(decoded.opcode, Opcode::Text);
        prop_assert_eq!(decoded.payload_len, text.len());
        prop_assert_eq!(decoded.mask_key, key);
        prop_assert_eq!(decoded.text, text);
    }

    /// Every strict prefix of a text frame is reported as truncated.
    #[test]
    fn decode_frame_rejects_prefixes(text in arb_text_short(), key in arb_mask_key(), cut in any::<prop::sample::Index>()) {
        init_test_logging();
        let frame = client_frame(0x1, text.as_bytes(), key);
        let len = cut.index(frame.len());
        let result = decode_frame(&frame[..len]);
        prop_assert!(
            matches!(result, Err(WsError::TruncatedFrame { .. })),
            "prefix of {} of {} bytes should be truncated, got {:?}", len, frame.len(), result
        );
    }

    /// Opcodes other than text and close are ignored without inspecting the rest.
    #[test]
    fn decode_frame_ignores_other_opcodes(opcode in arb_ignored_opcode(), tail in prop::collection::vec(any::<u8>(), 0..16)) {
        init_test_logging();
        let mut chunk = vec![0x80 | opcode];
        chunk.extend(tail);
        let result = decode_frame(&chunk).unwrap();
        prop_assert_eq!(result, Decoded::Ignored(Opcode::from_u8(opcode)));
    }

    /// Unmasked client frames are rejected by both decoders.
    #[test]
    fn unmasked_frames_are_rejected(text in arb_text_any()) {
        init_test_logging();
        let unmasked = encode_text_frame(&text);
        prop_assert!(matches!(decode_frame(&unmasked), Err(WsError::ProtocolViolation(_))));

        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&unmasked[..]);
        prop_assert!(matches!(codec.decode(&mut buf), Err(WsError::ProtocolViolation(_))));
    }

    /// The incremental codec yields the same frames whatever the read boundaries.
    #[test]
    fn codec_is_independent_of_read_boundaries(
        texts in prop::collection::vec(arb_text_short(), 1..8),
        chunk_size in 1usize..64,
        key in arb_mask_key(),
    ) {
        init_test_logging();
        let wire: Vec<u8> = texts
            .iter()
            .flat_map(|text| client_frame(0x1, text.as_bytes(), key))
            .collect();

        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for chunk in wire.chunks(chunk_size) {
            buf.extend_from_slice(chunk);
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                prop_assert!(frame.fin);
                prop_assert_eq!(frame.opcode, Opcode::Text);
                decoded.push(String::from_utf8(frame.payload.to_vec()).unwrap());
            }
        }

        prop_assert!(codec.is_idle());
        prop_assert!(buf.is_empty());
        prop_assert_eq!(decoded, texts);
    }
}
