//! Codec traits bridging byte buffers and typed frames.
//!
//! A [`Decoder`] pulls complete items out of a growable read buffer and leaves
//! partial input in place until more bytes arrive. An [`Encoder`] appends the
//! wire form of an item to an output buffer. Both are synchronous; the
//! connection layer owns the async reads and writes around them.

use bytes::BytesMut;
use std::io;

/// Decodes items from a buffer of received bytes.
pub trait Decoder {
    /// The decoded item type.
    type Item;
    /// Error produced on malformed input.
    type Error: From<io::Error>;

    /// Attempts to decode one item from `src`.
    ///
    /// Returns `Ok(None)` when `src` does not yet hold a complete item. Bytes
    /// belonging to the incomplete item may be consumed and tracked internally.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error>;

    /// Called once the underlying stream has ended.
    ///
    /// The default implementation decodes what it can and reports leftover
    /// bytes as an unexpected end of stream.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None if src.is_empty() => Ok(None),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "bytes remaining in buffer at end of stream",
            )
            .into()),
        }
    }
}

/// Encodes items into a byte buffer for transmission.
pub trait Encoder<Item> {
    /// Error produced when an item cannot be encoded.
    type Error: From<io::Error>;

    /// Appends the encoded form of `item` to `dst`.
    fn encode(&mut self, item: Item, dst: &mut BytesMut) -> Result<(), Self::Error>;
}
