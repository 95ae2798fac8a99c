//! The [`NetSerialize`] trait and its primitive implementations.

use crate::error::StreamResult;
use crate::stream::BinaryStream;

/// A type whose replicated fields are described once for both directions.
///
/// Implementations call the stream's `serialize_*` methods in a fixed order.
/// A writer stream encodes the fields; a reader stream overwrites them.
///
/// ```
/// use bitstream::{BinaryStream, NetSerialize, StreamResult};
///
/// #[derive(Default)]
/// struct Pos {
///     x: f32,
///     y: f32,
/// }
///
/// impl NetSerialize for Pos {
///     fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
///         stream.serialize_f32(&mut self.x)?;
///         stream.serialize_f32(&mut self.y)
///     }
/// }
///
/// let mut pos = Pos { x: 1.0, y: -2.0 };
/// let bytes = bitstream::encode_to_vec(&mut pos).unwrap();
///
/// let mut decoded = Pos::default();
/// bitstream::decode_from_slice(&bytes, &mut decoded).unwrap();
/// assert_eq!(decoded.y, -2.0);
/// ```
pub trait NetSerialize {
    /// Serializes or deserializes `self`, depending on the stream mode.
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()>;
}

impl NetSerialize for u8 {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        stream.serialize_u8(self)
    }
}

impl NetSerialize for u16 {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        stream.serialize_u16(self)
    }
}

impl NetSerialize for u32 {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        stream.serialize_u32(self)
    }
}

impl NetSerialize for u64 {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        stream.serialize_u64(self)
    }
}

impl NetSerialize for i8 {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        stream.serialize_i8(self)
    }
}

impl NetSerialize for i16 {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        stream.serialize_i16(self)
    }
}

impl NetSerialize for i32 {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        stream.serialize_i32(self)
    }
}

impl NetSerialize for i64 {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        stream.serialize_i64(self)
    }
}

impl NetSerialize for f32 {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        stream.serialize_f32(self)
    }
}

impl NetSerialize for f64 {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        stream.serialize_f64(self)
    }
}

impl NetSerialize for bool {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        stream.serialize_bool(self)
    }
}

impl<T: NetSerialize, const N: usize> NetSerialize for [T; N] {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        for item in self.iter_mut() {
            item.serialize(stream)?;
        }
        Ok(())
    }
}

/// Encodes `value` into a fresh buffer.
///
/// Takes `&mut` because [`NetSerialize`] is one routine for both directions;
/// a writer stream never modifies the value.
pub fn encode_to_vec<T: NetSerialize + ?Sized>(value: &mut T) -> StreamResult<Vec<u8>> {
    let mut stream = BinaryStream::writer();
    value.serialize(&mut stream)?;
    stream.into_bytes()
}

/// Decodes `bytes` into `value`, requiring the whole buffer to be consumed.
///
/// On error `value` may hold a mix of old and decoded fields; callers that
/// need all-or-nothing semantics decode into a scratch copy.
pub fn decode_from_slice<T: NetSerialize + ?Sized>(
    bytes: &[u8],
    value: &mut T,
) -> StreamResult<()> {
    let mut stream = BinaryStream::reader(bytes);
    value.serialize(&mut stream)?;
    stream.expect_exhausted()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        id: u32,
        pos: [f32; 3],
        active: bool,
    }

    impl NetSerialize for Sample {
        fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
            self.id.serialize(stream)?;
            self.pos.serialize(stream)?;
            self.active.serialize(stream)
        }
    }

    #[test]
    fn struct_roundtrip() {
        let mut sample = Sample {
            id: 7,
            pos: [1.0, -0.0, f32::MAX],
            active: true,
        };
        let bytes = encode_to_vec(&mut sample).unwrap();
        assert_eq!(bytes.len(), 4 + 12 + 1);

        let mut decoded = Sample::default();
        decode_from_slice(&bytes, &mut decoded).unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.pos[1].to_bits(), (-0.0f32).to_bits());
        assert_eq!(decoded, sample);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let mut sample = Sample {
            id: 1,
            pos: [0.5; 3],
            active: false,
        };
        let bytes = encode_to_vec(&mut sample).unwrap();
        let mut decoded = Sample::default();
        let err = decode_from_slice(&bytes[..bytes.len() - 1], &mut decoded).unwrap_err();
        assert!(matches!(err, StreamError::UnexpectedEof { .. }));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut value = 5u16;
        let mut bytes = encode_to_vec(&mut value).unwrap();
        bytes.push(0);
        let mut decoded = 0u16;
        let err = decode_from_slice(&bytes, &mut decoded).unwrap_err();
        assert_eq!(err, StreamError::TrailingBytes { remaining: 1 });
    }
}
