//! Read-or-write cursor over a byte buffer.

use std::fmt;

use crate::error::{StreamError, StreamResult};

/// Maximum encoded size of a varint `u32` in bytes.
pub const VARINT_MAX_BYTES: usize = 5;

/// Direction of a [`BinaryStream`], fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// Decodes from a borrowed buffer.
    Reader,
    /// Encodes into an owned, growable buffer.
    Writer,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reader => write!(f, "reader"),
            Self::Writer => write!(f, "writer"),
        }
    }
}

#[derive(Debug)]
enum Cursor<'a> {
    Reader { data: &'a [u8], offset: usize },
    Writer { bytes: Vec<u8> },
}

/// A byte-aligned serialization stream that either reads or writes.
///
/// Every `serialize_*` call takes the value by mutable reference. In writer
/// mode the value is appended to the buffer and left untouched; in reader
/// mode the value is overwritten with the decoded bytes. Both modes consume
/// or produce the same number of bytes, so one serialize routine describes
/// both directions.
///
/// The encoding carries no tags. Callers must issue the same sequence of
/// calls on both ends. Multi-byte values are little-endian.
///
/// A failed read never advances the cursor.
#[derive(Debug)]
pub struct BinaryStream<'a> {
    cursor: Cursor<'a>,
}

impl<'a> BinaryStream<'a> {
    /// Creates a reader over `data`.
    #[must_use]
    pub const fn reader(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::Reader { data, offset: 0 },
        }
    }

    /// Creates an empty writer.
    #[must_use]
    pub const fn writer() -> Self {
        Self {
            cursor: Cursor::Writer { bytes: Vec::new() },
        }
    }

    /// Creates a writer with pre-allocated capacity.
    #[must_use]
    pub fn writer_with_capacity(bytes: usize) -> Self {
        Self {
            cursor: Cursor::Writer {
                bytes: Vec::with_capacity(bytes),
            },
        }
    }

    /// Returns the stream mode.
    #[must_use]
    pub const fn mode(&self) -> StreamMode {
        match self.cursor {
            Cursor::Reader { .. } => StreamMode::Reader,
            Cursor::Writer { .. } => StreamMode::Writer,
        }
    }

    /// Returns `true` for a reader.
    #[must_use]
    pub const fn is_reader(&self) -> bool {
        matches!(self.cursor, Cursor::Reader { .. })
    }

    /// Returns `true` for a writer.
    #[must_use]
    pub const fn is_writer(&self) -> bool {
        matches!(self.cursor, Cursor::Writer { .. })
    }

    /// Bytes consumed (reader) or produced (writer) so far.
    #[must_use]
    pub fn offset(&self) -> usize {
        match &self.cursor {
            Cursor::Reader { offset, .. } => *offset,
            Cursor::Writer { bytes } => bytes.len(),
        }
    }

    /// Bytes left to read. Always zero for a writer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        match &self.cursor {
            Cursor::Reader { data, offset } => data.len().saturating_sub(*offset),
            Cursor::Writer { .. } => 0,
        }
    }

    /// Returns `true` if a reader has consumed its whole buffer.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.is_reader() && self.remaining() == 0
    }

    /// The bound input (reader) or the bytes written so far (writer).
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match &self.cursor {
            Cursor::Reader { data, .. } => *data,
            Cursor::Writer { bytes } => bytes.as_slice(),
        }
    }

    /// Consumes a writer and returns its buffer.
    pub fn into_bytes(self) -> StreamResult<Vec<u8>> {
        match self.cursor {
            Cursor::Writer { bytes } => Ok(bytes),
            Cursor::Reader { .. } => Err(StreamError::WrongMode {
                expected: StreamMode::Writer,
            }),
        }
    }

    /// Fails with [`StreamError::TrailingBytes`] if a reader has unread input.
    pub fn expect_exhausted(&self) -> StreamResult<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(StreamError::TrailingBytes { remaining }),
        }
    }

    pub fn serialize_u8(&mut self, value: &mut u8) -> StreamResult<()> {
        let mut bytes = [*value];
        self.serialize_array(&mut bytes)?;
        *value = bytes[0];
        Ok(())
    }

    pub fn serialize_u16(&mut self, value: &mut u16) -> StreamResult<()> {
        let mut bytes = value.to_le_bytes();
        self.serialize_array(&mut bytes)?;
        *value = u16::from_le_bytes(bytes);
        Ok(())
    }

    pub fn serialize_u32(&mut self, value: &mut u32) -> StreamResult<()> {
        let mut bytes = value.to_le_bytes();
        self.serialize_array(&mut bytes)?;
        *value = u32::from_le_bytes(bytes);
        Ok(())
    }

    pub fn serialize_u64(&mut self, value: &mut u64) -> StreamResult<()> {
        let mut bytes = value.to_le_bytes();
        self.serialize_array(&mut bytes)?;
        *value = u64::from_le_bytes(bytes);
        Ok(())
    }

    pub fn serialize_i8(&mut self, value: &mut i8) -> StreamResult<()> {
        let mut bytes = value.to_le_bytes();
        self.serialize_array(&mut bytes)?;
        *value = i8::from_le_bytes(bytes);
        Ok(())
    }

    pub fn serialize_i16(&mut self, value: &mut i16) -> StreamResult<()> {
        let mut bytes = value.to_le_bytes();
        self.serialize_array(&mut bytes)?;
        *value = i16::from_le_bytes(bytes);
        Ok(())
    }

    pub fn serialize_i32(&mut self, value: &mut i32) -> StreamResult<()> {
        let mut bytes = value.to_le_bytes();
        self.serialize_array(&mut bytes)?;
        *value = i32::from_le_bytes(bytes);
        Ok(())
    }

    pub fn serialize_i64(&mut self, value: &mut i64) -> StreamResult<()> {
        let mut bytes = value.to_le_bytes();
        self.serialize_array(&mut bytes)?;
        *value = i64::from_le_bytes(bytes);
        Ok(())
    }

    /// Serializes an `f32` by its IEEE-754 bit pattern.
    pub fn serialize_f32(&mut self, value: &mut f32) -> StreamResult<()> {
        let mut bits = value.to_bits();
        self.serialize_u32(&mut bits)?;
        *value = f32::from_bits(bits);
        Ok(())
    }

    /// Serializes an `f64` by its IEEE-754 bit pattern.
    pub fn serialize_f64(&mut self, value: &mut f64) -> StreamResult<()> {
        let mut bits = value.to_bits();
        self.serialize_u64(&mut bits)?;
        *value = f64::from_bits(bits);
        Ok(())
    }

    /// Serializes a bool as one byte (0 or 1).
    pub fn serialize_bool(&mut self, value: &mut bool) -> StreamResult<()> {
        if self.is_writer() {
            return self.serialize_u8(&mut u8::from(*value));
        }
        let start = self.offset();
        let mut byte = 0u8;
        self.serialize_u8(&mut byte)?;
        match byte {
            0 => *value = false,
            1 => *value = true,
            _ => {
                self.rewind(start);
                return Err(StreamError::InvalidBool { value: byte });
            }
        }
        Ok(())
    }

    /// Serializes a fixed-size blob. The length is not encoded.
    pub fn serialize_bytes(&mut self, value: &mut [u8]) -> StreamResult<()> {
        if let Cursor::Writer { bytes } = &mut self.cursor {
            bytes.extend_from_slice(value);
            return Ok(());
        }
        let src = self.take(value.len())?;
        value.copy_from_slice(src);
        Ok(())
    }

    /// Serializes a `u32` as a LEB128 varint (1 to 5 bytes).
    pub fn serialize_varu32(&mut self, value: &mut u32) -> StreamResult<()> {
        if self.is_writer() {
            let mut remaining = *value;
            loop {
                let mut byte = (remaining & 0x7F) as u8;
                remaining >>= 7;
                if remaining != 0 {
                    byte |= 0x80;
                }
                self.serialize_u8(&mut byte)?;
                if remaining == 0 {
                    return Ok(());
                }
            }
        }

        let start = self.offset();
        let mut result = 0u32;
        for shift in (0..35).step_by(7) {
            let mut byte = 0u8;
            if let Err(err) = self.serialize_u8(&mut byte) {
                self.rewind(start);
                return Err(err);
            }
            let chunk = u32::from(byte & 0x7F);
            // The fifth byte may only carry the top four bits.
            if shift == 28 && chunk > 0x0F {
                self.rewind(start);
                return Err(StreamError::InvalidVarint);
            }
            result |= chunk << shift;
            if byte & 0x80 == 0 {
                *value = result;
                return Ok(());
            }
        }
        self.rewind(start);
        Err(StreamError::InvalidVarint)
    }

    /// Serializes an `i32` as a zigzag varint.
    pub fn serialize_vars32(&mut self, value: &mut i32) -> StreamResult<()> {
        let mut encoded = ((*value << 1) ^ (*value >> 31)) as u32;
        self.serialize_varu32(&mut encoded)?;
        *value = ((encoded >> 1) as i32) ^ (-((encoded & 1) as i32));
        Ok(())
    }

    /// Serializes a varint length prefix followed by that many bytes.
    ///
    /// Blobs longer than `max_len` are rejected in both modes.
    pub fn serialize_blob(&mut self, value: &mut Vec<u8>, max_len: usize) -> StreamResult<()> {
        if self.is_writer() {
            return self.write_blob(value, max_len);
        }
        let blob = self.read_blob(max_len)?;
        value.clear();
        value.extend_from_slice(blob);
        Ok(())
    }

    /// Appends a length-prefixed blob without copying it into a `Vec` first.
    pub fn write_blob(&mut self, blob: &[u8], max_len: usize) -> StreamResult<()> {
        if !self.is_writer() {
            return Err(StreamError::WrongMode {
                expected: StreamMode::Writer,
            });
        }
        if blob.len() > max_len {
            return Err(StreamError::LengthExceeded {
                length: blob.len(),
                max: max_len,
            });
        }
        let mut len = u32::try_from(blob.len()).map_err(|_| StreamError::LengthExceeded {
            length: blob.len(),
            max: u32::MAX as usize,
        })?;
        self.serialize_varu32(&mut len)?;
        if let Cursor::Writer { bytes } = &mut self.cursor {
            bytes.extend_from_slice(blob);
        }
        Ok(())
    }

    /// Reads a length-prefixed blob, borrowing it from the input buffer.
    pub fn read_blob(&mut self, max_len: usize) -> StreamResult<&'a [u8]> {
        if !self.is_reader() {
            return Err(StreamError::WrongMode {
                expected: StreamMode::Reader,
            });
        }
        let start = self.offset();
        let mut len = 0u32;
        self.serialize_varu32(&mut len)?;
        let len = len as usize;
        if len > max_len {
            self.rewind(start);
            return Err(StreamError::LengthExceeded {
                length: len,
                max: max_len,
            });
        }
        match self.take(len) {
            Ok(blob) => Ok(blob),
            Err(err) => {
                self.rewind(start);
                Err(err)
            }
        }
    }

    fn serialize_array<const N: usize>(&mut self, value: &mut [u8; N]) -> StreamResult<()> {
        if let Cursor::Writer { bytes } = &mut self.cursor {
            bytes.extend_from_slice(value);
            return Ok(());
        }
        let src = self.take(N)?;
        value.copy_from_slice(src);
        Ok(())
    }

    fn take(&mut self, len: usize) -> StreamResult<&'a [u8]> {
        match &mut self.cursor {
            Cursor::Reader { data, offset } => {
                let data: &'a [u8] = *data;
                let available = data.len().saturating_sub(*offset);
                if len > available {
                    return Err(StreamError::UnexpectedEof {
                        requested: len,
                        available,
                    });
                }
                let start = *offset;
                *offset += len;
                Ok(&data[start..start + len])
            }
            Cursor::Writer { .. } => Err(StreamError::WrongMode {
                expected: StreamMode::Reader,
            }),
        }
    }

    fn rewind(&mut self, to: usize) {
        if let Cursor::Reader { offset, .. } = &mut self.cursor {
            *offset = to;
        }
    }
}

impl Default for BinaryStream<'_> {
    fn default() -> Self {
        Self::writer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_writer() {
        let stream = BinaryStream::writer();
        assert!(stream.is_writer());
        assert_eq!(stream.offset(), 0);
        assert!(stream.into_bytes().unwrap().is_empty());
    }

    #[test]
    fn empty_reader() {
        let stream = BinaryStream::reader(&[]);
        assert!(stream.is_reader());
        assert!(stream.is_exhausted());
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn read_from_empty_fails() {
        let mut stream = BinaryStream::reader(&[]);
        let mut value = 0u8;
        let err = stream.serialize_u8(&mut value).unwrap_err();
        assert_eq!(
            err,
            StreamError::UnexpectedEof {
                requested: 1,
                available: 0
            }
        );
    }

    #[test]
    fn writer_is_little_endian() {
        let mut stream = BinaryStream::writer();
        stream.serialize_u32(&mut 0x1234_5678).unwrap();
        assert_eq!(stream.data(), &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn reader_overwrites_value() {
        let mut stream = BinaryStream::reader(&[0x78, 0x56, 0x34, 0x12]);
        let mut value = 0u32;
        stream.serialize_u32(&mut value).unwrap();
        assert_eq!(value, 0x1234_5678);
        assert!(stream.is_exhausted());
    }

    #[test]
    fn writer_leaves_value_untouched() {
        let mut stream = BinaryStream::writer();
        let mut value = -3.5f32;
        stream.serialize_f32(&mut value).unwrap();
        assert_eq!(value.to_bits(), (-3.5f32).to_bits());
    }

    #[test]
    fn one_point_zero_f32_bytes() {
        let mut stream = BinaryStream::writer();
        stream.serialize_f32(&mut 1.0).unwrap();
        assert_eq!(stream.data(), &1.0f32.to_bits().to_le_bytes());
    }

    #[test]
    fn truncated_read_does_not_advance() {
        let mut stream = BinaryStream::reader(&[1, 2, 3]);
        let mut value = 0u32;
        let err = stream.serialize_u32(&mut value).unwrap_err();
        assert!(matches!(
            err,
            StreamError::UnexpectedEof {
                requested: 4,
                available: 3
            }
        ));
        assert_eq!(stream.offset(), 0);
        assert_eq!(value, 0);
    }

    #[test]
    fn bool_rejects_other_bytes() {
        let mut stream = BinaryStream::reader(&[2]);
        let mut value = false;
        let err = stream.serialize_bool(&mut value).unwrap_err();
        assert_eq!(err, StreamError::InvalidBool { value: 2 });
        assert_eq!(stream.offset(), 0);
    }

    #[test]
    fn varu32_known_encoding() {
        let mut stream = BinaryStream::writer();
        stream.serialize_varu32(&mut 300).unwrap();
        assert_eq!(stream.data(), &[0xAC, 0x02]);

        let mut reader = BinaryStream::reader(&[0xAC, 0x02]);
        let mut value = 0u32;
        reader.serialize_varu32(&mut value).unwrap();
        assert_eq!(value, 300);
    }

    #[test]
    fn varu32_max_uses_five_bytes() {
        let mut stream = BinaryStream::writer();
        stream.serialize_varu32(&mut u32::MAX).unwrap();
        assert_eq!(stream.offset(), VARINT_MAX_BYTES);
    }

    #[test]
    fn varu32_overlong_fails() {
        let mut stream = BinaryStream::reader(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        let mut value = 0u32;
        let err = stream.serialize_varu32(&mut value).unwrap_err();
        assert_eq!(err, StreamError::InvalidVarint);
        assert_eq!(stream.offset(), 0);
    }

    #[test]
    fn varu32_fifth_byte_overflow_fails() {
        let mut stream = BinaryStream::reader(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        let mut value = 0u32;
        let err = stream.serialize_varu32(&mut value).unwrap_err();
        assert_eq!(err, StreamError::InvalidVarint);
    }

    #[test]
    fn varu32_truncated_rewinds() {
        let mut stream = BinaryStream::reader(&[0x80, 0x80]);
        let mut value = 0u32;
        let err = stream.serialize_varu32(&mut value).unwrap_err();
        assert!(matches!(err, StreamError::UnexpectedEof { .. }));
        assert_eq!(stream.offset(), 0);
    }

    #[test]
    fn vars32_negative_one() {
        let mut stream = BinaryStream::reader(&[0x01]);
        let mut value = 0i32;
        stream.serialize_vars32(&mut value).unwrap();
        assert_eq!(value, -1);
    }

    #[test]
    fn blob_roundtrip_and_limit() {
        let mut writer = BinaryStream::writer();
        writer.write_blob(&[9, 8, 7], 16).unwrap();
        let bytes = writer.into_bytes().unwrap();
        assert_eq!(bytes, vec![3, 9, 8, 7]);

        let mut reader = BinaryStream::reader(&bytes);
        assert_eq!(reader.read_blob(16).unwrap(), &[9, 8, 7]);

        let mut reader = BinaryStream::reader(&bytes);
        let err = reader.read_blob(2).unwrap_err();
        assert_eq!(err, StreamError::LengthExceeded { length: 3, max: 2 });
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn blob_truncated_body_rewinds() {
        let mut reader = BinaryStream::reader(&[4, 1, 2]);
        let err = reader.read_blob(16).unwrap_err();
        assert!(matches!(
            err,
            StreamError::UnexpectedEof {
                requested: 4,
                available: 2
            }
        ));
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn write_blob_rejects_oversized() {
        let mut writer = BinaryStream::writer();
        let err = writer.write_blob(&[0; 5], 4).unwrap_err();
        assert_eq!(err, StreamError::LengthExceeded { length: 5, max: 4 });
        assert_eq!(writer.offset(), 0);
    }

    #[test]
    fn mode_specific_operations_fail_in_other_mode() {
        let mut writer = BinaryStream::writer();
        assert!(matches!(
            writer.read_blob(4),
            Err(StreamError::WrongMode {
                expected: StreamMode::Reader
            })
        ));

        let mut reader = BinaryStream::reader(&[]);
        assert!(matches!(
            reader.write_blob(&[], 4),
            Err(StreamError::WrongMode {
                expected: StreamMode::Writer
            })
        ));
        assert!(reader.into_bytes().is_err());
    }

    #[test]
    fn expect_exhausted_reports_trailing() {
        let mut reader = BinaryStream::reader(&[1, 2]);
        let mut value = 0u8;
        reader.serialize_u8(&mut value).unwrap();
        assert_eq!(
            reader.expect_exhausted(),
            Err(StreamError::TrailingBytes { remaining: 1 })
        );
    }
}
