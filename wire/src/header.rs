//! Message header types and constants.

use bitstream::BinaryStream;

use crate::error::{DecodeError, WireResult};

/// Magic number identifying replication messages.
///
/// This value is fixed and must never change across versions.
pub const MAGIC: u32 = 0x5245_504C; // "REPL" in ASCII

/// Current wire format version.
pub const VERSION: u16 = 1;

/// Header size in bytes (12 total).
pub const HEADER_SIZE: usize = 4 + 2 + 2 + 4;

/// Reserved flag bits (all of them in version 1).
const RESERVED_FLAGS: u16 = u16::MAX;

/// Replication message header.
///
/// The magic number is validated during decoding and is not stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Wire format version.
    pub version: u16,
    /// Flag bits, reserved for future versions.
    pub flags: u16,
    /// Number of records following the header.
    pub record_count: u32,
}

impl MessageHeader {
    /// Creates a version 1 header.
    #[must_use]
    pub const fn new(record_count: u32) -> Self {
        Self {
            version: VERSION,
            flags: 0,
            record_count,
        }
    }
}

/// Appends the encoded header to `out`.
pub(crate) fn write_header(header: &MessageHeader, out: &mut Vec<u8>) {
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&header.version.to_le_bytes());
    out.extend_from_slice(&header.flags.to_le_bytes());
    out.extend_from_slice(&header.record_count.to_le_bytes());
}

/// Reads and validates a header from the front of `stream`.
pub(crate) fn read_header(stream: &mut BinaryStream<'_>) -> WireResult<MessageHeader> {
    if stream.remaining() < HEADER_SIZE {
        return Err(DecodeError::MessageTooSmall {
            actual: stream.remaining(),
            required: HEADER_SIZE,
        });
    }

    let mut magic = 0u32;
    stream.serialize_u32(&mut magic)?;
    if magic != MAGIC {
        return Err(DecodeError::InvalidMagic { found: magic });
    }

    let mut header = MessageHeader::new(0);
    stream.serialize_u16(&mut header.version)?;
    if header.version != VERSION {
        return Err(DecodeError::UnsupportedVersion {
            found: header.version,
        });
    }

    stream.serialize_u16(&mut header.flags)?;
    if header.flags & RESERVED_FLAGS != 0 {
        return Err(DecodeError::InvalidFlags {
            flags: header.flags,
        });
    }

    stream.serialize_u32(&mut header.record_count)?;
    Ok(header)
}

/// Decodes only the header of a message.
pub fn decode_header(buf: &[u8]) -> WireResult<MessageHeader> {
    read_header(&mut BinaryStream::reader(buf))
}
