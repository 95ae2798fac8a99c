//! Error types for wire format operations.

use std::fmt;

use bitstream::StreamError;

/// Result type for wire format operations.
pub type WireResult<T> = Result<T, DecodeError>;

/// Decode errors for replication messages.
///
/// Any decode error rejects the whole message; no records are returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// Message is too small to contain the required header.
    #[error("message too small: {actual} bytes, need at least {required}")]
    MessageTooSmall { actual: usize, required: usize },

    /// Invalid magic number in message header.
    #[error("invalid magic number: 0x{found:08X}")]
    InvalidMagic { found: u32 },

    /// Unsupported wire version.
    #[error("unsupported wire version: {found}")]
    UnsupportedVersion { found: u16 },

    /// Reserved flag bits were set.
    #[error("invalid flags: 0x{flags:04X}")]
    InvalidFlags { flags: u16 },

    /// Unknown record kind encountered.
    #[error("unknown record kind: {kind}")]
    UnknownRecordKind { kind: u8 },

    /// Limits exceeded.
    #[error("{kind} limit exceeded: {actual} > {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// Bytes remained after the declared number of records.
    #[error("{remaining} trailing bytes after {records} records")]
    TrailingBytes { records: u32, remaining: usize },

    /// The record stream ended early or was malformed.
    #[error("record stream error: {0}")]
    Stream(#[from] StreamError),
}

/// Specific wire limits that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    MessageBytes,
    RecordCount,
    PayloadLength,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MessageBytes => "message bytes",
            Self::RecordCount => "record count",
            Self::PayloadLength => "payload length",
        };
        write!(f, "{name}")
    }
}

/// Errors that can occur during encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A record payload is larger than the configured maximum.
    #[error("payload too large: {length} bytes, maximum {max}")]
    PayloadTooLarge { length: usize, max: usize },

    /// The message already holds the maximum number of records.
    #[error("too many records: limit {limit}")]
    TooManyRecords { limit: usize },

    /// Appending the record would exceed the maximum message size.
    #[error("message too large: {required} bytes, maximum {max}")]
    MessageTooLarge { required: usize, max: usize },
}
