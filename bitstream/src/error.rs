//! Error types for stream operations.

use crate::stream::StreamMode;

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur while serializing through a [`BinaryStream`](crate::BinaryStream).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Attempted to read past the end of the buffer.
    #[error("attempted to read {requested} bytes but only {available} bytes available")]
    UnexpectedEof {
        /// Number of bytes requested.
        requested: usize,
        /// Number of bytes available.
        available: usize,
    },

    /// A varint ran past its maximum encoded width.
    #[error("invalid varint encoding")]
    InvalidVarint,

    /// A bool was encoded as something other than 0 or 1.
    #[error("invalid bool byte 0x{value:02X}")]
    InvalidBool {
        /// The byte that was read.
        value: u8,
    },

    /// A length-prefixed blob is larger than the caller allows.
    #[error("blob length {length} exceeds maximum {max}")]
    LengthExceeded {
        /// Declared or actual length.
        length: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Bytes were left over after a complete decode.
    #[error("{remaining} trailing bytes after decode")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },

    /// The operation is only valid for the other stream mode.
    #[error("operation requires a {expected} stream")]
    WrongMode {
        /// The mode the operation needs.
        expected: StreamMode,
    },
}
