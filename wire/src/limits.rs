//! Configurable limits for bounded decoding.

use crate::record::create_message_len;

/// Wire-level limits for replication messages.
///
/// Decoding checks every declared count and length against these limits
/// before iterating or allocating, so a hostile header cannot force large
/// allocations. Encoding enforces the payload limit as well, so a sender
/// never produces a message its peer would reject.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Limits {
    /// Maximum message size in bytes.
    pub max_message_bytes: usize,

    /// Maximum number of records in one message.
    pub max_records: usize,

    /// Maximum length of a single Create or Update payload in bytes.
    pub max_payload_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            // A full resend of a busy scene still fits comfortably.
            max_message_bytes: 1024 * 1024,
            max_records: 64 * 1024,
            max_payload_len: 16 * 1024,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_message_bytes: 4096,
            max_records: 64,
            max_payload_len: 256,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_message_bytes: usize::MAX,
            max_records: usize::MAX,
            max_payload_len: usize::MAX,
        }
    }

    /// Returns `true` if a new object with these payload sizes can be sent.
    ///
    /// Its Create and initial Update must share one otherwise empty message,
    /// or the object would be deferred on every pass.
    #[must_use]
    pub fn fits_create(&self, init_len: usize, sync_len: usize) -> bool {
        let records = if sync_len > 0 { 2 } else { 1 };
        init_len <= self.max_payload_len
            && sync_len <= self.max_payload_len
            && records <= self.max_records
            && create_message_len(init_len, sync_len) <= self.max_message_bytes
    }
}
