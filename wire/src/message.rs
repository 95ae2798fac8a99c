//! Transport-level message identifiers.

/// Identifier attached to every message handed to a transport.
///
/// Replication owns [`MessageId::REPLICA_INFO`]; applications may use any
/// other value for their own traffic on the same connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageId(pub u16);

impl MessageId {
    /// Object replication records for one connection.
    pub const REPLICA_INFO: Self = Self(1);

    /// Returns `true` if this id carries replication records.
    #[must_use]
    pub const fn is_replication(self) -> bool {
        self.0 == Self::REPLICA_INFO.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::REPLICA_INFO => write!(f, "replica-info"),
            Self(raw) => write!(f, "msg#{raw}"),
        }
    }
}
