//! Identifier types.

use std::fmt;

/// Process-unique identifier of a replicated object.
///
/// Ids are assigned by the registry and are never reused while any
/// connection still references them. Zero is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectId(u32);

impl ObjectId {
    /// Creates an id from its wire representation.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the wire representation.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of one replication connection on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_raw_roundtrip() {
        assert_eq!(ObjectId::new(42).raw(), 42);
        assert!(ObjectId::new(1) < ObjectId::new(2));
    }

    #[test]
    fn display_forms() {
        assert_eq!(ObjectId::new(7).to_string(), "#7");
        assert_eq!(ConnectionId(3).to_string(), "conn3");
    }
}
