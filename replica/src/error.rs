//! Error types for replication operations.

use bitstream::StreamError;
use wire::{DecodeError, EncodeError};

use crate::object::AuthorityRole;
use crate::types::{ConnectionId, ObjectId};

/// Result type for replication operations.
pub type ReplicaResult<T> = Result<T, ReplicaError>;

/// Errors returned by the registry, objects and the receiver.
///
/// Local invariant violations leave all state unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ReplicaError {
    /// No live object with this id.
    #[error("unknown object {id}")]
    UnknownObject { id: ObjectId },

    /// No open connection with this id.
    #[error("unknown connection {id}")]
    UnknownConnection { id: ConnectionId },

    /// The operation requires the other authority role.
    #[error("authority violation on object {id}: this end is {role}")]
    AuthorityViolation { id: ObjectId, role: AuthorityRole },

    /// Serialized sync data does not fit in one record payload.
    #[error("sync data for object {id} too large: {length} bytes, maximum {max}")]
    SyncDataTooLarge {
        id: ObjectId,
        length: usize,
        max: usize,
    },

    /// Init data does not fit in one record payload.
    #[error("init data too large: {length} bytes, maximum {max}")]
    InitDataTooLarge { length: usize, max: usize },

    /// A Create and its initial Update do not fit in one message.
    #[error("create does not fit in one message: needs {required} bytes, maximum {max}")]
    CreateTooLarge { required: usize, max: usize },

    /// Every id is either live or still referenced by a connection.
    #[error("object id space exhausted")]
    IdSpaceExhausted,

    /// An inbound message failed to decode; nothing was applied.
    #[error("malformed replication message: {0}")]
    Decode(#[from] DecodeError),

    /// An outbound record could not be encoded.
    #[error("replication encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// Object state failed to serialize or deserialize.
    #[error("object state stream error: {0}")]
    Stream(#[from] StreamError),
}
