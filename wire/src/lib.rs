//! Wire framing for object replication messages.
//!
//! This crate handles the binary layout of a replication message: the header,
//! the Create/Update/Delete record framing, and limit enforcement. It does not
//! know what an object is or what its payload bytes mean, only the structure
//! of messages.
//!
//! # Design Principles
//!
//! - **Stable wire format** - The format is versioned and changes are documented.
//! - **Bounded decoding** - All counts and lengths are validated against limits before iteration.
//! - **All-or-nothing** - A message either decodes completely or not at all.
//! - **No domain knowledge** - This crate handles framing, not game logic.
//!
//! See `WIRE_FORMAT.md` for the byte-level layout.
//!
//! # Example
//!
//! ```
//! use wire::{decode_message, Limits, MessageWriter, RecordKind};
//!
//! let limits = Limits::default();
//! let mut writer = MessageWriter::new(&limits);
//! writer.push_create(1, &[]).unwrap();
//! writer.push_update(1, &[1, 2, 3]).unwrap();
//! let bytes = writer.finish();
//!
//! let message = decode_message(&bytes, &limits).unwrap();
//! assert_eq!(message.records.len(), 2);
//! assert_eq!(message.records[1].kind, RecordKind::Update);
//! assert_eq!(message.records[1].payload, &[1, 2, 3]);
//! ```

mod error;
mod header;
mod limits;
mod message;
mod record;

pub use error::{DecodeError, EncodeError, LimitKind, WireResult};
pub use header::{decode_header, MessageHeader, HEADER_SIZE, MAGIC, VERSION};
pub use limits::Limits;
pub use message::MessageId;
pub use record::{
    create_message_len, decode_message, record_len, MessageWriter, RecordKind, ReplicaMessage, WireRecord,
};
