//! Byte-aligned serialization stream for object replication.
//!
//! This crate provides [`BinaryStream`], a cursor that is either a reader or a
//! writer, and the [`NetSerialize`] trait that lets a type describe its
//! replicated fields once for both directions.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - All reads are bounds-checked.
//! - **No domain knowledge** - This crate knows nothing about objects, connections, or game state.
//! - **Explicit errors** - All failures return structured errors, never panic.
//!
//! # Example
//!
//! ```
//! use bitstream::BinaryStream;
//!
//! let mut writer = BinaryStream::writer();
//! writer.serialize_bool(&mut true).unwrap();
//! writer.serialize_f32(&mut 1.5).unwrap();
//!
//! let bytes = writer.into_bytes().unwrap();
//!
//! let mut reader = BinaryStream::reader(&bytes);
//! let mut flag = false;
//! let mut value = 0.0f32;
//! reader.serialize_bool(&mut flag).unwrap();
//! reader.serialize_f32(&mut value).unwrap();
//! assert!(flag);
//! assert_eq!(value, 1.5);
//! ```

mod error;
mod serialize;
mod stream;

pub use error::{StreamError, StreamResult};
pub use serialize::{decode_from_slice, encode_to_vec, NetSerialize};
pub use stream::{BinaryStream, StreamMode, VARINT_MAX_BYTES};
