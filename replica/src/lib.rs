//! Server-authoritative object replication.
//!
//! The authoritative end owns a [`ReplicaRegistry`] of [`NetObject`]s and one
//! [`ReplicaConnection`] per peer. Each tick the game writes object state into
//! sync data, calls [`ReplicaRegistry::update_send_data`], and ships every
//! connection's buffer on [`MessageId::REPLICA_INFO`]. A receiving peer feeds
//! those messages to a [`ReplicaClient`], which keeps remote stand-ins in step.
//!
//! # Design Principles
//!
//! - **Single owner** - The registry owns every object; connections hold ids only.
//! - **Pull-based** - Creation and destruction take effect on the next pass.
//! - **One source of truth** - An object is either written locally or read from the wire, never both.
//! - **Loud local errors** - Invariant violations return errors; protocol violations from peers are logged and skipped.
//!
//! # Example
//!
//! ```
//! use replica::{ReplicaClient, ReplicaConfig, ReplicaEvent, ReplicaRegistry};
//!
//! let config = ReplicaConfig::default();
//! let mut registry = ReplicaRegistry::new(config.clone());
//! let conn = registry.create_connection();
//! let id = registry.create_object(b"circle").unwrap();
//! registry.object_mut(id).unwrap().set_sync_data(&[1, 2, 3, 4]).unwrap();
//!
//! registry.update_send_data();
//! let bytes = registry.connection(conn).unwrap().send_data().to_vec();
//!
//! let mut client = ReplicaClient::new(config.limits);
//! client.receive(&bytes).unwrap();
//! assert_eq!(client.poll_event(), Some(ReplicaEvent::Created(id)));
//! assert_eq!(client.object(id).unwrap().sync_data(), &[1, 2, 3, 4]);
//! ```

mod client;
mod config;
mod connection;
mod error;
mod object;
mod registry;
pub mod transport;
mod types;

pub use client::{ReceiveStats, ReplicaClient, ReplicaEvent};
pub use config::{ConnectionBudget, ReplicaConfig, UpdatePolicy};
pub use connection::{PassStats, ReplicaConnection};
pub use error::{ReplicaError, ReplicaResult};
pub use object::{AuthorityRole, NetObject};
pub use registry::{ReplicaRegistry, SendStats};
pub use types::{ConnectionId, ObjectId};

pub use bitstream::{BinaryStream, NetSerialize};
pub use wire::{Limits, MessageId};
