//! Replicated object handles and authority.

use std::fmt;

use bitstream::{decode_from_slice, BinaryStream, NetSerialize};
use tracing::error;
use wire::{create_message_len, Limits};

use crate::error::{ReplicaError, ReplicaResult};
use crate::types::ObjectId;

/// Which end of a connection owns an object's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AuthorityRole {
    /// This end writes the object's state into its sync data.
    Local,
    /// This end reads the object's state from received sync data.
    Remote,
}

impl fmt::Display for AuthorityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// One networked object's identity, authority and serialized state.
///
/// The role is fixed at creation. On the authority the only path that
/// changes sync data is [`tick`](Self::tick) (or [`set_sync_data`](Self::set_sync_data));
/// on a remote peer the only path is an inbound Update record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetObject {
    id: ObjectId,
    role: AuthorityRole,
    init_data: Vec<u8>,
    sync_data: Vec<u8>,
    revision: u64,
    limits: Limits,
}

impl NetObject {
    pub(crate) fn new(
        id: ObjectId,
        role: AuthorityRole,
        init_data: Vec<u8>,
        limits: Limits,
    ) -> Self {
        Self {
            id,
            role,
            init_data,
            sync_data: Vec::new(),
            revision: 0,
            limits,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub const fn role(&self) -> AuthorityRole {
        self.role
    }

    /// Returns `true` if this end owns the object's state.
    #[must_use]
    pub fn is_authority(&self) -> bool {
        self.role == AuthorityRole::Local
    }

    /// Data supplied at creation, delivered once with the Create record.
    #[must_use]
    pub fn init_data(&self) -> &[u8] {
        &self.init_data
    }

    /// Latest serialized snapshot of the replicated fields.
    #[must_use]
    pub fn sync_data(&self) -> &[u8] {
        &self.sync_data
    }

    /// Counter bumped whenever the sync data changes.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Runs one tick of replication for `state`.
    ///
    /// On the authority `state` is serialized into the sync data. On a
    /// remote peer the latest sync data is deserialized into `state`; the
    /// sync data itself is never touched, and nothing happens until the
    /// first Update has arrived. A remote decode that fails leaves `state`
    /// exactly as it was.
    pub fn tick<T: NetSerialize + Clone>(&mut self, state: &mut T) -> ReplicaResult<()> {
        match self.role {
            AuthorityRole::Local => {
                let mut stream = BinaryStream::writer_with_capacity(self.sync_data.len());
                state.serialize(&mut stream)?;
                let bytes = stream.into_bytes()?;
                self.store_sync_data(bytes)
            }
            AuthorityRole::Remote => {
                if self.sync_data.is_empty() {
                    return Ok(());
                }
                let mut decoded = state.clone();
                decode_from_slice(&self.sync_data, &mut decoded)?;
                *state = decoded;
                Ok(())
            }
        }
    }

    /// Replaces the sync data directly. Only valid on the authority.
    pub fn set_sync_data(&mut self, bytes: &[u8]) -> ReplicaResult<()> {
        if self.role == AuthorityRole::Remote {
            error!(object = %self.id, "sync data written on a remote object");
            return Err(ReplicaError::AuthorityViolation {
                id: self.id,
                role: self.role,
            });
        }
        if bytes == self.sync_data.as_slice() {
            return Ok(());
        }
        self.store_sync_data(bytes.to_vec())
    }

    fn store_sync_data(&mut self, bytes: Vec<u8>) -> ReplicaResult<()> {
        let max = self.limits.max_payload_len;
        if bytes.len() > max {
            error!(
                object = %self.id,
                length = bytes.len(),
                max,
                "sync data exceeds payload limit"
            );
            return Err(ReplicaError::SyncDataTooLarge {
                id: self.id,
                length: bytes.len(),
                max,
            });
        }
        if !self.limits.fits_create(self.init_data.len(), bytes.len()) {
            let required = create_message_len(self.init_data.len(), bytes.len());
            let max = self.limits.max_message_bytes;
            error!(object = %self.id, required, max, "create and sync data exceed message size");
            return Err(ReplicaError::CreateTooLarge { required, max });
        }
        if bytes != self.sync_data {
            self.sync_data = bytes;
            self.revision += 1;
        }
        Ok(())
    }

    /// Stores sync data received from the authority.
    pub(crate) fn apply_remote_sync(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.role, AuthorityRole::Remote);
        if bytes != self.sync_data.as_slice() {
            self.sync_data.clear();
            self.sync_data.extend_from_slice(bytes);
            self.revision += 1;
        }
    }
}
