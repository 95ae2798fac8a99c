//! Server-side object database and replication driver.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error, info};
use wire::create_message_len;

use crate::config::ReplicaConfig;
use crate::connection::{PassStats, ReplicaConnection};
use crate::error::{ReplicaError, ReplicaResult};
use crate::object::{AuthorityRole, NetObject};
use crate::types::{ConnectionId, ObjectId};

/// Totals for one [`ReplicaRegistry::update_send_data`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SendStats {
    pub connections: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub deferred: usize,
    pub bytes: usize,
}

impl SendStats {
    fn accumulate(&mut self, pass: PassStats) {
        self.connections += 1;
        self.creates += pass.creates;
        self.updates += pass.updates;
        self.deletes += pass.deletes;
        self.deferred += pass.deferred;
        self.bytes += pass.bytes;
    }
}

/// Exclusive owner of every replicated object on the authoritative end.
///
/// Connections refer to objects by id only. Creation and destruction are
/// pull-based: nothing is sent until the next
/// [`update_send_data`](Self::update_send_data), which diffs every object
/// against every connection's known set.
#[derive(Debug, Clone)]
pub struct ReplicaRegistry {
    config: ReplicaConfig,
    objects: BTreeMap<ObjectId, NetObject>,
    /// Destroyed ids still present in some connection's known set.
    retired: BTreeSet<ObjectId>,
    connections: BTreeMap<ConnectionId, ReplicaConnection>,
    next_object_id: u32,
    next_connection_id: u32,
    passes: u64,
}

impl Default for ReplicaRegistry {
    fn default() -> Self {
        Self::new(ReplicaConfig::default())
    }
}

impl ReplicaRegistry {
    #[must_use]
    pub fn new(config: ReplicaConfig) -> Self {
        Self {
            config,
            objects: BTreeMap::new(),
            retired: BTreeSet::new(),
            connections: BTreeMap::new(),
            next_object_id: 1,
            next_connection_id: 1,
            passes: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    /// Creates an authoritative object with empty sync data.
    ///
    /// Every open connection receives a Create on its next pass.
    pub fn create_object(&mut self, init_data: &[u8]) -> ReplicaResult<ObjectId> {
        let limits = &self.config.limits;
        let max = limits.max_payload_len;
        if init_data.len() > max {
            error!(length = init_data.len(), max, "init data exceeds payload limit");
            return Err(ReplicaError::InitDataTooLarge {
                length: init_data.len(),
                max,
            });
        }
        if !limits.fits_create(init_data.len(), 0) {
            let required = create_message_len(init_data.len(), 0);
            let max = limits.max_message_bytes;
            error!(required, max, "create exceeds message size");
            return Err(ReplicaError::CreateTooLarge { required, max });
        }

        let id = self.allocate_id()?;
        let object = NetObject::new(
            id,
            AuthorityRole::Local,
            init_data.to_vec(),
            self.config.limits.clone(),
        );
        self.objects.insert(id, object);
        debug!(object = %id, init_len = init_data.len(), "object created");
        Ok(id)
    }

    /// Destroys a live object.
    ///
    /// Every connection that knows the object receives a Delete on its next
    /// pass. The id stays reserved until no connection knows it.
    pub fn destroy_object(&mut self, id: ObjectId) -> ReplicaResult<()> {
        if self.objects.remove(&id).is_none() {
            error!(object = %id, "destroy of unknown object");
            return Err(ReplicaError::UnknownObject { id });
        }
        if self.connections.values().any(|connection| connection.knows(id)) {
            self.retired.insert(id);
        }
        debug!(object = %id, "object destroyed");
        Ok(())
    }

    #[must_use]
    pub fn object(&self, id: ObjectId) -> Option<&NetObject> {
        self.objects.get(&id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut NetObject> {
        self.objects.get_mut(&id)
    }

    /// Live objects in ascending id order.
    pub fn objects(&self) -> impl Iterator<Item = &NetObject> + '_ {
        self.objects.values()
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if `id` is destroyed but still known by a connection.
    #[must_use]
    pub fn is_retired(&self, id: ObjectId) -> bool {
        self.retired.contains(&id)
    }

    /// Opens a connection with an empty known set.
    pub fn create_connection(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id = self.next_connection_id.wrapping_add(1);
        self.connections
            .insert(id, ReplicaConnection::new(id, self.config.budget));
        info!(connection = %id, "replication connection opened");
        id
    }

    /// Closes a connection, dropping its known set and pending buffer.
    pub fn destroy_connection(&mut self, id: ConnectionId) -> ReplicaResult<()> {
        if self.connections.remove(&id).is_none() {
            error!(connection = %id, "destroy of unknown connection");
            return Err(ReplicaError::UnknownConnection { id });
        }
        self.prune_retired();
        info!(connection = %id, "replication connection closed");
        Ok(())
    }

    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<&ReplicaConnection> {
        self.connections.get(&id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut ReplicaConnection> {
        self.connections.get_mut(&id)
    }

    /// Open connections in ascending id order.
    pub fn connections(&self) -> impl Iterator<Item = &ReplicaConnection> + '_ {
        self.connections.values()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of passes run so far.
    #[must_use]
    pub const fn passes(&self) -> u64 {
        self.passes
    }

    /// Rebuilds every connection's send buffer.
    ///
    /// Per connection, records are emitted as Creates (each followed by an
    /// Update when the object already has sync data) for unknown objects,
    /// then Updates for known objects, then Deletes for known destroyed
    /// objects, each group in ascending id order.
    pub fn update_send_data(&mut self) -> SendStats {
        self.passes += 1;
        let mut stats = SendStats::default();
        for connection in self.connections.values_mut() {
            stats.accumulate(connection.build_pass(&self.objects, &self.config));
        }
        self.prune_retired();

        debug!(
            pass = self.passes,
            connections = stats.connections,
            creates = stats.creates,
            updates = stats.updates,
            deletes = stats.deletes,
            deferred = stats.deferred,
            bytes = stats.bytes,
            "replication pass"
        );
        stats
    }

    fn prune_retired(&mut self) {
        let connections = &self.connections;
        self.retired
            .retain(|id| connections.values().any(|connection| connection.knows(*id)));
    }

    /// Next id that is neither live nor retired. Zero is skipped.
    fn allocate_id(&mut self) -> ReplicaResult<ObjectId> {
        let in_use = self.objects.len() + self.retired.len();
        if in_use >= u32::MAX as usize {
            error!(in_use, "object id space exhausted");
            return Err(ReplicaError::IdSpaceExhausted);
        }
        loop {
            let candidate = ObjectId::new(self.next_object_id);
            self.next_object_id = self.next_object_id.wrapping_add(1);
            if candidate.raw() == 0
                || self.objects.contains_key(&candidate)
                || self.retired.contains(&candidate)
            {
                continue;
            }
            return Ok(candidate);
        }
    }

    #[cfg(test)]
    fn set_next_object_id(&mut self, raw: u32) {
        self.next_object_id = raw;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire::Limits;

    fn registry() -> ReplicaRegistry {
        ReplicaRegistry::new(ReplicaConfig::for_testing())
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut registry = registry();
        assert_eq!(registry.create_object(&[]).unwrap(), ObjectId::new(1));
        assert_eq!(registry.create_object(&[]).unwrap(), ObjectId::new(2));
    }

    #[test]
    fn destroyed_id_not_reused_after_wrap_while_known() {
        let mut registry = registry();
        let conn = registry.create_connection();
        let id = registry.create_object(&[]).unwrap();
        registry.update_send_data();
        registry.destroy_object(id).unwrap();
        assert!(registry.is_retired(id));

        registry.set_next_object_id(u32::MAX);
        assert_eq!(registry.create_object(&[]).unwrap(), ObjectId::new(u32::MAX));
        // Wraps past zero and the retired id.
        assert_eq!(registry.create_object(&[]).unwrap(), ObjectId::new(2));

        registry.update_send_data();
        assert!(!registry.connection(conn).unwrap().knows(id));
        assert!(!registry.is_retired(id));
    }

    #[test]
    fn destroy_unknown_object_is_error() {
        let mut registry = registry();
        let err = registry.destroy_object(ObjectId::new(5)).unwrap_err();
        assert_eq!(
            err,
            ReplicaError::UnknownObject {
                id: ObjectId::new(5)
            }
        );
    }

    #[test]
    fn double_destroy_is_error() {
        let mut registry = registry();
        let id = registry.create_object(&[]).unwrap();
        registry.destroy_object(id).unwrap();
        assert!(registry.destroy_object(id).is_err());
    }

    #[test]
    fn unknown_connection_is_error() {
        let mut registry = registry();
        let err = registry.destroy_connection(ConnectionId(3)).unwrap_err();
        assert_eq!(err, ReplicaError::UnknownConnection { id: ConnectionId(3) });
    }

    #[test]
    fn destroy_before_any_pass_retires_nothing() {
        let mut registry = registry();
        registry.create_connection();
        let id = registry.create_object(&[]).unwrap();
        registry.destroy_object(id).unwrap();
        assert!(!registry.is_retired(id));
        let stats = registry.update_send_data();
        assert_eq!(stats.creates + stats.deletes, 0);
    }

    #[test]
    fn closing_last_connection_releases_retired_ids() {
        let mut registry = registry();
        let conn = registry.create_connection();
        let id = registry.create_object(&[]).unwrap();
        registry.update_send_data();
        registry.destroy_object(id).unwrap();
        assert!(registry.is_retired(id));
        registry.destroy_connection(conn).unwrap();
        assert!(!registry.is_retired(id));
    }

    #[test]
    fn oversized_init_data_rejected() {
        let mut registry = registry();
        let err = registry.create_object(&[0u8; 257]).unwrap_err();
        assert!(matches!(err, ReplicaError::InitDataTooLarge { length: 257, .. }));
        assert_eq!(registry.object_count(), 0);
    }

    #[test]
    fn init_data_must_fit_in_one_message() {
        let mut config = ReplicaConfig::for_testing();
        config.limits = Limits {
            max_message_bytes: 64,
            max_records: 8,
            max_payload_len: 256,
        };
        let mut registry = ReplicaRegistry::new(config);
        let err = registry.create_object(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, ReplicaError::CreateTooLarge { max: 64, .. }));
        assert_eq!(registry.object_count(), 0);

        let conn = registry.create_connection();
        let id = registry.create_object(&[0u8; 30]).unwrap();
        let stats = registry.update_send_data();
        assert_eq!(stats.creates, 1);
        assert!(registry.connection(conn).unwrap().knows(id));
    }

    #[test]
    fn created_objects_are_local_authority() {
        let mut registry = registry();
        let id = registry.create_object(&[9]).unwrap();
        let object = registry.object(id).unwrap();
        assert!(object.is_authority());
        assert_eq!(object.init_data(), &[9]);
        assert!(object.sync_data().is_empty());
    }

    #[test]
    fn stats_accumulate_across_connections() {
        let mut registry = registry();
        registry.create_connection();
        registry.create_connection();
        registry.create_object(&[]).unwrap();
        let stats = registry.update_send_data();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.creates, 2);
        assert_eq!(registry.passes(), 1);
    }
}
