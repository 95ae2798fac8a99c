//! Per-peer replication state and the record pass.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, trace, warn};
use wire::{record_len, EncodeError, Limits, MessageWriter, RecordKind, HEADER_SIZE};

use crate::config::{ConnectionBudget, ReplicaConfig, UpdatePolicy};
use crate::object::NetObject;
use crate::types::{ConnectionId, ObjectId};

/// Records emitted to one connection by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PassStats {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    /// Creates, updates and deletes held back by the budget or the message size.
    pub deferred: usize,
    /// Size of the send buffer after the pass.
    pub bytes: usize,
}

impl PassStats {
    #[must_use]
    pub const fn records(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

/// Replication state for one connected peer.
///
/// The connection holds object ids only. Its known set changes exactly when a
/// Create or Delete record is written to its buffer, so a record lost in
/// transit is not re-sent.
#[derive(Debug, Clone)]
pub struct ReplicaConnection {
    id: ConnectionId,
    budget: ConnectionBudget,
    known: BTreeSet<ObjectId>,
    sent: BTreeMap<ObjectId, SentUpdate>,
    send_buffer: Vec<u8>,
    last_pass: PassStats,
    passes: u64,
}

/// Last Update written for one known object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SentUpdate {
    revision: u64,
    pass: u64,
}

impl ReplicaConnection {
    pub(crate) fn new(id: ConnectionId, budget: ConnectionBudget) -> Self {
        Self {
            id,
            budget,
            known: BTreeSet::new(),
            sent: BTreeMap::new(),
            send_buffer: Vec::new(),
            last_pass: PassStats::default(),
            passes: 0,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub const fn budget(&self) -> ConnectionBudget {
        self.budget
    }

    pub fn set_budget(&mut self, budget: ConnectionBudget) {
        self.budget = budget;
    }

    /// Returns `true` if the peer has been sent a Create for `id` and no Delete since.
    #[must_use]
    pub fn knows(&self, id: ObjectId) -> bool {
        self.known.contains(&id)
    }

    /// Ids the peer has been told exist, in ascending order.
    pub fn known_objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.known.iter().copied()
    }

    #[must_use]
    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    /// Message built by the last pass. Empty if the pass produced no records.
    #[must_use]
    pub fn send_data(&self) -> &[u8] {
        &self.send_buffer
    }

    #[must_use]
    pub fn send_len(&self) -> usize {
        self.send_buffer.len()
    }

    #[must_use]
    pub const fn last_pass(&self) -> PassStats {
        self.last_pass
    }

    /// Rebuilds the send buffer from the current object set.
    pub(crate) fn build_pass(
        &mut self,
        objects: &BTreeMap<ObjectId, NetObject>,
        config: &ReplicaConfig,
    ) -> PassStats {
        self.send_buffer.clear();
        self.passes += 1;

        let mut pending = PendingRecords::select(self, objects, config);
        let mut stats = PassStats::default();
        let mut writer = MessageWriter::new(&config.limits);

        if let Err(err) = self.write_records(&mut writer, &mut pending, objects, &mut stats) {
            warn!(
                connection = %self.id,
                %err,
                "replication record refused, deferring remaining records"
            );
        }
        stats.deferred = pending.remaining();
        if stats.deferred > 0 {
            debug!(
                connection = %self.id,
                deferred = stats.deferred,
                "records deferred to a later pass"
            );
        }

        if !writer.is_empty() {
            writer.finish_into(&mut self.send_buffer);
        }
        stats.bytes = self.send_buffer.len();
        self.last_pass = stats;

        trace!(
            connection = %self.id,
            creates = stats.creates,
            updates = stats.updates,
            deletes = stats.deletes,
            deferred = stats.deferred,
            bytes = stats.bytes,
            "connection pass"
        );
        stats
    }

    /// Writes the selected records as Creates, then Updates, then Deletes.
    fn write_records(
        &mut self,
        writer: &mut MessageWriter,
        pending: &mut PendingRecords,
        objects: &BTreeMap<ObjectId, NetObject>,
        stats: &mut PassStats,
    ) -> Result<(), EncodeError> {
        while let Some(object) = pending.creates.front().and_then(|id| objects.get(id)) {
            let id = object.id();
            writer.push_create(id.raw(), object.init_data())?;
            pending.creates.pop_front();
            self.known.insert(id);
            self.sent.remove(&id);
            stats.creates += 1;

            if !object.sync_data().is_empty() {
                writer.push_update(id.raw(), object.sync_data())?;
                self.mark_sent(object);
                stats.updates += 1;
            }
        }

        while let Some(object) = pending.updates.front().and_then(|id| objects.get(id)) {
            writer.push_update(object.id().raw(), object.sync_data())?;
            pending.updates.pop_front();
            self.mark_sent(object);
            stats.updates += 1;
        }

        while let Some(&id) = pending.deletes.front() {
            writer.push_delete(id.raw())?;
            pending.deletes.pop_front();
            self.known.remove(&id);
            self.sent.remove(&id);
            stats.deletes += 1;
        }

        Ok(())
    }

    fn mark_sent(&mut self, object: &NetObject) {
        let update = SentUpdate {
            revision: object.revision(),
            pass: self.passes,
        };
        self.sent.insert(object.id(), update);
    }

    fn sent_revision(&self, id: ObjectId) -> Option<u64> {
        self.sent.get(&id).map(|sent| sent.revision)
    }

    fn last_update_pass(&self, id: ObjectId) -> u64 {
        self.sent.get(&id).map_or(0, |sent| sent.pass)
    }
}

/// Space left in the message being planned.
#[derive(Debug, Clone, Copy)]
struct Room {
    bytes: usize,
    records: usize,
}

impl Room {
    fn new(limits: &Limits) -> Self {
        Self {
            bytes: limits.max_message_bytes.saturating_sub(HEADER_SIZE),
            records: limits.max_records,
        }
    }

    fn take(&mut self, bytes: usize, records: usize) -> bool {
        if bytes > self.bytes || records > self.records {
            return false;
        }
        self.bytes -= bytes;
        self.records -= records;
        true
    }
}

/// Records chosen for one pass, each group in ascending id order.
///
/// Selection reserves message space for Deletes first, then Creates, and
/// fills what is left with Updates. A full message therefore delays state
/// refreshes but never lifecycle records.
#[derive(Debug, Default)]
struct PendingRecords {
    /// Live objects the peer does not know.
    creates: VecDeque<ObjectId>,
    /// Known live objects whose sync data is due.
    updates: VecDeque<ObjectId>,
    /// Known objects that are no longer live.
    deletes: VecDeque<ObjectId>,
    /// Due records left out by the budget or the message size.
    deferred: usize,
}

impl PendingRecords {
    fn select(
        connection: &ReplicaConnection,
        objects: &BTreeMap<ObjectId, NetObject>,
        config: &ReplicaConfig,
    ) -> Self {
        let budget = connection.budget;
        let mut room = Room::new(&config.limits);
        let mut pending = Self::default();

        let gone = connection
            .known
            .iter()
            .filter(|id| !objects.contains_key(*id))
            .copied();
        for id in gone {
            let len = record_len(RecordKind::Delete, id.raw(), 0);
            if pending.deletes.len() < budget.max_deletes
                && pending.deferred == 0
                && room.take(len, 1)
            {
                pending.deletes.push_back(id);
            } else {
                pending.deferred += 1;
            }
        }

        let deferred_deletes = pending.deferred;
        let mut due = Vec::new();
        for (id, object) in objects {
            if !connection.known.contains(id) {
                let (len, records) = create_cost(object);
                if pending.creates.len() < budget.max_creates
                    && pending.deferred == deferred_deletes
                    && room.take(len, records)
                {
                    pending.creates.push_back(*id);
                } else {
                    pending.deferred += 1;
                }
                continue;
            }
            if object.sync_data().is_empty() {
                continue;
            }
            let changed = connection.sent_revision(*id) != Some(object.revision());
            if changed || config.policy == UpdatePolicy::EveryPass {
                due.push((!changed, connection.last_update_pass(*id), *id));
            }
        }

        // Changed objects first, then the ones refreshed longest ago, so a
        // budget or a full message rotates through the due set.
        due.sort_unstable();
        let mut updates = Vec::with_capacity(due.len().min(budget.max_updates));
        for (_, _, id) in due {
            let Some(object) = objects.get(&id) else {
                continue;
            };
            let len = record_len(RecordKind::Update, id.raw(), object.sync_data().len());
            if updates.len() < budget.max_updates && room.take(len, 1) {
                updates.push(id);
            } else {
                pending.deferred += 1;
            }
        }
        updates.sort_unstable();
        pending.updates = updates.into();
        pending
    }

    fn remaining(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len() + self.deferred
    }
}

/// Bytes and records for a Create plus its initial Update.
fn create_cost(object: &NetObject) -> (usize, usize) {
    let id = object.id().raw();
    let mut len = record_len(RecordKind::Create, id, object.init_data().len());
    if object.sync_data().is_empty() {
        return (len, 1);
    }
    len += record_len(RecordKind::Update, id, object.sync_data().len());
    (len, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::AuthorityRole;

    fn objects(ids: &[u32]) -> BTreeMap<ObjectId, NetObject> {
        ids.iter()
            .map(|raw| {
                let id = ObjectId::new(*raw);
                let mut object =
                    NetObject::new(id, AuthorityRole::Local, Vec::new(), Limits::for_testing());
                object.set_sync_data(&[1]).unwrap();
                (id, object)
            })
            .collect()
    }

    #[test]
    fn empty_pass_has_empty_buffer() {
        let mut connection = ReplicaConnection::new(ConnectionId(1), ConnectionBudget::unlimited());
        let stats = connection.build_pass(&BTreeMap::new(), &ReplicaConfig::default());
        assert_eq!(stats, PassStats::default());
        assert!(connection.send_data().is_empty());
    }

    #[test]
    fn update_budget_prefers_changed_objects() {
        let budget = ConnectionBudget {
            max_updates: 1,
            ..ConnectionBudget::unlimited()
        };
        let mut connection = ReplicaConnection::new(ConnectionId(1), budget);
        let mut world = objects(&[1, 2, 3]);
        let config = ReplicaConfig::default();
        connection.build_pass(&world, &config);
        assert_eq!(connection.known_len(), 3);

        world
            .get_mut(&ObjectId::new(3))
            .unwrap()
            .set_sync_data(&[2])
            .unwrap();
        let stats = connection.build_pass(&world, &config);
        assert_eq!(stats.updates, 1);
        assert_eq!(stats.deferred, 2);
        assert_eq!(connection.sent_revision(ObjectId::new(3)), Some(2));
    }

    fn large_objects(count: u32) -> BTreeMap<ObjectId, NetObject> {
        (1..=count)
            .map(|raw| {
                let id = ObjectId::new(raw);
                let mut object =
                    NetObject::new(id, AuthorityRole::Local, Vec::new(), Limits::for_testing());
                object.set_sync_data(&[raw as u8; 250]).unwrap();
                (id, object)
            })
            .collect()
    }

    fn warmed_up(world: &BTreeMap<ObjectId, NetObject>) -> ReplicaConnection {
        let mut connection = ReplicaConnection::new(ConnectionId(1), ConnectionBudget::unlimited());
        let config = ReplicaConfig::for_testing();
        for _ in 0..4 {
            connection.build_pass(world, &config);
        }
        assert_eq!(connection.known_len(), world.len());
        connection
    }

    #[test]
    fn full_message_still_carries_creates() {
        let world = large_objects(20);
        let mut connection = ReplicaConnection::new(ConnectionId(1), ConnectionBudget::unlimited());
        let config = ReplicaConfig::for_testing();

        let first = connection.build_pass(&world, &config);
        assert_eq!(first.creates, 15);
        assert_eq!(first.updates, 15);
        assert_eq!(first.deferred, 5);
        assert!(first.bytes <= config.limits.max_message_bytes);

        let second = connection.build_pass(&world, &config);
        assert_eq!(second.creates, 5);
        assert_eq!(connection.known_len(), 20);
    }

    #[test]
    fn delete_is_written_while_updates_fill_the_message() {
        let mut world = large_objects(20);
        let mut connection = warmed_up(&world);
        let config = ReplicaConfig::for_testing();

        world.remove(&ObjectId::new(1));
        let stats = connection.build_pass(&world, &config);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.updates, 16);
        assert_eq!(stats.deferred, 3);
        assert!(!connection.knows(ObjectId::new(1)));
        assert!(connection.send_len() <= config.limits.max_message_bytes);
    }

    #[test]
    fn updates_rotate_when_the_message_is_full() {
        let world = large_objects(20);
        let mut connection = warmed_up(&world);
        let config = ReplicaConfig::for_testing();

        let before = connection.passes;
        for _ in 0..2 {
            let stats = connection.build_pass(&world, &config);
            assert_eq!(stats.updates, 16);
            assert_eq!(stats.deferred, 4);
        }
        for id in world.keys() {
            assert!(connection.last_update_pass(*id) > before, "{id} starved");
        }
    }

    #[test]
    fn delete_budget_keeps_ids_known_until_sent() {
        let budget = ConnectionBudget {
            max_deletes: 1,
            ..ConnectionBudget::unlimited()
        };
        let mut connection = ReplicaConnection::new(ConnectionId(1), budget);
        let config = ReplicaConfig::default();
        connection.build_pass(&objects(&[1, 2]), &config);

        let stats = connection.build_pass(&BTreeMap::new(), &config);
        assert_eq!(stats.deletes, 1);
        assert!(!connection.knows(ObjectId::new(1)));
        assert!(connection.knows(ObjectId::new(2)));

        connection.build_pass(&BTreeMap::new(), &config);
        assert_eq!(connection.known_len(), 0);
    }
}
