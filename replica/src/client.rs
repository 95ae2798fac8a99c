//! Receiving side of replication.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, error, warn};
use wire::{decode_message, Limits, RecordKind, WireRecord};

use crate::error::{ReplicaError, ReplicaResult};
use crate::object::{AuthorityRole, NetObject};
use crate::types::ObjectId;

/// Lifecycle change of a remote stand-in, for the game to mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaEvent {
    /// A stand-in was created; its init data is available through
    /// [`ReplicaClient::object`].
    Created(ObjectId),
    /// A stand-in was removed.
    Deleted(ObjectId),
}

/// Outcome of applying one replication message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReceiveStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Records dropped as protocol violations.
    pub ignored: usize,
}

impl ReceiveStats {
    /// Records that changed the mirror.
    #[must_use]
    pub const fn applied(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    pub fn accumulate(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.ignored += other.ignored;
    }
}

/// Mirror of the authority's object set on a receiving peer.
///
/// Stand-ins are created with [`AuthorityRole::Remote`]; their sync data is
/// written only by inbound Update records.
#[derive(Debug, Clone)]
pub struct ReplicaClient {
    limits: Limits,
    objects: BTreeMap<ObjectId, NetObject>,
    local: BTreeSet<ObjectId>,
    events: VecDeque<ReplicaEvent>,
    totals: ReceiveStats,
    rejected_messages: u64,
}

impl Default for ReplicaClient {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl ReplicaClient {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            objects: BTreeMap::new(),
            local: BTreeSet::new(),
            events: VecDeque::new(),
            totals: ReceiveStats::default(),
            rejected_messages: 0,
        }
    }

    /// Applies one replication message.
    ///
    /// The whole message is decoded before any record is applied; a
    /// malformed message returns an error and changes nothing. Records that
    /// violate the lifecycle (duplicate Create, Update or Delete for an
    /// unknown id, Create for a locally owned id) are logged and skipped.
    pub fn receive(&mut self, bytes: &[u8]) -> ReplicaResult<ReceiveStats> {
        let message = match decode_message(bytes, &self.limits) {
            Ok(message) => message,
            Err(err) => {
                self.rejected_messages += 1;
                warn!(%err, len = bytes.len(), "dropping malformed replication message");
                return Err(ReplicaError::Decode(err));
            }
        };

        let mut stats = ReceiveStats::default();
        for record in &message.records {
            self.apply(record, &mut stats);
        }
        self.totals.accumulate(stats);

        debug!(
            records = message.records.len(),
            created = stats.created,
            updated = stats.updated,
            deleted = stats.deleted,
            ignored = stats.ignored,
            "replication message applied"
        );
        Ok(stats)
    }

    fn apply(&mut self, record: &WireRecord<'_>, stats: &mut ReceiveStats) {
        let id = ObjectId::new(record.object_id);
        match record.kind {
            RecordKind::Create => {
                if self.local.contains(&id) {
                    warn!(object = %id, "create for a locally owned object ignored");
                    stats.ignored += 1;
                } else if self.objects.contains_key(&id) {
                    warn!(object = %id, "duplicate create ignored");
                    stats.ignored += 1;
                } else {
                    let object = NetObject::new(
                        id,
                        AuthorityRole::Remote,
                        record.payload.to_vec(),
                        self.limits.clone(),
                    );
                    self.objects.insert(id, object);
                    self.events.push_back(ReplicaEvent::Created(id));
                    stats.created += 1;
                }
            }
            RecordKind::Update => match self.objects.get_mut(&id) {
                Some(object) => {
                    object.apply_remote_sync(record.payload);
                    stats.updated += 1;
                }
                None => {
                    warn!(object = %id, "update for unknown object ignored");
                    stats.ignored += 1;
                }
            },
            RecordKind::Delete => {
                if self.objects.remove(&id).is_some() {
                    self.events.push_back(ReplicaEvent::Deleted(id));
                    stats.deleted += 1;
                } else {
                    warn!(object = %id, "delete for unknown object ignored");
                    stats.ignored += 1;
                }
            }
        }
    }

    /// Pops the oldest pending lifecycle event.
    pub fn poll_event(&mut self) -> Option<ReplicaEvent> {
        self.events.pop_front()
    }

    #[must_use]
    pub fn object(&self, id: ObjectId) -> Option<&NetObject> {
        self.objects.get(&id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut NetObject> {
        self.objects.get_mut(&id)
    }

    /// Remote stand-ins in ascending id order.
    pub fn objects(&self) -> impl Iterator<Item = &NetObject> + '_ {
        self.objects.values()
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Marks `id` as owned by this peer; inbound Creates for it are refused.
    pub fn claim_local(&mut self, id: ObjectId) -> ReplicaResult<()> {
        if let Some(object) = self.objects.get(&id) {
            error!(object = %id, "claiming an object that has a remote stand-in");
            return Err(ReplicaError::AuthorityViolation {
                id,
                role: object.role(),
            });
        }
        self.local.insert(id);
        Ok(())
    }

    /// Releases a claim made with [`claim_local`](Self::claim_local).
    pub fn release_local(&mut self, id: ObjectId) -> bool {
        self.local.remove(&id)
    }

    /// Totals over every applied message.
    #[must_use]
    pub const fn totals(&self) -> ReceiveStats {
        self.totals
    }

    /// Messages rejected as malformed.
    #[must_use]
    pub const fn rejected_messages(&self) -> u64 {
        self.rejected_messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire::MessageWriter;

    fn message(build: impl FnOnce(&mut MessageWriter)) -> Vec<u8> {
        let mut writer = MessageWriter::new(&Limits::for_testing());
        build(&mut writer);
        writer.finish()
    }

    fn client() -> ReplicaClient {
        ReplicaClient::new(Limits::for_testing())
    }

    #[test]
    fn create_update_delete_lifecycle() {
        let mut client = client();
        let stats = client
            .receive(&message(|w| {
                w.push_create(1, &[7]).unwrap();
                w.push_update(1, &[1, 2]).unwrap();
            }))
            .unwrap();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.updated, 1);
        assert_eq!(client.poll_event(), Some(ReplicaEvent::Created(ObjectId::new(1))));
        let object = client.object(ObjectId::new(1)).unwrap();
        assert_eq!(object.role(), AuthorityRole::Remote);
        assert_eq!(object.init_data(), &[7]);
        assert_eq!(object.sync_data(), &[1, 2]);

        client.receive(&message(|w| w.push_delete(1).unwrap())).unwrap();
        assert_eq!(client.poll_event(), Some(ReplicaEvent::Deleted(ObjectId::new(1))));
        assert_eq!(client.poll_event(), None);
        assert!(client.object(ObjectId::new(1)).is_none());
    }

    #[test]
    fn records_after_delete_are_ignored() {
        let mut client = client();
        client
            .receive(&message(|w| {
                w.push_create(3, &[]).unwrap();
                w.push_delete(3).unwrap();
                w.push_update(3, &[1]).unwrap();
                w.push_delete(3).unwrap();
            }))
            .unwrap();
        let totals = client.totals();
        assert_eq!(totals.created, 1);
        assert_eq!(totals.deleted, 1);
        assert_eq!(totals.ignored, 2);
        assert_eq!(client.object_count(), 0);
    }

    #[test]
    fn duplicate_create_keeps_first_init_data() {
        let mut client = client();
        client
            .receive(&message(|w| {
                w.push_create(2, &[1]).unwrap();
                w.push_create(2, &[2]).unwrap();
            }))
            .unwrap();
        assert_eq!(client.totals().ignored, 1);
        assert_eq!(client.object(ObjectId::new(2)).unwrap().init_data(), &[1]);
    }

    #[test]
    fn truncated_message_applies_nothing() {
        let mut client = client();
        let bytes = message(|w| {
            w.push_create(1, &[]).unwrap();
            w.push_create(2, &[5, 5]).unwrap();
        });
        let err = client.receive(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, ReplicaError::Decode(_)));
        assert_eq!(client.object_count(), 0);
        assert_eq!(client.poll_event(), None);
        assert_eq!(client.rejected_messages(), 1);

        client.receive(&bytes).unwrap();
        assert_eq!(client.object_count(), 2);
    }

    #[test]
    fn create_for_claimed_id_is_refused() {
        let mut client = client();
        client.claim_local(ObjectId::new(4)).unwrap();
        let stats = client
            .receive(&message(|w| w.push_create(4, &[]).unwrap()))
            .unwrap();
        assert_eq!(stats.ignored, 1);
        assert!(client.object(ObjectId::new(4)).is_none());

        assert!(client.release_local(ObjectId::new(4)));
        client
            .receive(&message(|w| w.push_create(4, &[]).unwrap()))
            .unwrap();
        assert!(client.object(ObjectId::new(4)).is_some());
    }

    #[test]
    fn claiming_a_stand_in_is_authority_violation() {
        let mut client = client();
        client
            .receive(&message(|w| w.push_create(8, &[]).unwrap()))
            .unwrap();
        let err = client.claim_local(ObjectId::new(8)).unwrap_err();
        assert!(matches!(err, ReplicaError::AuthorityViolation { .. }));
    }

    #[test]
    fn stand_ins_reject_local_writes() {
        let mut client = client();
        client
            .receive(&message(|w| w.push_create(1, &[]).unwrap()))
            .unwrap();
        let object = client.object_mut(ObjectId::new(1)).unwrap();
        assert!(object.set_sync_data(&[1]).is_err());
    }
}
