//! Receiving side of the demo.

use std::collections::BTreeMap;

use replica::transport::{LoopbackPeer, PeerId, Transport, TransportEvent};
use replica::{Limits, ObjectId, ReceiveStats, ReplicaClient, ReplicaEvent};
use tracing::{debug, warn};

use crate::game::GameObject;

/// What one client tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientTick {
    pub messages: usize,
    pub bytes: usize,
    pub rejected: usize,
    pub records: ReceiveStats,
    /// Objects whose received state failed to decode and kept their last values.
    pub stale: usize,
}

/// A connected peer mirroring the server's objects.
#[derive(Debug)]
pub struct ClientSim {
    peer: LoopbackPeer,
    replica: ReplicaClient,
    objects: BTreeMap<ObjectId, GameObject>,
}

impl ClientSim {
    #[must_use]
    pub fn new(peer: LoopbackPeer, limits: Limits) -> Self {
        Self {
            peer,
            replica: ReplicaClient::new(limits),
            objects: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn peer_id(&self) -> PeerId {
        self.peer.id()
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.peer.is_connected()
    }

    #[must_use]
    pub const fn replica(&self) -> &ReplicaClient {
        &self.replica
    }

    #[must_use]
    pub const fn objects(&self) -> &BTreeMap<ObjectId, GameObject> {
        &self.objects
    }

    /// Applies every pending message, mirrors lifecycle events and copies
    /// received state into the local game objects.
    ///
    /// A rejected message or an object whose state fails to decode is logged
    /// and counted; neither stops the tick.
    pub fn tick(&mut self) -> ClientTick {
        let mut report = ClientTick::default();

        while let Some(event) = self.peer.poll() {
            let TransportEvent::Message { msg_id, bytes, .. } = event else {
                continue;
            };
            if !msg_id.is_replication() {
                debug!(peer = %self.peer.id(), msg = %msg_id, "ignoring message");
                continue;
            }
            report.messages += 1;
            report.bytes += bytes.len();
            match self.replica.receive(&bytes) {
                Ok(stats) => report.records.accumulate(stats),
                Err(err) => {
                    warn!(peer = %self.peer.id(), %err, "dropping replication message");
                    report.rejected += 1;
                }
            }
        }

        while let Some(event) = self.replica.poll_event() {
            match event {
                ReplicaEvent::Created(id) => {
                    self.objects.insert(id, GameObject::remote(id));
                }
                ReplicaEvent::Deleted(id) => {
                    self.objects.remove(&id);
                }
            }
        }

        for (id, object) in &mut self.objects {
            let Some(net) = self.replica.object_mut(*id) else {
                continue;
            };
            if let Err(err) = net.tick(object) {
                warn!(
                    peer = %self.peer.id(),
                    object = %id,
                    %err,
                    "keeping last good object state"
                );
                report.stale += 1;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use replica::transport::LoopbackHub;
    use replica::{MessageId, ReplicaConfig, ReplicaRegistry};

    use super::*;
    use crate::game::GREEN;
    use crate::rng::Rng;
    use crate::server::{ServerSim, LEVEL_OBJECTS};

    #[test]
    fn client_mirrors_level_after_one_round_trip() {
        let mut server = ServerSim::new(ReplicaConfig::default(), 5).unwrap();
        let mut client = server.connect_client();
        server.tick().unwrap();
        let report = client.tick();

        assert_eq!(report.messages, 1);
        assert_eq!(report.records.created, LEVEL_OBJECTS + 1);
        assert_eq!(client.objects().len(), LEVEL_OBJECTS + 1);
        for object in server.objects() {
            let mirrored = &client.objects()[&object.net_id];
            assert_eq!(mirrored.pos, object.pos);
            assert_eq!(mirrored.radius, object.radius);
            assert_eq!(mirrored.color, object.color);
        }
    }

    #[test]
    fn undecodable_state_is_skipped_per_object() {
        let mut hub = LoopbackHub::new();
        let mut client = ClientSim::new(hub.connect(), Limits::default());

        let mut registry = ReplicaRegistry::new(ReplicaConfig::default());
        let conn = registry.create_connection();
        let short = registry.create_object(&[]).unwrap();
        registry.object_mut(short).unwrap().set_sync_data(&[0; 4]).unwrap();
        let id = registry.create_object(&[]).unwrap();
        let mut good = GameObject::spawn(id, GREEN, &mut Rng::new(1));
        registry.object_mut(id).unwrap().tick(&mut good).unwrap();
        registry.update_send_data();
        let bytes = registry.connection(conn).unwrap().send_data().to_vec();
        hub.queue_send(client.peer_id(), MessageId::REPLICA_INFO, &bytes, true);
        hub.send_all();

        for _ in 0..2 {
            let report = client.tick();
            assert_eq!(report.stale, 1);
        }
        assert_eq!(client.objects()[&short], GameObject::remote(short));
        assert_eq!(client.objects()[&id].pos, good.pos);
        assert_eq!(client.objects()[&id].color, good.color);
    }

    #[test]
    fn nothing_arrives_before_server_ticks() {
        let mut server = ServerSim::new(ReplicaConfig::default(), 5).unwrap();
        let mut client = server.connect_client();
        let report = client.tick();
        assert_eq!(report.messages, 0);
        assert!(client.objects().is_empty());
    }
}
