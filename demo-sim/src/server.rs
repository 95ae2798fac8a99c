//! Authoritative side of the demo.

use std::collections::BTreeMap;

use replica::transport::{LoopbackHub, Outgoing, PeerId, Transport, TransportEvent};
use replica::{
    ConnectionId, Limits, MessageId, ReplicaConfig, ReplicaRegistry, ReplicaResult, SendStats,
};
use tracing::{debug, info};

use crate::client::ClientSim;
use crate::game::{GameObject, GREEN, GREY};
use crate::rng::Rng;

/// Number of static objects spawned with the level.
pub const LEVEL_OBJECTS: usize = 3;

/// Distance a player object may drift per tick.
const WANDER_STEP: f32 = 0.25;

/// One replication message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub peer: PeerId,
    pub bytes: Vec<u8>,
}

/// What one server tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerTick {
    pub joined: usize,
    pub left: usize,
    pub reaped: usize,
    pub send: SendStats,
    pub messages: Vec<SentMessage>,
}

/// Server: owns the registry, the game objects and the hub end of the transport.
#[derive(Debug)]
pub struct ServerSim {
    hub: LoopbackHub,
    registry: ReplicaRegistry,
    connections: BTreeMap<PeerId, ConnectionId>,
    objects: Vec<GameObject>,
    rng: Rng,
    limits: Limits,
}

impl ServerSim {
    /// Creates the server and loads the level objects.
    pub fn new(config: ReplicaConfig, seed: u64) -> ReplicaResult<Self> {
        let limits = config.limits.clone();
        let mut server = Self {
            hub: LoopbackHub::new(),
            registry: ReplicaRegistry::new(config),
            connections: BTreeMap::new(),
            objects: Vec::new(),
            rng: Rng::new(seed),
            limits,
        };
        for _ in 0..LEVEL_OBJECTS {
            server.spawn(GREY, None)?;
        }
        Ok(server)
    }

    fn spawn(&mut self, color: [f32; 3], player: Option<PeerId>) -> ReplicaResult<()> {
        let id = self.registry.create_object(&[])?;
        let mut object = GameObject::spawn(id, color, &mut self.rng);
        object.player = player;
        self.objects.push(object);
        Ok(())
    }

    /// Connects a new client over the loopback transport.
    ///
    /// The server notices the join on its next tick.
    pub fn connect_client(&mut self) -> ClientSim {
        ClientSim::new(self.hub.connect(), self.limits.clone())
    }

    /// Drops a client's link. The server notices on its next tick.
    pub fn disconnect_client(&mut self, peer: PeerId) -> bool {
        self.hub.disconnect(peer)
    }

    /// Drops every outgoing message the filter returns `true` for.
    pub fn set_drop_filter(&mut self, filter: impl FnMut(&Outgoing) -> bool + Send + 'static) {
        self.hub.set_drop_filter(filter);
    }

    #[must_use]
    pub const fn registry(&self) -> &ReplicaRegistry {
        &self.registry
    }

    #[must_use]
    pub fn objects(&self) -> &[GameObject] {
        &self.objects
    }

    #[must_use]
    pub const fn hub(&self) -> &LoopbackHub {
        &self.hub
    }

    /// Runs one frame: network receive, object update, reaping, replication, send.
    pub fn tick(&mut self) -> ReplicaResult<ServerTick> {
        let mut report = ServerTick::default();

        while let Some(event) = self.hub.poll() {
            match event {
                TransportEvent::PeerJoined(peer) => {
                    info!(%peer, "player connected");
                    let conn = self.registry.create_connection();
                    self.connections.insert(peer, conn);
                    self.spawn(GREEN, Some(peer))?;
                    report.joined += 1;
                }
                TransportEvent::PeerLeft(peer) => {
                    info!(%peer, "player disconnected");
                    let owned = self.objects.iter_mut().find(|o| o.player == Some(peer));
                    if let Some(object) = owned {
                        object.alive = false;
                    }
                    if let Some(conn) = self.connections.remove(&peer) {
                        self.registry.destroy_connection(conn)?;
                    }
                    report.left += 1;
                }
                TransportEvent::Message { sender, msg_id, .. } => {
                    debug!(peer = %sender, msg = %msg_id, "ignoring client message");
                }
            }
        }

        for object in &mut self.objects {
            if object.player.is_some() {
                object.wander(&mut self.rng, WANDER_STEP);
            }
            if let Some(net) = self.registry.object_mut(object.net_id) {
                net.tick(object)?;
            }
        }

        let mut reaped = Vec::new();
        self.objects.retain(|object| {
            if !object.alive {
                reaped.push(object.net_id);
            }
            object.alive
        });
        for id in reaped {
            self.registry.destroy_object(id)?;
            report.reaped += 1;
        }

        report.send = self.registry.update_send_data();
        for (peer, conn) in &self.connections {
            let Some(connection) = self.registry.connection(*conn) else {
                continue;
            };
            if connection.send_data().is_empty() {
                continue;
            }
            self.hub
                .queue_send(*peer, MessageId::REPLICA_INFO, connection.send_data(), true);
            report.messages.push(SentMessage {
                peer: *peer,
                bytes: connection.send_data().to_vec(),
            });
        }
        self.hub.send_all();

        Ok(report)
    }
}
