//! Transport contract and an in-memory loopback implementation.
//!
//! Replication never talks to sockets. The game loop drains a [`Transport`]
//! once per tick, feeds replication messages to the registry or client, and
//! flushes queued sends with a single [`Transport::send_all`].

use std::collections::BTreeMap;
use std::fmt;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info};
use wire::MessageId;

/// Transport-level peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerId(pub u64);

impl PeerId {
    /// Address of the hub as seen from its peers.
    pub const SERVER: Self = Self(0);
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer{}", self.0)
    }
}

/// Inbound transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    PeerJoined(PeerId),
    PeerLeft(PeerId),
    Message {
        sender: PeerId,
        msg_id: MessageId,
        bytes: Vec<u8>,
    },
}

/// Message transport as seen by the game loop.
pub trait Transport {
    /// Returns the next inbound event; `None` once drained for this tick.
    fn poll(&mut self) -> Option<TransportEvent>;

    /// Queues `bytes` for `to`. Nothing is delivered before [`send_all`](Self::send_all).
    fn queue_send(&mut self, to: PeerId, msg_id: MessageId, bytes: &[u8], reliable: bool);

    /// Flushes every queued message.
    fn send_all(&mut self);
}

/// A message waiting for [`Transport::send_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub to: PeerId,
    pub msg_id: MessageId,
    pub bytes: Vec<u8>,
    pub reliable: bool,
}

type DropFilter = Box<dyn FnMut(&Outgoing) -> bool + Send>;

/// Delivery counters for a loopback endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub delivered: u64,
    pub delivered_bytes: u64,
    pub dropped: u64,
    /// Messages addressed to a peer that was no longer connected.
    pub discarded: u64,
}

/// Server endpoint of an in-process transport.
///
/// Peers are created with [`connect`](Self::connect) and removed with
/// [`disconnect`](Self::disconnect). Each side only sees what the other has
/// flushed with `send_all`.
pub struct LoopbackHub {
    inbox_tx: Sender<TransportEvent>,
    inbox_rx: Receiver<TransportEvent>,
    peers: BTreeMap<PeerId, Sender<TransportEvent>>,
    outbox: Vec<Outgoing>,
    next_peer: u64,
    drop_filter: Option<DropFilter>,
    stats: LinkStats,
}

impl fmt::Debug for LoopbackHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackHub")
            .field("peers", &self.peers.keys().collect::<Vec<_>>())
            .field("queued", &self.outbox.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackHub {
    #[must_use]
    pub fn new() -> Self {
        let (inbox_tx, inbox_rx) = unbounded();
        Self {
            inbox_tx,
            inbox_rx,
            peers: BTreeMap::new(),
            outbox: Vec::new(),
            next_peer: 1,
            drop_filter: None,
            stats: LinkStats::default(),
        }
    }

    /// Connects a new peer. The hub sees `PeerJoined` on its next poll.
    pub fn connect(&mut self) -> LoopbackPeer {
        let peer = PeerId(self.next_peer);
        self.next_peer += 1;

        let (peer_tx, peer_rx) = unbounded();
        self.peers.insert(peer, peer_tx);
        self.notify(TransportEvent::PeerJoined(peer));
        info!(%peer, "loopback peer connected");

        LoopbackPeer {
            id: peer,
            hub_tx: self.inbox_tx.clone(),
            inbox_rx: peer_rx,
            outbox: Vec::new(),
            connected: true,
            stats: LinkStats::default(),
        }
    }

    /// Disconnects a peer. The hub sees `PeerLeft`, and so does the peer.
    ///
    /// Messages already queued for the peer are discarded on the next flush.
    pub fn disconnect(&mut self, peer: PeerId) -> bool {
        let Some(peer_tx) = self.peers.remove(&peer) else {
            return false;
        };
        if peer_tx.send(TransportEvent::PeerLeft(PeerId::SERVER)).is_err() {
            debug!(%peer, "peer endpoint already dropped");
        }
        self.notify(TransportEvent::PeerLeft(peer));
        info!(%peer, "loopback peer disconnected");
        true
    }

    fn notify(&self, event: TransportEvent) {
        if let Err(err) = self.inbox_tx.send(event) {
            debug!(event = ?err.into_inner(), "hub inbox closed");
        }
    }

    /// Installs a filter that drops every outgoing message it returns `true` for.
    pub fn set_drop_filter(&mut self, filter: impl FnMut(&Outgoing) -> bool + Send + 'static) {
        self.drop_filter = Some(Box::new(filter));
    }

    pub fn clear_drop_filter(&mut self) {
        self.drop_filter = None;
    }

    #[must_use]
    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.peers.contains_key(&peer)
    }

    /// Connected peers in ascending order.
    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.keys().copied()
    }

    #[must_use]
    pub const fn stats(&self) -> LinkStats {
        self.stats
    }
}

impl Transport for LoopbackHub {
    fn poll(&mut self) -> Option<TransportEvent> {
        while let Ok(event) = self.inbox_rx.try_recv() {
            // Traffic a peer flushed before its disconnect was processed.
            if let TransportEvent::Message { sender, .. } = &event {
                if !self.peers.contains_key(sender) {
                    debug!(peer = %sender, "discarding message from departed peer");
                    continue;
                }
            }
            return Some(event);
        }
        None
    }

    fn queue_send(&mut self, to: PeerId, msg_id: MessageId, bytes: &[u8], reliable: bool) {
        self.outbox.push(Outgoing {
            to,
            msg_id,
            bytes: bytes.to_vec(),
            reliable,
        });
    }

    fn send_all(&mut self) {
        for outgoing in self.outbox.drain(..) {
            if let Some(filter) = self.drop_filter.as_mut() {
                if filter(&outgoing) {
                    self.stats.dropped += 1;
                    continue;
                }
            }
            let Some(peer_tx) = self.peers.get(&outgoing.to) else {
                debug!(
                    peer = %outgoing.to,
                    msg = %outgoing.msg_id,
                    "discarding message for departed peer"
                );
                self.stats.discarded += 1;
                continue;
            };
            let len = outgoing.bytes.len() as u64;
            let event = TransportEvent::Message {
                sender: PeerId::SERVER,
                msg_id: outgoing.msg_id,
                bytes: outgoing.bytes,
            };
            if peer_tx.send(event).is_err() {
                debug!(peer = %outgoing.to, "peer endpoint dropped, discarding message");
                self.stats.discarded += 1;
                continue;
            }
            self.stats.delivered += 1;
            self.stats.delivered_bytes += len;
        }
    }
}

/// Client endpoint of a [`LoopbackHub`].
#[derive(Debug)]
pub struct LoopbackPeer {
    id: PeerId,
    hub_tx: Sender<TransportEvent>,
    inbox_rx: Receiver<TransportEvent>,
    outbox: Vec<Outgoing>,
    connected: bool,
    stats: LinkStats,
}

impl LoopbackPeer {
    /// This peer's address as seen by the hub.
    #[must_use]
    pub const fn id(&self) -> PeerId {
        self.id
    }

    /// `false` once the hub's `PeerLeft` has been polled.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    #[must_use]
    pub const fn stats(&self) -> LinkStats {
        self.stats
    }
}

impl Transport for LoopbackPeer {
    fn poll(&mut self) -> Option<TransportEvent> {
        let event = self.inbox_rx.try_recv().ok()?;
        if matches!(event, TransportEvent::PeerLeft(_)) {
            self.connected = false;
        }
        Some(event)
    }

    fn queue_send(&mut self, to: PeerId, msg_id: MessageId, bytes: &[u8], reliable: bool) {
        self.outbox.push(Outgoing {
            to,
            msg_id,
            bytes: bytes.to_vec(),
            reliable,
        });
    }

    fn send_all(&mut self) {
        for outgoing in self.outbox.drain(..) {
            if !self.connected || outgoing.to != PeerId::SERVER {
                self.stats.discarded += 1;
                continue;
            }
            let len = outgoing.bytes.len() as u64;
            let event = TransportEvent::Message {
                sender: self.id,
                msg_id: outgoing.msg_id,
                bytes: outgoing.bytes,
            };
            if self.hub_tx.send(event).is_err() {
                debug!(peer = %self.id, "hub dropped, discarding message");
                self.stats.discarded += 1;
                continue;
            }
            self.stats.delivered += 1;
            self.stats.delivered_bytes += len;
        }
    }
}
