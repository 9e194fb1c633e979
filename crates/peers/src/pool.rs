//! The connection pool and inbound frame dispatch

use std::collections::HashMap;
use std::time::Instant;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use veilmesh_core::{
    now_millis, DirectPayload, Frame, FrameBody, GossipContent, NodeId, NodeRecord, PeerSettings,
    PeerStatus, PublicKey, Result, VeilMeshError, NODE_ID_LEN,
};
use veilmesh_crypto::hash;
use veilmesh_dht::{KeyValueStore, RoutingTable};

use crate::peer::Peer;
use crate::seen::SeenCache;
use crate::transport::Transport;

/// Inbound work the pool cannot finish on its own; the orchestrator acts on
/// these outside the pool's lock.
#[derive(Debug)]
pub enum PoolEvent {
    Direct { from: NodeId, content: DirectPayload },
    Gossip { from: NodeId, content: GossipContent },
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub total_peers: usize,
    pub connected_peers: usize,
    pub dht_records: usize,
    pub stored_keys: usize,
    pub pending_requests: usize,
}

enum Pending {
    Nodes(oneshot::Sender<Vec<NodeRecord>>),
    Value(oneshot::Sender<Option<serde_json::Value>>),
}

struct PendingEntry {
    pending: Pending,
    created_at: Instant,
}

/// Owns every peer channel, the DHT state, and gossip de-duplication.
///
/// All mutation funnels through `&mut self`, so a caller wrapping the pool
/// in a single lock linearizes the heartbeat tick against inbound frames.
pub struct PeerPool<T: Transport> {
    node_id: NodeId,
    settings: PeerSettings,
    transport: T,
    peers: HashMap<NodeId, Peer>,
    routing: RoutingTable,
    store: KeyValueStore,
    seen: SeenCache,
    pending: HashMap<Uuid, PendingEntry>,
}

impl<T: Transport> PeerPool<T> {
    pub fn new(node_id: NodeId, transport: T, settings: PeerSettings) -> Self {
        let routing = RoutingTable::new(node_id, settings.dht_k);
        let store = KeyValueStore::new(settings.store_ttl());
        info!(%node_id, "peer pool initialized");
        Self {
            node_id,
            settings,
            transport,
            peers: HashMap::new(),
            routing,
            store,
            seen: SeenCache::default(),
            pending: HashMap::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn is_connected(&self, id: &NodeId) -> bool {
        self.peers.get(id).map(Peer::is_connected).unwrap_or(false)
    }

    pub fn connected_peers(&self) -> Vec<NodeId> {
        self.peers
            .values()
            .filter(|p| p.is_connected())
            .map(|p| p.id)
            .collect()
    }

    pub fn peer(&self, id: &NodeId) -> Option<&Peer> {
        self.peers.get(id)
    }

    /// Begin connecting to a peer. Returns `true` when a live channel
    /// already exists or a connection attempt was started. A `Disconnected`
    /// peer is re-dialed.
    pub fn connect_to_peer(
        &mut self,
        id: NodeId,
        public_key: Option<PublicKey>,
        address: Option<String>,
    ) -> bool {
        if id == self.node_id {
            return false;
        }
        match self.peers.get(&id) {
            Some(peer) if peer.status != PeerStatus::Disconnected => return true,
            Some(_) => {}
            None => {
                if self.peers.len() >= self.settings.max_peers {
                    warn!(peer = %id, max = self.settings.max_peers, "peer cap reached, refusing connection");
                    return false;
                }
            }
        }

        if let Err(err) = self.transport.connect(&id, address.as_deref()) {
            warn!(peer = %id, %err, "connection attempt failed");
            return false;
        }
        let peer = self
            .peers
            .entry(id)
            .or_insert_with(|| Peer::new(id, public_key, address));
        peer.status = PeerStatus::Connecting;
        peer.touch();
        true
    }

    /// The transport finished its handshake with `id`.
    pub fn connection_opened(&mut self, id: NodeId) {
        let peer = self
            .peers
            .entry(id)
            .or_insert_with(|| Peer::new(id, None, None));
        peer.status = PeerStatus::Connected;
        peer.touch();
        let record = NodeRecord {
            id,
            public_key: peer.public_key,
            address: peer.address.clone(),
        };
        self.routing.add(record);
        debug!(peer = %id, "peer connected");
    }

    /// The transport lost its channel to `id`. The record stays, marked
    /// `Disconnected`, until the timeout sweep evicts it; a reconnect in the
    /// meantime reuses it.
    pub fn connection_closed(&mut self, id: &NodeId) {
        if let Some(peer) = self.peers.get_mut(id) {
            peer.status = PeerStatus::Disconnected;
            debug!(peer = %id, "peer disconnected");
        }
    }

    /// Stamp `body` and transmit it to one connected peer. Returns the
    /// frame id on success.
    pub fn send_to_peer(&mut self, id: &NodeId, body: FrameBody) -> Result<Uuid> {
        let peer = self
            .peers
            .get_mut(id)
            .ok_or_else(|| VeilMeshError::PeerNotFound(id.to_string()))?;
        if !peer.is_connected() {
            return Err(VeilMeshError::PeerNotConnected(id.to_string()));
        }

        let frame = Frame::stamp(self.node_id, body);
        let bytes = frame.to_bytes()?;
        self.transport
            .send(id, &bytes)
            .map_err(|_| VeilMeshError::PeerNotConnected(id.to_string()))?;
        peer.messages_sent += 1;
        Ok(frame.id)
    }

    /// Flood `content` to every connected peer outside `exclude`. Receivers
    /// re-gossip with `ttl - 1` until the hop budget runs out. Returns the
    /// number of peers reached directly.
    pub fn gossip(&mut self, content: GossipContent, ttl: u8, exclude: &[NodeId]) -> usize {
        let gossip_id = Uuid::new_v4();
        self.seen.insert(gossip_id);
        self.flood(gossip_id, content, ttl, exclude)
    }

    fn flood(&mut self, gossip_id: Uuid, content: GossipContent, ttl: u8, exclude: &[NodeId]) -> usize {
        let targets: Vec<NodeId> = self
            .connected_peers()
            .into_iter()
            .filter(|id| !exclude.contains(id))
            .collect();

        let mut sent = 0;
        for target in targets {
            let body = FrameBody::Gossip {
                gossip_id,
                content: content.clone(),
                ttl,
                exclude: exclude.to_vec(),
            };
            if self.send_to_peer(&target, body).is_ok() {
                sent += 1;
            }
        }
        trace!(%gossip_id, ttl, sent, "gossip flooded");
        sent
    }

    /// Issue a correlated `find_node` query to every connected peer. The
    /// receiver resolves with the first response, or closes if no answer
    /// arrives within the request timeout.
    pub fn find_node(&mut self, target: NodeId) -> oneshot::Receiver<Vec<NodeRecord>> {
        let (tx, rx) = oneshot::channel();
        let request_id = Uuid::new_v4();
        self.pending.insert(
            request_id,
            PendingEntry {
                pending: Pending::Nodes(tx),
                created_at: Instant::now(),
            },
        );
        for peer in self.connected_peers() {
            let _ = self.send_to_peer(&peer, FrameBody::FindNode { request_id, target });
        }
        rx
    }

    /// Store a value locally and replicate it to the connected peers closest
    /// to the key.
    pub fn store_value(&mut self, key: String, value: serde_json::Value) {
        self.store.put(key.clone(), value.clone());
        for record in self.replication_targets(&key) {
            let _ = self.send_to_peer(
                &record.id,
                FrameBody::Store {
                    key: key.clone(),
                    value: value.clone(),
                },
            );
        }
    }

    /// Look a key up. A local hit resolves immediately; otherwise the
    /// closest connected peers are queried and the receiver carries the
    /// first answer.
    pub fn get_value(&mut self, key: &str) -> oneshot::Receiver<Option<serde_json::Value>> {
        let (tx, rx) = oneshot::channel();

        if let Some(value) = self.store.get(key) {
            let _ = tx.send(Some(value));
            return rx;
        }

        let request_id = Uuid::new_v4();
        self.pending.insert(
            request_id,
            PendingEntry {
                pending: Pending::Value(tx),
                created_at: Instant::now(),
            },
        );
        for record in self.replication_targets(key) {
            let _ = self.send_to_peer(
                &record.id,
                FrameBody::Get {
                    request_id,
                    key: key.to_string(),
                },
            );
        }
        rx
    }

    /// Connected peers closest to the id a key hashes to.
    fn replication_targets(&self, key: &str) -> Vec<NodeRecord> {
        let target = NodeId::from_public_key(&hash(key.as_bytes()));
        self.routing
            .find_closest(&target, self.settings.dht_k)
            .into_iter()
            .filter(|r| self.is_connected(&r.id))
            .collect()
    }

    /// One liveness pass: heartbeat every connected peer, evict the silent
    /// ones, sweep expired state, and trigger discovery when the pool runs
    /// low. Returns the evicted peer ids.
    pub fn heartbeat_tick(&mut self) -> Vec<NodeId> {
        for peer in self.connected_peers() {
            let _ = self.send_to_peer(
                &peer,
                FrameBody::Heartbeat {
                    sent_at: now_millis(),
                },
            );
        }

        let timeout = self.settings.peer_timeout();
        let evicted: Vec<NodeId> = self
            .peers
            .values()
            .filter(|p| p.last_seen.elapsed() > timeout)
            .map(|p| p.id)
            .collect();
        for id in &evicted {
            self.peers.remove(id);
            self.routing.remove(id);
            info!(peer = %id, "evicted silent peer");
        }

        self.store.prune_expired();
        self.expire_pending();

        if self.connected_peers().len() < self.settings.min_peers {
            self.discover_peers();
        }
        evicted
    }

    /// Ask whoever is connected for peers near a random point in the id
    /// space. Responses are merged into the routing table as they arrive.
    pub fn discover_peers(&mut self) {
        let mut bytes = [0u8; NODE_ID_LEN];
        OsRng.fill_bytes(&mut bytes);
        let target = NodeId::from_bytes(bytes);
        let request_id = Uuid::new_v4();
        debug!(%target, "discovering peers");
        for peer in self.connected_peers() {
            let _ = self.send_to_peer(&peer, FrameBody::FindNode { request_id, target });
        }
    }

    fn expire_pending(&mut self) {
        let timeout = self.settings.request_timeout();
        // Dropping the entry closes its channel; the caller sees a timeout
        self.pending.retain(|_, e| e.created_at.elapsed() < timeout);
    }

    /// Parse and dispatch one inbound frame. Malformed or duplicate frames
    /// are dropped; protocol errors never escape this boundary.
    pub fn handle_frame(&mut self, bytes: &[u8]) -> Option<PoolEvent> {
        let frame = match Frame::from_bytes(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "dropping malformed frame");
                return None;
            }
        };
        if frame.from == self.node_id {
            return None;
        }
        if !self.seen.insert(frame.id) {
            return None;
        }

        if let Some(peer) = self.peers.get_mut(&frame.from) {
            peer.touch();
            peer.messages_received += 1;
        }

        let from = frame.from;
        match frame.body {
            FrameBody::Heartbeat { sent_at } => {
                let _ = self.send_to_peer(&from, FrameBody::HeartbeatAck { sent_at });
                None
            }
            FrameBody::HeartbeatAck { sent_at } => {
                if let Some(peer) = self.peers.get_mut(&from) {
                    peer.latency_ms = Some(now_millis().saturating_sub(sent_at));
                }
                None
            }
            FrameBody::FindNode { request_id, target } => {
                let nodes = self.routing.find_closest(&target, self.settings.dht_k);
                let _ = self.send_to_peer(&from, FrameBody::FindNodeResponse { request_id, nodes });
                None
            }
            FrameBody::FindNodeResponse { request_id, nodes } => {
                for node in &nodes {
                    self.routing.add(node.clone());
                }
                if let Some(entry) = self.pending.remove(&request_id) {
                    match entry.pending {
                        Pending::Nodes(tx) => {
                            let _ = tx.send(nodes);
                        }
                        other => {
                            // Response kind does not match the request kind
                            warn!(%request_id, "mismatched find_node response");
                            self.pending.insert(
                                request_id,
                                PendingEntry {
                                    pending: other,
                                    created_at: entry.created_at,
                                },
                            );
                        }
                    }
                }
                None
            }
            FrameBody::Store { key, value } => {
                self.store.put(key, value);
                None
            }
            FrameBody::Get { request_id, key } => {
                let value = self.store.get(&key);
                let _ = self.send_to_peer(
                    &from,
                    FrameBody::GetResponse {
                        request_id,
                        key,
                        value,
                    },
                );
                None
            }
            FrameBody::GetResponse {
                request_id, value, ..
            } => {
                if let Some(entry) = self.pending.remove(&request_id) {
                    match entry.pending {
                        Pending::Value(tx) => {
                            let _ = tx.send(value);
                        }
                        other => {
                            warn!(%request_id, "mismatched get response");
                            self.pending.insert(
                                request_id,
                                PendingEntry {
                                    pending: other,
                                    created_at: entry.created_at,
                                },
                            );
                        }
                    }
                }
                None
            }
            FrameBody::Gossip {
                gossip_id,
                content,
                ttl,
                exclude,
            } => {
                if !self.seen.insert(gossip_id) {
                    return None;
                }
                if ttl > 0 {
                    let mut next_exclude = exclude;
                    if !next_exclude.contains(&from) {
                        next_exclude.push(from);
                    }
                    self.flood(gossip_id, content.clone(), ttl - 1, &next_exclude);
                }
                Some(PoolEvent::Gossip { from, content })
            }
            FrameBody::Direct { content } => Some(PoolEvent::Direct { from, content }),
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_peers: self.peers.len(),
            connected_peers: self.connected_peers().len(),
            dht_records: self.routing.len(),
            stored_keys: self.store.len(),
            pending_requests: self.pending.len(),
        }
    }
}
