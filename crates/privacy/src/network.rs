//! The orchestrator: E2E encryption, timing obfuscation, onion dispatch,
//! and cover traffic.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use veilmesh_core::{
    now_millis, DirectPayload, FrameBody, GossipContent, NodeId, OnionPacket, PrivateEnvelope,
    PublicKey, RelayNode, Result, SealedEnvelope, VeilMeshConfig, VeilMeshError,
};
use veilmesh_crypto::{
    open_envelope, seal_envelope, sign_relay_announcement, verify_relay_announcement, Identity,
    PadError, RatchetMessage, SessionError, SessionInit, SessionManager,
};
use veilmesh_onion::{OnionError, OnionRouter, OnionStep};
use veilmesh_peers::{PeerPool, PoolEvent, Transport};

use crate::stats::{OnionStats, P2pStats, PrivacyFlags, PrivacyStats};

type MessageHandler = Box<dyn Fn(NodeId, String) + Send + Sync>;

/// The single entry and exit point host applications use.
///
/// Owns the onion router, the peer pool, and the per-peer ratchet sessions
/// behind async locks, so the background heartbeat and cover-traffic tasks
/// are linearized against inbound frame handling.
pub struct PrivacyNetwork<T: Transport> {
    identity: Identity,
    node_id: NodeId,
    config: VeilMeshConfig,
    onion: Arc<Mutex<OnionRouter>>,
    pool: Arc<Mutex<PeerPool<T>>>,
    sessions: Arc<Mutex<SessionManager>>,
    handlers: Arc<Mutex<Vec<MessageHandler>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: Transport> PrivacyNetwork<T> {
    pub fn new(identity: Identity, transport: T, config: VeilMeshConfig) -> Self {
        let node_id = identity.node_id();
        let onion = OnionRouter::new(identity.clone(), config.onion.clone());
        let pool = PeerPool::new(node_id, transport, config.peers.clone());
        let sessions = SessionManager::new(identity.encryption.clone());
        info!(%node_id, "privacy network initialized");
        Self {
            identity,
            node_id,
            config,
            onion: Arc::new(Mutex::new(onion)),
            pool: Arc::new(Mutex::new(pool)),
            sessions: Arc::new(Mutex::new(sessions)),
            handlers: Arc::new(Mutex::new(Vec::new())),
            tasks: Vec::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.encryption.public_key_bytes()
    }

    /// Spawn the heartbeat and cover-traffic loops.
    pub fn start(&mut self) {
        let pool = Arc::clone(&self.pool);
        let onion = Arc::clone(&self.onion);
        let sessions = Arc::clone(&self.sessions);
        let heartbeat_interval = self.config.peers.heartbeat_interval();
        let session_ttl = self.config.privacy.session_ttl();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            loop {
                ticker.tick().await;
                pool.lock().await.heartbeat_tick();
                onion.lock().await.prune_circuits();
                sessions.lock().await.prune_expired(session_ttl);
            }
        }));

        if self.config.privacy.cover_traffic {
            let pool = Arc::clone(&self.pool);
            let interval = self.config.privacy.cover_traffic_interval();
            let probability = self.config.privacy.cover_traffic_probability;
            let padding_len = self.config.privacy.cover_padding_len;
            self.tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    if OsRng.gen::<f64>() >= probability {
                        continue;
                    }
                    let mut pool = pool.lock().await;
                    let peers = pool.connected_peers();
                    if peers.is_empty() {
                        continue;
                    }
                    let target = peers[OsRng.gen_range(0..peers.len())];
                    let mut padding = vec![0u8; padding_len];
                    OsRng.fill_bytes(&mut padding);
                    let _ = pool.send_to_peer(
                        &target,
                        FrameBody::Direct {
                            content: DirectPayload::CoverTraffic {
                                padding,
                                timestamp: now_millis(),
                            },
                        },
                    );
                    trace!(peer = %target, "emitted cover traffic");
                }
            }));
        }
    }

    /// Stop the background loops. Idempotent.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Register a callback invoked with `(sender, content)` for every
    /// delivered private message. Cover traffic never reaches handlers.
    pub async fn on_message(&self, handler: impl Fn(NodeId, String) + Send + Sync + 'static) {
        self.handlers.lock().await.push(Box::new(handler));
    }

    pub async fn connect_to_peer(
        &self,
        id: NodeId,
        public_key: Option<PublicKey>,
        address: Option<String>,
    ) -> bool {
        self.pool.lock().await.connect_to_peer(id, public_key, address)
    }

    pub async fn connection_opened(&self, id: NodeId) {
        self.pool.lock().await.connection_opened(id);
    }

    pub async fn connection_closed(&self, id: &NodeId) {
        self.pool.lock().await.connection_closed(id);
    }

    /// Volunteer this node as an onion relay: self-register locally and
    /// flood a signed announcement. Returns how many peers the announcement
    /// reached directly.
    pub async fn register_as_relay(&self, address: Option<String>) -> usize {
        let announcement = sign_relay_announcement(&self.identity, address.clone());
        let mut own = RelayNode::new(
            self.node_id,
            self.identity.encryption.public_key_bytes(),
            self.identity.signing.public_key_bytes(),
        );
        own.address = address;
        self.onion.lock().await.register_node(own);

        let ttl = self.config.peers.gossip_ttl;
        self.pool
            .lock()
            .await
            .gossip(GossipContent::RelayAnnouncement(announcement), ttl, &[])
    }

    /// Manually add a relay candidate to the local registry.
    pub async fn register_relay(&self, node: RelayNode) {
        self.onion.lock().await.register_node(node);
    }

    /// Send `message` privately to `recipient`.
    ///
    /// The payload is sealed end-to-end first, held for a random delay, then
    /// either onion-routed (enough eligible relays) or sent directly as a
    /// sealed envelope. The direct path is a logged privacy degradation,
    /// never a silent one.
    pub async fn send_private_message(
        &self,
        recipient: NodeId,
        recipient_pubkey: &PublicKey,
        message: &str,
    ) -> Result<()> {
        let envelope = PrivateEnvelope {
            content: message.to_string(),
            timestamp: now_millis(),
            sender: self.node_id,
        };
        let sealed = seal_envelope(recipient_pubkey, &envelope.to_bytes()?)
            .map_err(|e| VeilMeshError::EncryptionFailed(e.to_string()))?;

        self.obfuscation_delay().await;

        let use_onion = {
            let onion = self.onion.lock().await;
            self.config.privacy.enable_onion_routing
                && onion.eligible_relays(&recipient) >= self.config.privacy.min_relay_nodes
        };

        if use_onion {
            let wrapped = {
                let mut onion = self.onion.lock().await;
                let circuit = onion.create_circuit(recipient, None);
                onion
                    .wrap_message(&sealed.to_bytes()?, &circuit, recipient_pubkey)
                    .map_err(map_onion_err)?
            };
            debug!(circuit = %wrapped.circuit_id, entry = %wrapped.entry_node, "sending onion message");
            self.send_direct(
                wrapped.entry_node,
                DirectPayload::OnionMessage {
                    payload: wrapped.onion,
                },
            )
            .await;
        } else {
            warn!(%recipient, "insufficient relays, falling back to direct encrypted send");
            self.send_direct(recipient, DirectPayload::DirectEncrypted { payload: sealed })
                .await;
        }
        Ok(())
    }

    /// Feed one raw inbound frame from the transport into the overlay.
    pub async fn handle_frame(&self, bytes: &[u8]) {
        let event = self.pool.lock().await.handle_frame(bytes);
        if let Some(event) = event {
            self.handle_pool_event(event).await;
        }
    }

    async fn handle_pool_event(&self, event: PoolEvent) {
        match event {
            PoolEvent::Direct { from, content } => self.handle_direct(from, content).await,
            PoolEvent::Gossip { from, content } => match content {
                GossipContent::RelayAnnouncement(announcement) => {
                    if announcement.node_id == self.node_id {
                        return;
                    }
                    if !verify_relay_announcement(&announcement) {
                        warn!(claimed = %announcement.node_id, "dropping unverifiable relay announcement");
                        return;
                    }
                    let mut node = RelayNode::new(
                        announcement.node_id,
                        announcement.encryption_key,
                        announcement.signing_key,
                    );
                    node.address = announcement.address;
                    self.onion.lock().await.register_node(node);
                }
                GossipContent::Addressed { target, content } => {
                    if target == self.node_id {
                        self.handle_direct(from, *content).await;
                    }
                }
            },
        }
    }

    async fn handle_direct(&self, from: NodeId, content: DirectPayload) {
        match content {
            DirectPayload::OnionMessage { payload } => self.handle_onion(from, payload).await,
            DirectPayload::DirectEncrypted { payload } => self.deliver_envelope(&payload).await,
            DirectPayload::CoverTraffic { .. } => {
                trace!(peer = %from, "discarding cover traffic");
            }
        }
    }

    async fn handle_onion(&self, from: NodeId, packet: OnionPacket) {
        let step = {
            let onion = self.onion.lock().await;
            onion.process_onion(&packet)
        };
        match step {
            Ok(OnionStep::Destination { payload, .. }) => match SealedEnvelope::from_bytes(&payload)
            {
                Ok(envelope) => self.deliver_envelope(&envelope).await,
                Err(err) => warn!(%err, "dropping malformed terminal onion payload"),
            },
            Ok(OnionStep::Relay {
                next_hop,
                circuit_id,
                onion,
            }) => {
                trace!(%circuit_id, %next_hop, "relaying onion layer");
                self.send_direct(next_hop, DirectPayload::OnionMessage { payload: onion })
                    .await;
            }
            Err(err) => {
                // Garbage from a peer must never crash the node
                debug!(peer = %from, %err, "dropping undecryptable onion layer");
            }
        }
    }

    async fn deliver_envelope(&self, envelope: &SealedEnvelope) {
        let secret = self.identity.encryption.secret_key_bytes();
        let plaintext = match open_envelope(&secret, envelope) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(%err, "dropping undecryptable envelope");
                return;
            }
        };
        let private = match PrivateEnvelope::from_bytes(&plaintext) {
            Ok(p) => p,
            Err(err) => {
                warn!(%err, "dropping malformed private envelope");
                return;
            }
        };
        debug!(sender = %private.sender, "delivering private message");
        let handlers = self.handlers.lock().await;
        for handler in handlers.iter() {
            handler(private.sender, private.content.clone());
        }
    }

    /// Send a direct payload, falling back to an addressed gossip flood when
    /// no channel to the target exists.
    async fn send_direct(&self, target: NodeId, content: DirectPayload) {
        let mut pool = self.pool.lock().await;
        let result = pool.send_to_peer(
            &target,
            FrameBody::Direct {
                content: content.clone(),
            },
        );
        if result.is_err() {
            let ttl = self.config.peers.gossip_ttl;
            let reached = pool.gossip(
                GossipContent::Addressed {
                    target,
                    content: Box::new(content),
                },
                ttl,
                &[],
            );
            debug!(%target, reached, "no direct channel, flooded addressed payload");
        }
    }

    async fn obfuscation_delay(&self) {
        let min = self.config.privacy.message_delay_min_ms;
        let max = self.config.privacy.message_delay_max_ms.max(min);
        let delay = OsRng.gen_range(min..=max);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    pub async fn stats(&self) -> PrivacyStats {
        let onion = self.onion.lock().await;
        let pool_stats = self.pool.lock().await.stats();
        PrivacyStats {
            initialized: true,
            node_id: self.node_id.to_string(),
            onion_routing: OnionStats {
                enabled: self.config.privacy.enable_onion_routing,
                active_circuits: onion.active_circuits(),
                known_relays: onion.known_relays(),
            },
            p2p: P2pStats {
                total_peers: pool_stats.total_peers,
                connected_peers: pool_stats.connected_peers,
            },
            privacy: PrivacyFlags {
                cover_traffic: self.config.privacy.cover_traffic,
                timing_obfuscation: true,
                min_relay_nodes: self.config.privacy.min_relay_nodes,
            },
        }
    }

    /// The prekey peers use to initiate a ratchet session with this node.
    pub async fn session_prekey(&self) -> PublicKey {
        self.sessions.lock().await.prekey_public()
    }

    pub async fn start_session(
        &self,
        peer: NodeId,
        their_identity: &PublicKey,
        their_prekey: &PublicKey,
    ) -> SessionInit {
        self.sessions
            .lock()
            .await
            .start_session(peer, their_identity, their_prekey)
    }

    pub async fn accept_session(
        &self,
        peer: NodeId,
        their_identity: &PublicKey,
        their_ephemeral: &PublicKey,
    ) {
        self.sessions
            .lock()
            .await
            .accept_session(peer, their_identity, their_ephemeral);
    }

    pub async fn encrypt_session_message(
        &self,
        peer: &NodeId,
        plaintext: &[u8],
    ) -> std::result::Result<RatchetMessage, SessionError> {
        self.sessions.lock().await.encrypt(peer, plaintext)
    }

    pub async fn decrypt_session_message(
        &self,
        peer: &NodeId,
        message: &RatchetMessage,
    ) -> std::result::Result<Vec<u8>, SessionError> {
        self.sessions.lock().await.decrypt(peer, message)
    }
}

impl<T: Transport> Drop for PrivacyNetwork<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn map_onion_err(err: OnionError) -> VeilMeshError {
    match err {
        OnionError::Padding(PadError::TooLarge { size, target }) => {
            VeilMeshError::PayloadTooLarge { size, target }
        }
        OnionError::Encode(e) => VeilMeshError::LayerEncode(e),
        other => VeilMeshError::EncryptionFailed(other.to_string()),
    }
}
