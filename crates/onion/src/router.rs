//! Circuit construction, layer wrapping, and single-layer peeling

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use veilmesh_core::{
    now_millis, LayerPayload, LayerPlain, NodeId, OnionPacket, OnionSettings, PublicKey,
    RelayNode, RelayRole,
};
use veilmesh_crypto::{
    decrypt_from, encrypt_to, pad_to_target, unpad, CryptoError, EncryptionKeypair, Identity,
    PadError,
};

use crate::circuit::{Circuit, CircuitStatus};

#[derive(Error, Debug)]
pub enum OnionError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Layer encoding error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("Padding error: {0}")]
    Padding(#[from] PadError),
    #[error("Layer names {next_hop} but carries no forwardable payload")]
    MisroutedLayer { next_hop: NodeId },
    #[error("Terminal layer arrived wrapped in a forward payload")]
    UnexpectedForward,
}

/// A fully wrapped onion ready for transmission to its entry node.
#[derive(Debug, Clone)]
pub struct WrappedOnion {
    pub circuit_id: Uuid,
    pub entry_node: NodeId,
    pub onion: OnionPacket,
}

/// Outcome of peeling one layer of an inbound onion.
#[derive(Debug)]
pub enum OnionStep {
    /// The layer terminated here; `payload` is the unpadded interior
    /// (an end-to-end sealed envelope, still encrypted).
    Destination { circuit_id: Uuid, payload: Vec<u8> },
    /// The layer names another node; hand the inner packet on unmodified.
    Relay {
        next_hop: NodeId,
        circuit_id: Uuid,
        onion: OnionPacket,
    },
}

/// Builds and peels onion layers, and tracks relays and circuits.
///
/// Peeling never recurses: a node decrypts exactly the one layer sealed to
/// its key and hands the remainder on, so each hop learns only its immediate
/// predecessor and successor.
pub struct OnionRouter {
    identity: Identity,
    node_id: NodeId,
    settings: OnionSettings,
    relays: HashMap<NodeId, RelayNode>,
    circuits: HashMap<Uuid, Circuit>,
}

impl OnionRouter {
    pub fn new(identity: Identity, settings: OnionSettings) -> Self {
        let node_id = identity.node_id();
        info!(%node_id, "onion router initialized");
        Self {
            identity,
            node_id,
            settings,
            relays: HashMap::new(),
            circuits: HashMap::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Insert or overwrite a relay in the registry.
    pub fn register_node(&mut self, node: RelayNode) {
        debug!(relay = %node.id, role = ?node.role, "registered relay node");
        self.relays.insert(node.id, node);
    }

    pub fn known_relays(&self) -> usize {
        self.relays.len()
    }

    /// Relays usable on a path toward `destination`: not us, not the
    /// destination, reputation above threshold.
    pub fn eligible_relays(&self, destination: &NodeId) -> usize {
        self.relays
            .values()
            .filter(|n| {
                n.id != self.node_id
                    && n.id != *destination
                    && n.reputation > self.settings.reputation_threshold
            })
            .count()
    }

    /// Pick a random relay path of up to `hop_count` hops.
    ///
    /// When fewer eligible relays exist than requested, the path degrades to
    /// whatever is available, down to zero hops. Zero hops means no relay
    /// protection, so the degradation is logged rather than hidden.
    pub fn select_relay_path(&self, destination: &NodeId, hop_count: usize) -> Vec<RelayNode> {
        let mut candidates: Vec<RelayNode> = self
            .relays
            .values()
            .filter(|n| {
                n.id != self.node_id
                    && n.id != *destination
                    && n.reputation > self.settings.reputation_threshold
            })
            .cloned()
            .collect();

        if candidates.len() < hop_count {
            warn!(
                requested = hop_count,
                available = candidates.len(),
                "not enough relay nodes, degrading hop count"
            );
        }

        candidates.shuffle(&mut OsRng);
        candidates.truncate(hop_count);

        let last = candidates.len().saturating_sub(1);
        for (i, node) in candidates.iter_mut().enumerate() {
            node.role = if i == 0 {
                RelayRole::Entry
            } else if i == last {
                RelayRole::Exit
            } else {
                RelayRole::Relay
            };
        }
        candidates
    }

    /// Create a circuit toward `destination`. Nothing is sent yet.
    pub fn create_circuit(&mut self, destination: NodeId, hop_count: Option<usize>) -> Circuit {
        let hops = hop_count
            .unwrap_or(self.settings.min_hops)
            .min(self.settings.max_hops);
        let path = self.select_relay_path(&destination, hops);
        let circuit = Circuit::new(path, destination);
        debug!(circuit = %circuit.id, hops = circuit.hop_count(), "created circuit");
        self.circuits.insert(circuit.id, circuit.clone());
        circuit
    }

    /// Wrap `message` in one layer per relay plus an innermost layer sealed
    /// to the destination, built destination-backward so the outermost layer
    /// belongs to the entry node.
    ///
    /// The message is padded to the configured target first, so every layer
    /// interior has the same size regardless of content.
    pub fn wrap_message(
        &mut self,
        message: &[u8],
        circuit: &Circuit,
        destination_pubkey: &PublicKey,
    ) -> Result<WrappedOnion, OnionError> {
        let padded = pad_to_target(message, self.settings.message_padding)?;

        // Innermost layer: terminal, sealed to the destination itself.
        let mut packet = encrypt_layer(
            &LayerPlain {
                next_hop: circuit.destination,
                circuit_id: circuit.id,
                layer_index: 0,
                payload: LayerPayload::Deliver(padded),
                timestamp: now_millis(),
            },
            destination_pubkey,
        )?;

        // Relay layers, exit backward to entry. Each layer names the node
        // that should receive the packet it carries.
        for (i, hop) in circuit.path.iter().enumerate().rev() {
            let next_hop = circuit
                .path
                .get(i + 1)
                .map(|n| n.id)
                .unwrap_or(circuit.destination);
            packet = encrypt_layer(
                &LayerPlain {
                    next_hop,
                    circuit_id: circuit.id,
                    layer_index: (circuit.path.len() - i) as u8,
                    payload: LayerPayload::Forward(packet),
                    timestamp: now_millis(),
                },
                &hop.public_key,
            )?;
        }

        if let Some(entry) = self.circuits.get_mut(&circuit.id) {
            entry.status = CircuitStatus::Active;
        }

        Ok(WrappedOnion {
            circuit_id: circuit.id,
            entry_node: circuit.entry_node(),
            onion: packet,
        })
    }

    /// Decrypt the one layer sealed to this node's key.
    ///
    /// Fails on authentication mismatch; callers drop the frame rather than
    /// propagate the failure.
    pub fn decrypt_layer(&self, packet: &OnionPacket) -> Result<LayerPlain, OnionError> {
        let plaintext = decrypt_from(
            &packet.ephemeral_pubkey,
            &self.identity.encryption.secret_key_bytes(),
            &packet.ciphertext,
        )?;
        Ok(LayerPlain::from_bytes(&plaintext)?)
    }

    /// Peel exactly one layer and classify the result.
    pub fn process_onion(&self, packet: &OnionPacket) -> Result<OnionStep, OnionError> {
        let layer = self.decrypt_layer(packet)?;

        if layer.next_hop == self.node_id {
            match layer.payload {
                LayerPayload::Deliver(padded) => Ok(OnionStep::Destination {
                    circuit_id: layer.circuit_id,
                    payload: unpad(&padded)?,
                }),
                LayerPayload::Forward(_) => Err(OnionError::UnexpectedForward),
            }
        } else {
            match layer.payload {
                LayerPayload::Forward(inner) => Ok(OnionStep::Relay {
                    next_hop: layer.next_hop,
                    circuit_id: layer.circuit_id,
                    onion: inner,
                }),
                LayerPayload::Deliver(_) => Err(OnionError::MisroutedLayer {
                    next_hop: layer.next_hop,
                }),
            }
        }
    }

    pub fn destroy_circuit(&mut self, circuit_id: &Uuid) -> bool {
        self.circuits.remove(circuit_id).is_some()
    }

    /// Sweep circuits older than the configured TTL. Returns how many were
    /// removed.
    pub fn prune_circuits(&mut self) -> usize {
        let ttl = self.settings.circuit_ttl();
        let before = self.circuits.len();
        self.circuits.retain(|_, c| c.created_at.elapsed() < ttl);
        let removed = before - self.circuits.len();
        if removed > 0 {
            debug!(removed, "pruned expired circuits");
        }
        removed
    }

    pub fn active_circuits(&self) -> usize {
        self.circuits.len()
    }
}

fn encrypt_layer(layer: &LayerPlain, recipient: &PublicKey) -> Result<OnionPacket, OnionError> {
    let ephemeral = EncryptionKeypair::generate();
    let ciphertext = encrypt_to(recipient, &ephemeral.secret_key_bytes(), &layer.to_bytes()?)?;
    Ok(OnionPacket {
        ephemeral_pubkey: ephemeral.public_key_bytes(),
        ciphertext,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(settings: OnionSettings) -> OnionRouter {
        OnionRouter::new(Identity::generate(), settings)
    }

    fn relay_node(identity: &Identity) -> RelayNode {
        RelayNode::new(
            identity.node_id(),
            identity.encryption.public_key_bytes(),
            identity.signing.public_key_bytes(),
        )
    }

    #[test]
    fn test_path_excludes_self_and_destination() {
        let mut sender = router(OnionSettings::default());
        let destination = Identity::generate();

        let mut own = relay_node(&Identity::generate());
        own.id = sender.node_id();
        sender.register_node(own);
        sender.register_node(relay_node(&destination));
        let other = Identity::generate();
        sender.register_node(relay_node(&other));

        let path = sender.select_relay_path(&destination.node_id(), 3);
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].id, other.node_id());
    }

    #[test]
    fn test_path_excludes_low_reputation() {
        let mut sender = router(OnionSettings::default());
        let destination = NodeId::from_bytes([9; 16]);

        let mut bad = relay_node(&Identity::generate());
        bad.reputation = 50;
        sender.register_node(bad);

        assert!(sender.select_relay_path(&destination, 3).is_empty());
        assert_eq!(sender.eligible_relays(&destination), 0);
    }

    #[test]
    fn test_path_roles() {
        let mut sender = router(OnionSettings::default());
        let destination = NodeId::from_bytes([9; 16]);
        for _ in 0..3 {
            sender.register_node(relay_node(&Identity::generate()));
        }

        let path = sender.select_relay_path(&destination, 3);
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].role, RelayRole::Entry);
        assert_eq!(path[1].role, RelayRole::Relay);
        assert_eq!(path[2].role, RelayRole::Exit);
    }

    #[test]
    fn test_create_circuit_clamps_to_max_hops() {
        let mut sender = router(OnionSettings::default());
        let destination = NodeId::from_bytes([9; 16]);
        for _ in 0..10 {
            sender.register_node(relay_node(&Identity::generate()));
        }

        let circuit = sender.create_circuit(destination, Some(8));
        assert_eq!(circuit.hop_count(), 5);
        assert_eq!(sender.active_circuits(), 1);
    }

    #[test]
    fn test_onion_roundtrip_through_three_relays() {
        let mut sender = router(OnionSettings::default());
        let destination = Identity::generate();
        let relays: Vec<Identity> = (0..3).map(|_| Identity::generate()).collect();
        for r in &relays {
            sender.register_node(relay_node(r));
        }

        let circuit = sender.create_circuit(destination.node_id(), None);
        assert_eq!(circuit.hop_count(), 3);

        let message = b"the original payload".to_vec();
        let wrapped = sender
            .wrap_message(&message, &circuit, &destination.encryption.public_key_bytes())
            .unwrap();
        assert_eq!(wrapped.entry_node, circuit.path[0].id);

        // Peel hop by hop in path order
        let mut packet = wrapped.onion;
        for (i, hop) in circuit.path.iter().enumerate() {
            let hop_identity = relays.iter().find(|r| r.node_id() == hop.id).unwrap();
            let hop_router = OnionRouter::new(hop_identity.clone(), OnionSettings::default());
            match hop_router.process_onion(&packet).unwrap() {
                OnionStep::Relay {
                    next_hop,
                    circuit_id,
                    onion,
                } => {
                    assert_eq!(circuit_id, circuit.id);
                    let expected = circuit
                        .path
                        .get(i + 1)
                        .map(|n| n.id)
                        .unwrap_or(circuit.destination);
                    assert_eq!(next_hop, expected);
                    packet = onion;
                }
                OnionStep::Destination { .. } => panic!("relay hop must not terminate"),
            }
        }

        // Final layer terminates at the destination with the original bytes
        let dest_router = OnionRouter::new(destination, OnionSettings::default());
        match dest_router.process_onion(&packet).unwrap() {
            OnionStep::Destination {
                circuit_id,
                payload,
            } => {
                assert_eq!(circuit_id, circuit.id);
                assert_eq!(payload, message);
            }
            OnionStep::Relay { .. } => panic!("destination layer must terminate"),
        }
    }

    #[test]
    fn test_zero_hop_wrap_targets_destination() {
        let mut sender = router(OnionSettings::default());
        let destination = Identity::generate();

        let circuit = sender.create_circuit(destination.node_id(), None);
        assert_eq!(circuit.hop_count(), 0);

        let wrapped = sender
            .wrap_message(b"direct", &circuit, &destination.encryption.public_key_bytes())
            .unwrap();
        assert_eq!(wrapped.entry_node, destination.node_id());

        let dest_router = OnionRouter::new(destination, OnionSettings::default());
        match dest_router.process_onion(&wrapped.onion).unwrap() {
            OnionStep::Destination { payload, .. } => assert_eq!(payload, b"direct"),
            OnionStep::Relay { .. } => panic!("zero-hop onion must terminate"),
        }
    }

    #[test]
    fn test_layer_isolation() {
        let mut sender = router(OnionSettings::default());
        let destination = Identity::generate();
        let relays: Vec<Identity> = (0..3).map(|_| Identity::generate()).collect();
        for r in &relays {
            sender.register_node(relay_node(r));
        }

        let circuit = sender.create_circuit(destination.node_id(), None);
        let wrapped = sender
            .wrap_message(b"secret", &circuit, &destination.encryption.public_key_bytes())
            .unwrap();

        // Only the entry hop can peel the outer layer
        let entry_id = circuit.path[0].id;
        for r in &relays {
            let hop_router = OnionRouter::new(r.clone(), OnionSettings::default());
            let result = hop_router.process_onion(&wrapped.onion);
            if r.node_id() == entry_id {
                assert!(result.is_ok());
            } else {
                assert!(matches!(result, Err(OnionError::Crypto(_))));
            }
        }

        // The entry hop cannot peel the inner layer it forwards
        let entry_identity = relays.iter().find(|r| r.node_id() == entry_id).unwrap();
        let entry_router = OnionRouter::new(entry_identity.clone(), OnionSettings::default());
        if let OnionStep::Relay { onion, .. } = entry_router.process_onion(&wrapped.onion).unwrap()
        {
            assert!(entry_router.process_onion(&onion).is_err());
        } else {
            panic!("entry hop must relay");
        }
    }

    #[test]
    fn test_oversized_message_rejected() {
        let mut sender = router(OnionSettings::default());
        let destination = Identity::generate();
        let circuit = sender.create_circuit(destination.node_id(), None);

        let too_big = vec![0u8; 2000];
        let result = sender.wrap_message(
            &too_big,
            &circuit,
            &destination.encryption.public_key_bytes(),
        );
        assert!(matches!(result, Err(OnionError::Padding(_))));
    }

    #[test]
    fn test_destroy_and_prune_circuits() {
        let mut sender = router(OnionSettings {
            circuit_ttl_secs: 0,
            ..OnionSettings::default()
        });
        let destination = NodeId::from_bytes([9; 16]);

        let circuit = sender.create_circuit(destination, None);
        assert!(sender.destroy_circuit(&circuit.id));
        assert!(!sender.destroy_circuit(&circuit.id));

        sender.create_circuit(destination, None);
        sender.create_circuit(destination, None);
        assert_eq!(sender.prune_circuits(), 2);
        assert_eq!(sender.active_circuits(), 0);
    }

    #[test]
    fn test_corrupt_packet_is_an_error_not_a_panic() {
        let sender = router(OnionSettings::default());
        let garbage = OnionPacket {
            ephemeral_pubkey: [7u8; 32],
            ciphertext: vec![0u8; 64],
        };
        assert!(sender.process_onion(&garbage).is_err());
    }
}
