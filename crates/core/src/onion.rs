//! Onion layer wire types
//!
//! These types define the nested encryption structure for multi-hop onion
//! routing. Each relay peels one layer to learn the next hop; no plaintext
//! routing metadata is visible to intermediate relays.
//!
//! Layer plaintexts travel as bincode, so the enums here use the default
//! externally-tagged representation (internally-tagged enums cannot be
//! decoded from non-self-describing formats).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{NodeId, PublicKey};

/// One encryption layer on the wire: a fresh ephemeral X25519 pubkey plus
/// `nonce(12) || ChaCha20-Poly1305 ciphertext` of the bincode-encoded
/// [`LayerPlain`]. A fresh ephemeral keypair per layer prevents relays from
/// correlating two layers by key reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnionPacket {
    pub ephemeral_pubkey: PublicKey,
    pub ciphertext: Vec<u8>,
}

/// Decrypted onion layer revealed when a relay peels one encryption layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerPlain {
    /// Node that should receive the inner payload (or the local node itself
    /// when this layer is terminal)
    pub next_hop: NodeId,
    pub circuit_id: Uuid,
    /// 0 = innermost (destination) layer
    pub layer_index: u8,
    pub payload: LayerPayload,
    /// Unix millis at wrap time
    pub timestamp: u64,
}

/// What a peeled layer carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LayerPayload {
    /// Another still-wrapped layer for the next relay
    Forward(OnionPacket),
    /// The padded end-to-end encrypted message bytes, for the destination
    Deliver(Vec<u8>),
}

impl LayerPlain {
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// End-to-end sealed unit: same `{ephemeral, nonce||ciphertext}` shape as an
/// onion layer, but sealed under the final recipient's key. The interior is
/// a bincode [`PrivateEnvelope`], bucket-padded before sealing so ciphertext
/// length leaks only a coarse size class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    pub ephemeral_pubkey: PublicKey,
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// The plaintext interior of a sealed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateEnvelope {
    pub content: String,
    pub timestamp: u64,
    pub sender: NodeId,
}

impl PrivateEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NODE_ID_LEN;

    #[test]
    fn test_layer_plain_serde() {
        let layer = LayerPlain {
            next_hop: NodeId::from_bytes([1; NODE_ID_LEN]),
            circuit_id: Uuid::new_v4(),
            layer_index: 2,
            payload: LayerPayload::Forward(OnionPacket {
                ephemeral_pubkey: [5u8; 32],
                ciphertext: vec![8, 9, 10],
            }),
            timestamp: 1234,
        };

        let bytes = layer.to_bytes().unwrap();
        let restored = LayerPlain::from_bytes(&bytes).unwrap();
        assert_eq!(restored.next_hop, layer.next_hop);
        assert_eq!(restored.circuit_id, layer.circuit_id);
        assert_eq!(restored.layer_index, 2);
        match restored.payload {
            LayerPayload::Forward(p) => assert_eq!(p.ciphertext, vec![8, 9, 10]),
            LayerPayload::Deliver(_) => panic!("expected forward payload"),
        }
    }

    #[test]
    fn test_layer_plain_deliver_variant() {
        let layer = LayerPlain {
            next_hop: NodeId::from_bytes([2; NODE_ID_LEN]),
            circuit_id: Uuid::new_v4(),
            layer_index: 0,
            payload: LayerPayload::Deliver(vec![1, 2, 3]),
            timestamp: 0,
        };

        let restored = LayerPlain::from_bytes(&layer.to_bytes().unwrap()).unwrap();
        match restored.payload {
            LayerPayload::Deliver(bytes) => assert_eq!(bytes, vec![1, 2, 3]),
            LayerPayload::Forward(_) => panic!("expected deliver payload"),
        }
    }

    #[test]
    fn test_private_envelope_roundtrip() {
        let envelope = PrivateEnvelope {
            content: "hello".to_string(),
            timestamp: 99,
            sender: NodeId::from_bytes([3; NODE_ID_LEN]),
        };
        let restored = PrivateEnvelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, envelope);
    }

    #[test]
    fn test_layer_plain_rejects_garbage() {
        assert!(LayerPlain::from_bytes(&[0xFF; 7]).is_err());
    }
}
