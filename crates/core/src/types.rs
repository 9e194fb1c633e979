use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_big_array::BigArray;

/// 32-byte public key (X25519 or Ed25519, context-dependent)
pub type PublicKey = [u8; 32];

/// 64-byte Ed25519 signature (use BigArray for serde support)
pub type Signature = [u8; 64];

/// Number of public-key bytes used to form a node identifier.
///
/// 16 bytes gives a 128-bit id space, which maps cleanly onto `u128`
/// XOR-distance arithmetic in the DHT.
pub const NODE_ID_LEN: usize = 16;

/// Node identifier: a fixed-length prefix of the node's X25519 public key.
///
/// Stable for the process lifetime — peers, circuits, and DHT buckets all
/// reference it, so it must never be regenerated after first use.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// Derive a node id from an encryption public key.
    pub fn from_public_key(pubkey: &PublicKey) -> Self {
        let mut id = [0u8; NODE_ID_LEN];
        id.copy_from_slice(&pubkey[..NODE_ID_LEN]);
        Self(id)
    }

    pub fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// The id as an unsigned big integer (big-endian), for XOR-distance math.
    pub fn to_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    /// Parse a hex-encoded node id.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; NODE_ID_LEN] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.0))
    }
}

// Hex string in JSON, raw bytes in bincode.
impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(self.0))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

struct NodeIdVisitor;

impl<'de> Visitor<'de> for NodeIdVisitor {
    type Value = NodeId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a {NODE_ID_LEN}-byte node id (hex string or raw bytes)")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<NodeId, E> {
        NodeId::from_hex(v).map_err(|e| E::custom(format!("invalid node id: {e}")))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<NodeId, E> {
        let arr: [u8; NODE_ID_LEN] = v
            .try_into()
            .map_err(|_| E::invalid_length(v.len(), &self))?;
        Ok(NodeId(arr))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<NodeId, A::Error> {
        let mut arr = [0u8; NODE_ID_LEN];
        for (i, slot) in arr.iter_mut().enumerate() {
            *slot = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(NodeId(arr))
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(NodeIdVisitor)
        } else {
            deserializer.deserialize_bytes(NodeIdVisitor)
        }
    }
}

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Role a relay plays on a circuit path (bookkeeping only — roles do not
/// change crypto behavior).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayRole {
    Entry,
    Relay,
    Exit,
}

/// A relay candidate held in the onion router's registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayNode {
    pub id: NodeId,
    /// X25519 encryption pubkey (onion layer ECDH)
    pub public_key: PublicKey,
    /// Ed25519 signing pubkey (announcement verification)
    pub signing_key: PublicKey,
    pub address: Option<String>,
    pub role: RelayRole,
    /// Unix millis of the last announcement or registration
    pub last_seen: u64,
    pub reputation: u32,
}

impl RelayNode {
    pub fn new(id: NodeId, public_key: PublicKey, signing_key: PublicKey) -> Self {
        Self {
            id,
            public_key,
            signing_key,
            address: None,
            role: RelayRole::Relay,
            last_seen: now_millis(),
            reputation: 100,
        }
    }
}

/// The gossipable subset of a peer: what `find_node` answers carry and what
/// the DHT buckets hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub public_key: Option<PublicKey>,
    pub address: Option<String>,
}

/// Connection status of a peer in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// A signed relay announcement, spread via gossip.
///
/// Receivers verify the Ed25519 signature over the announcement fields
/// before admitting the node to their relay registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayAnnouncement {
    pub node_id: NodeId,
    /// X25519 encryption pubkey
    pub encryption_key: PublicKey,
    /// Ed25519 signing pubkey
    pub signing_key: PublicKey,
    pub address: Option<String>,
    pub timestamp: u64,
    #[serde(with = "BigArray")]
    pub signature: Signature,
}

impl RelayAnnouncement {
    /// The bytes covered by the announcement signature:
    /// node_id(16) || encryption_key(32) || signing_key(32) || timestamp_le(8)
    pub fn signable_data(
        node_id: &NodeId,
        encryption_key: &PublicKey,
        signing_key: &PublicKey,
        timestamp: u64,
    ) -> Vec<u8> {
        let mut data = Vec::with_capacity(NODE_ID_LEN + 32 + 32 + 8);
        data.extend_from_slice(node_id.as_bytes());
        data.extend_from_slice(encryption_key);
        data.extend_from_slice(signing_key);
        data.extend_from_slice(&timestamp.to_le_bytes());
        data
    }
}
