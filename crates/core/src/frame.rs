//! Wire frames exchanged between peers
//!
//! Every frame is a JSON object carrying `{type, id, from, timestamp}` plus
//! type-specific fields. Frame types form a closed enum so dispatch is
//! exhaustive at compile time instead of a runtime string switch.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::onion::{OnionPacket, SealedEnvelope};
use crate::types::{now_millis, NodeId, NodeRecord, RelayAnnouncement};

/// A top-level frame as transmitted over a peer channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Random id used for gossip de-duplication
    pub id: Uuid,
    pub from: NodeId,
    /// Unix millis at send time
    pub timestamp: u64,
    #[serde(flatten)]
    pub body: FrameBody,
}

impl Frame {
    /// Stamp a body with a fresh id, sender, and timestamp.
    pub fn stamp(from: NodeId, body: FrameBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            timestamp: now_millis(),
            body,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// All frame types a node emits or accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameBody {
    Heartbeat {
        /// Sender clock at emission, echoed back for latency measurement
        sent_at: u64,
    },
    HeartbeatAck {
        sent_at: u64,
    },
    FindNode {
        request_id: Uuid,
        target: NodeId,
    },
    FindNodeResponse {
        request_id: Uuid,
        nodes: Vec<NodeRecord>,
    },
    Store {
        key: String,
        value: serde_json::Value,
    },
    Get {
        request_id: Uuid,
        key: String,
    },
    GetResponse {
        request_id: Uuid,
        key: String,
        value: Option<serde_json::Value>,
    },
    Gossip {
        gossip_id: Uuid,
        content: GossipContent,
        ttl: u8,
        exclude: Vec<NodeId>,
    },
    Direct {
        content: DirectPayload,
    },
}

/// Payloads carried inside a `direct` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectPayload {
    /// A still-wrapped onion layer addressed to this node
    OnionMessage { payload: OnionPacket },
    /// End-to-end encrypted message sent without relay indirection
    DirectEncrypted { payload: SealedEnvelope },
    /// Dummy traffic; same size/shape as a real single-hop direct message.
    /// Never delivered to application handlers.
    CoverTraffic { padding: Vec<u8>, timestamp: u64 },
}

/// Payloads carried inside a `gossip` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GossipContent {
    /// A node volunteering as an onion relay
    RelayAnnouncement(RelayAnnouncement),
    /// A direct payload flooded toward a node we have no channel to
    Addressed {
        target: NodeId,
        content: Box<DirectPayload>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NODE_ID_LEN;

    fn node(n: u8) -> NodeId {
        NodeId::from_bytes([n; NODE_ID_LEN])
    }

    #[test]
    fn test_frame_stamp_fills_metadata() {
        let frame = Frame::stamp(node(1), FrameBody::Heartbeat { sent_at: 7 });
        assert_eq!(frame.from, node(1));
        assert!(frame.timestamp > 0);
    }

    #[test]
    fn test_frame_type_tag_is_snake_case() {
        let frame = Frame::stamp(node(1), FrameBody::Heartbeat { sent_at: 7 });
        let json: serde_json::Value = serde_json::from_slice(&frame.to_bytes().unwrap()).unwrap();
        assert_eq!(json["type"], "heartbeat");
        assert_eq!(json["sent_at"], 7);
        assert!(json["id"].is_string());
        assert!(json["from"].is_string());
    }

    #[test]
    fn test_find_node_roundtrip() {
        let frame = Frame::stamp(
            node(2),
            FrameBody::FindNode {
                request_id: Uuid::new_v4(),
                target: node(9),
            },
        );
        let restored = Frame::from_bytes(&frame.to_bytes().unwrap()).unwrap();
        match restored.body {
            FrameBody::FindNode { target, .. } => assert_eq!(target, node(9)),
            other => panic!("expected find_node, got {other:?}"),
        }
    }

    #[test]
    fn test_gossip_frame_roundtrip() {
        let frame = Frame::stamp(
            node(3),
            FrameBody::Gossip {
                gossip_id: Uuid::new_v4(),
                content: GossipContent::Addressed {
                    target: node(4),
                    content: Box::new(DirectPayload::CoverTraffic {
                        padding: vec![0u8; 8],
                        timestamp: 1,
                    }),
                },
                ttl: 5,
                exclude: vec![node(1)],
            },
        );
        let restored = Frame::from_bytes(&frame.to_bytes().unwrap()).unwrap();
        match restored.body {
            FrameBody::Gossip { ttl, exclude, .. } => {
                assert_eq!(ttl, 5);
                assert_eq!(exclude, vec![node(1)]);
            }
            other => panic!("expected gossip, got {other:?}"),
        }
    }

    #[test]
    fn test_direct_payload_tags() {
        let payload = DirectPayload::CoverTraffic {
            padding: vec![1, 2],
            timestamp: 3,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "cover_traffic");

        let payload = DirectPayload::OnionMessage {
            payload: OnionPacket {
                ephemeral_pubkey: [0u8; 32],
                ciphertext: vec![],
            },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "onion_message");
    }

    #[test]
    fn test_unknown_frame_type_is_rejected() {
        let raw = format!(
            r#"{{"type":"mystery","id":"{}","from":"{}","timestamp":1}}"#,
            Uuid::new_v4(),
            node(1)
        );
        assert!(Frame::from_bytes(raw.as_bytes()).is_err());
    }
}
