use std::time::Instant;

use veilmesh_core::{NodeId, PeerStatus, PublicKey};

/// Book-keeping for one remote node's channel.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: NodeId,
    pub public_key: Option<PublicKey>,
    pub address: Option<String>,
    pub status: PeerStatus,
    pub last_seen: Instant,
    /// Round-trip estimate from the latest heartbeat ack, in millis
    pub latency_ms: Option<u64>,
    pub messages_sent: u64,
    pub messages_received: u64,
}

impl Peer {
    pub fn new(id: NodeId, public_key: Option<PublicKey>, address: Option<String>) -> Self {
        Self {
            id,
            public_key,
            address,
            status: PeerStatus::Connecting,
            last_seen: Instant::now(),
            latency_ms: None,
            messages_sent: 0,
            messages_received: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == PeerStatus::Connected
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilmesh_core::NODE_ID_LEN;

    #[test]
    fn test_new_peer_starts_connecting() {
        let peer = Peer::new(NodeId::from_bytes([1; NODE_ID_LEN]), None, None);
        assert_eq!(peer.status, PeerStatus::Connecting);
        assert!(!peer.is_connected());
        assert_eq!(peer.messages_sent, 0);
        assert!(peer.latency_ms.is_none());
    }
}
