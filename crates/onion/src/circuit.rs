use std::time::Instant;

use uuid::Uuid;

use veilmesh_core::{NodeId, RelayNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitStatus {
    Building,
    Active,
}

/// An ephemeral relay path for one message (or a short burst).
///
/// Circuits are not reused across `send` calls: every message derives a
/// fresh random path, trading path persistence for unlinkability between
/// messages. Stale entries are swept by TTL garbage collection.
#[derive(Debug, Clone)]
pub struct Circuit {
    pub id: Uuid,
    pub path: Vec<RelayNode>,
    pub destination: NodeId,
    pub created_at: Instant,
    pub status: CircuitStatus,
}

impl Circuit {
    pub fn new(path: Vec<RelayNode>, destination: NodeId) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            destination,
            created_at: Instant::now(),
            status: CircuitStatus::Building,
        }
    }

    pub fn hop_count(&self) -> usize {
        self.path.len()
    }

    /// First relay on the path, or the destination itself for a zero-hop
    /// circuit.
    pub fn entry_node(&self) -> NodeId {
        self.path.first().map(|n| n.id).unwrap_or(self.destination)
    }
}
