//! Bucketed routing table

use tracing::trace;

use veilmesh_core::{NodeId, NodeRecord};

use crate::distance::{bucket_index, distance, NUM_BUCKETS};

/// Kademlia-style routing table: one bucket per bit of shared prefix, each
/// holding at most `k` records ordered oldest to freshest.
///
/// A full bucket rejects new entries instead of ping-evicting the oldest.
/// Stale entries still age out through the peer layer's timeout eviction,
/// which calls [`RoutingTable::remove`].
pub struct RoutingTable {
    local: NodeId,
    k: usize,
    buckets: Vec<Vec<NodeRecord>>,
}

impl RoutingTable {
    pub fn new(local: NodeId, k: usize) -> Self {
        Self {
            local,
            k,
            buckets: vec![Vec::new(); NUM_BUCKETS],
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local
    }

    /// Insert or refresh a record. A record already present moves to the
    /// freshest position; a new record is rejected when its bucket is full.
    /// Returns whether the record is in the table afterwards.
    pub fn add(&mut self, record: NodeRecord) -> bool {
        if record.id == self.local {
            return false;
        }
        let index = bucket_index(&self.local, &record.id);
        let bucket = &mut self.buckets[index];

        if let Some(pos) = bucket.iter().position(|r| r.id == record.id) {
            bucket.remove(pos);
            bucket.push(record);
            return true;
        }
        if bucket.len() >= self.k {
            trace!(bucket = index, peer = %record.id, "bucket full, rejecting peer");
            return false;
        }
        bucket.push(record);
        true
    }

    pub fn remove(&mut self, id: &NodeId) -> bool {
        let index = bucket_index(&self.local, id);
        let bucket = &mut self.buckets[index];
        if let Some(pos) = bucket.iter().position(|r| r.id == *id) {
            bucket.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        let index = bucket_index(&self.local, id);
        self.buckets[index].iter().any(|r| r.id == *id)
    }

    /// The `k` known records closest to `target`, sorted ascending by
    /// distance. Fewer are returned when fewer are known.
    pub fn find_closest(&self, target: &NodeId, k: usize) -> Vec<NodeRecord> {
        let mut all: Vec<NodeRecord> = self.buckets.iter().flatten().cloned().collect();
        all.sort_by_key(|r| distance(&r.id, target));
        all.truncate(k);
        all
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    /// Number of buckets holding at least one record.
    pub fn occupied_buckets(&self) -> usize {
        self.buckets.iter().filter(|b| !b.is_empty()).count()
    }
}
