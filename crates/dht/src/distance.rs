//! XOR distance over the 128-bit id space

use veilmesh_core::{NodeId, NODE_ID_LEN};

/// One bucket per bit of the id.
pub const NUM_BUCKETS: usize = NODE_ID_LEN * 8;

/// XOR distance between two ids, as an unsigned big integer.
///
/// Symmetric, and zero iff the ids are equal.
pub fn distance(a: &NodeId, b: &NodeId) -> u128 {
    a.to_u128() ^ b.to_u128()
}

/// Bucket index for a remote id relative to the local id.
///
/// Buckets count down from the farthest half of the id space: the higher the
/// shared prefix, the higher the index. Distance zero (the local id itself)
/// maps to bucket 0.
pub fn bucket_index(local: &NodeId, other: &NodeId) -> usize {
    let d = distance(local, other);
    if d == 0 {
        return 0;
    }
    d.leading_zeros() as usize
}
