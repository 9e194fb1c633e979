//! Kademlia-style peer routing and a small TTL'd key/value store.
//!
//! Peers are bucketed by XOR distance from the local node id. The id space is
//! 128 bits, so there are 128 buckets of at most `k` entries each. The store
//! is a plain map with timestamp-based expiry, replicated by the peer layer
//! to the closest known nodes.

mod distance;
mod routing;
mod store;

pub use distance::{bucket_index, distance, NUM_BUCKETS};
pub use routing::RoutingTable;
pub use store::KeyValueStore;
