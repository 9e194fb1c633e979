//! Peer connection pool: direct channels, liveness, gossip flooding, and
//! inbound frame dispatch.
//!
//! The pool owns one [`Peer`] record per known remote node, the local DHT
//! routing table and value store, and the bounded seen-frame cache used for
//! gossip de-duplication. Transport is abstract: anything that can carry
//! ordered reliable byte messages between named nodes.

mod peer;
mod pool;
mod seen;
mod transport;

pub use peer::Peer;
pub use pool::{PeerPool, PoolEvent, PoolStats};
pub use seen::SeenCache;
pub use transport::{Transport, TransportError};
