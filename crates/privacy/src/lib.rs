//! The privacy orchestration layer.
//!
//! [`PrivacyNetwork`] is the single surface host applications use: it turns
//! "send a private message to X" into end-to-end encryption, a random
//! timing-obfuscation delay, onion wrapping, and a transport send, and turns
//! inbound frames back into delivered plaintexts. It also emits periodic
//! cover traffic so observers cannot cheaply separate real messages from
//! noise.

mod network;
mod stats;

pub use network::PrivacyNetwork;
pub use stats::{OnionStats, P2pStats, PrivacyFlags, PrivacyStats};
