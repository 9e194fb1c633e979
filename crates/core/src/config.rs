//! Configuration types
//!
//! All tunables the overlay exposes, grouped per component. Defaults match
//! the deployed constants; everything is serde-deserializable so a host
//! application can load overrides from a config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VeilMeshConfig {
    #[serde(default)]
    pub onion: OnionSettings,

    #[serde(default)]
    pub peers: PeerSettings,

    #[serde(default)]
    pub privacy: PrivacySettings,
}

/// Onion routing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnionSettings {
    /// Default hop count for new circuits
    #[serde(default = "default_min_hops")]
    pub min_hops: usize,

    /// Upper bound on hops per circuit
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    /// Fixed target size (bytes) onion payloads are padded to
    #[serde(default = "default_message_padding")]
    pub message_padding: usize,

    /// Relays below this reputation are never selected for a path
    #[serde(default = "default_reputation_threshold")]
    pub reputation_threshold: u32,

    /// Circuits older than this are garbage-collected
    #[serde(default = "default_circuit_ttl_secs")]
    pub circuit_ttl_secs: u64,
}

fn default_min_hops() -> usize {
    3
}

fn default_max_hops() -> usize {
    5
}

fn default_message_padding() -> usize {
    1024
}

fn default_reputation_threshold() -> u32 {
    50
}

fn default_circuit_ttl_secs() -> u64 {
    300
}

impl OnionSettings {
    pub fn circuit_ttl(&self) -> Duration {
        Duration::from_secs(self.circuit_ttl_secs)
    }
}

impl Default for OnionSettings {
    fn default() -> Self {
        Self {
            min_hops: default_min_hops(),
            max_hops: default_max_hops(),
            message_padding: default_message_padding(),
            reputation_threshold: default_reputation_threshold(),
            circuit_ttl_secs: default_circuit_ttl_secs(),
        }
    }
}

/// Peer pool and DHT settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSettings {
    /// Maximum peer connections to hold
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    /// Below this count the pool actively discovers more peers
    #[serde(default = "default_min_peers")]
    pub min_peers: usize,

    /// Peers silent for longer than this are evicted
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Kademlia bucket capacity (K)
    #[serde(default = "default_dht_k")]
    pub dht_k: usize,

    /// Initial hop budget for gossip floods
    #[serde(default = "default_gossip_ttl")]
    pub gossip_ttl: u8,

    /// Pending find_node/get queries are dropped after this long
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// DHT store entries expire after this long
    #[serde(default = "default_store_ttl_secs")]
    pub store_ttl_secs: u64,
}

fn default_max_peers() -> usize {
    50
}

fn default_min_peers() -> usize {
    5
}

fn default_peer_timeout_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

fn default_dht_k() -> usize {
    20
}

fn default_gossip_ttl() -> u8 {
    5
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_store_ttl_secs() -> u64 {
    600
}

impl PeerSettings {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn store_ttl(&self) -> Duration {
        Duration::from_secs(self.store_ttl_secs)
    }
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            max_peers: default_max_peers(),
            min_peers: default_min_peers(),
            peer_timeout_ms: default_peer_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            dht_k: default_dht_k(),
            gossip_ttl: default_gossip_ttl(),
            request_timeout_ms: default_request_timeout_ms(),
            store_ttl_secs: default_store_ttl_secs(),
        }
    }
}

/// Privacy orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacySettings {
    #[serde(default = "default_true")]
    pub enable_onion_routing: bool,

    /// Minimum registry size before onion routing is attempted; below this
    /// the orchestrator falls back to direct encrypted sends
    #[serde(default = "default_min_relay_nodes")]
    pub min_relay_nodes: usize,

    /// Bounds of the uniform random delay applied before each send
    #[serde(default = "default_message_delay_min_ms")]
    pub message_delay_min_ms: u64,

    #[serde(default = "default_message_delay_max_ms")]
    pub message_delay_max_ms: u64,

    #[serde(default = "default_true")]
    pub cover_traffic: bool,

    #[serde(default = "default_cover_traffic_interval_ms")]
    pub cover_traffic_interval_ms: u64,

    /// Per-interval probability of emitting one cover frame
    #[serde(default = "default_cover_traffic_probability")]
    pub cover_traffic_probability: f64,

    /// Random padding bytes inside each cover frame
    #[serde(default = "default_cover_padding_len")]
    pub cover_padding_len: usize,

    /// Ratchet sessions idle for longer than this are pruned
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_min_relay_nodes() -> usize {
    3
}

fn default_message_delay_min_ms() -> u64 {
    100
}

fn default_message_delay_max_ms() -> u64 {
    500
}

fn default_cover_traffic_interval_ms() -> u64 {
    30_000
}

fn default_cover_traffic_probability() -> f64 {
    0.3
}

fn default_cover_padding_len() -> usize {
    256
}

fn default_session_ttl_secs() -> u64 {
    3600
}

impl PrivacySettings {
    pub fn cover_traffic_interval(&self) -> Duration {
        Duration::from_millis(self.cover_traffic_interval_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            enable_onion_routing: true,
            min_relay_nodes: default_min_relay_nodes(),
            message_delay_min_ms: default_message_delay_min_ms(),
            message_delay_max_ms: default_message_delay_max_ms(),
            cover_traffic: true,
            cover_traffic_interval_ms: default_cover_traffic_interval_ms(),
            cover_traffic_probability: default_cover_traffic_probability(),
            cover_padding_len: default_cover_padding_len(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}
