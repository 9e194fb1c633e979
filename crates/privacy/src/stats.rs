use serde::Serialize;

/// Observability snapshot for UI and monitoring consumers. This is the only
/// surface outside code may depend on; internal failures manifest here as
/// degraded numbers, never as user-facing errors.
#[derive(Debug, Clone, Serialize)]
pub struct PrivacyStats {
    /// Always true on a live instance; kept on the surface because external
    /// consumers key on it
    pub initialized: bool,
    pub node_id: String,
    pub onion_routing: OnionStats,
    pub p2p: P2pStats,
    pub privacy: PrivacyFlags,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnionStats {
    pub enabled: bool,
    pub active_circuits: usize,
    pub known_relays: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct P2pStats {
    pub total_peers: usize,
    pub connected_peers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivacyFlags {
    pub cover_traffic: bool,
    pub timing_obfuscation: bool,
    pub min_relay_nodes: usize,
}
