//! Replicated key/value entries with TTL expiry

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

struct StoredValue {
    value: serde_json::Value,
    stored_at: Instant,
}

/// Local slice of the DHT's key/value space.
///
/// Entries expire after a fixed TTL so abandoned keys do not accumulate;
/// `prune_expired` must run periodically (the peer layer does this on its
/// heartbeat tick), and `get` also checks expiry on read.
pub struct KeyValueStore {
    entries: HashMap<String, StoredValue>,
    ttl: Duration,
}

impl KeyValueStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Insert or overwrite, resetting the entry's clock.
    pub fn put(&mut self, key: String, value: serde_json::Value) {
        self.entries.insert(
            key,
            StoredValue {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn get(&mut self, key: &str) -> Option<serde_json::Value> {
        match self.entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Drop all expired entries. Returns how many were removed.
    pub fn prune_expired(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "expired stored values");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
