use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

/// Bounded set of frame and gossip ids already processed.
///
/// De-duplication is approximate: when the cap is hit the oldest half is
/// discarded, so a very old id can be accepted twice. Acceptable for a
/// best-effort broadcast layer.
pub struct SeenCache {
    set: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    cap: usize,
    keep: usize,
}

impl SeenCache {
    pub fn new(cap: usize, keep: usize) -> Self {
        Self {
            set: HashSet::with_capacity(cap),
            order: VecDeque::with_capacity(cap),
            cap,
            keep,
        }
    }

    /// Record an id. Returns `true` if it was not seen before.
    pub fn insert(&mut self, id: Uuid) -> bool {
        if !self.set.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.cap {
            while self.order.len() > self.keep {
                if let Some(old) = self.order.pop_front() {
                    self.set.remove(&old);
                }
            }
        }
        true
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.set.contains(id)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

impl Default for SeenCache {
    fn default() -> Self {
        Self::new(10_000, 5_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_novelty() {
        let mut seen = SeenCache::default();
        let id = Uuid::new_v4();
        assert!(seen.insert(id));
        assert!(!seen.insert(id));
        assert!(seen.contains(&id));
    }

    #[test]
    fn test_overflow_trims_oldest_half() {
        let mut seen = SeenCache::new(10, 5);
        let ids: Vec<Uuid> = (0..11).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            seen.insert(*id);
        }
        assert_eq!(seen.len(), 5);
        // Oldest entries dropped, newest retained
        assert!(!seen.contains(&ids[0]));
        assert!(seen.contains(&ids[10]));
    }
}
