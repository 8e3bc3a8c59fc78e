//! Immutable-after-init bootstrap set plus an atomic connected-count.

use crate::types::{AddrInfo, PeerId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// `(ordered bootnode list, id->bootnode map, connected-count)`. The list
/// and map are frozen after construction; only `connected_count` mutates.
pub struct BootnodeSet {
    ordered: Vec<AddrInfo>,
    by_id: HashMap<PeerId, AddrInfo>,
    // Deliberately not adjacent to `ordered`/`by_id` in the struct so it
    // doesn't share a cache line with the read-mostly fields.
    connected_count: AtomicI64,
}

impl BootnodeSet {
    /// Builds the set from parsed bootnode addresses, silently omitting any
    /// entry equal to `local_id`.
    pub fn new(bootnodes: Vec<AddrInfo>, local_id: PeerId) -> Self {
        let mut ordered = Vec::with_capacity(bootnodes.len());
        let mut by_id = HashMap::with_capacity(bootnodes.len());
        for b in bootnodes {
            if b.peer_id == local_id {
                tracing::info!(peer_id = %local_id, "omitting self from bootnode list");
                continue;
            }
            by_id.insert(b.peer_id, b.clone());
            ordered.push(b);
        }
        Self {
            ordered,
            by_id,
            connected_count: AtomicI64::new(0),
        }
    }

    pub fn is_bootnode(&self, id: &PeerId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get_all(&self) -> Vec<AddrInfo> {
        self.ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn has_any(&self) -> bool {
        !self.ordered.is_empty()
    }

    pub fn connected_count(&self) -> i64 {
        self.connected_count.load(Ordering::Relaxed)
    }

    pub fn increase_connected(&self, delta: i64) {
        self.connected_count.fetch_add(delta, Ordering::Relaxed);
    }

    /// Uniform random pick over bootnodes that are not in `connected`. Returns
    /// `None` iff every bootnode is connected.
    pub fn random_not_connected(
        &self,
        connected: impl Fn(&PeerId) -> bool,
    ) -> Option<AddrInfo> {
        use rand::seq::SliceRandom;
        let candidates: Vec<&AddrInfo> = self
            .ordered
            .iter()
            .filter(|b| !connected(&b.peer_id))
            .collect();
        candidates
            .choose(&mut rand::thread_rng())
            .map(|b| (*b).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(id: PeerId) -> AddrInfo {
        AddrInfo::new(id, vec![])
    }

    #[test]
    fn self_bootnode_is_filtered() {
        let me = PeerId::random();
        let other = PeerId::random();
        let set = BootnodeSet::new(vec![addr(me), addr(other)], me);
        assert_eq!(set.len(), 1);
        assert!(set.is_bootnode(&other));
        assert!(!set.is_bootnode(&me));
    }

    #[test]
    fn random_not_connected_returns_none_when_all_connected() {
        let me = PeerId::random();
        let a = PeerId::random();
        let b = PeerId::random();
        let set = BootnodeSet::new(vec![addr(a), addr(b)], me);
        assert!(set.random_not_connected(|_| true).is_none());
        assert!(set.random_not_connected(|id| *id == a).is_some());
    }

    #[test]
    fn connected_count_never_exceeds_bootnode_count() {
        let me = PeerId::random();
        let a = PeerId::random();
        let set = BootnodeSet::new(vec![addr(a)], me);
        set.increase_connected(1);
        assert!(set.connected_count() <= set.len() as i64);
    }
}
