//! Atomic tallies of active and pending connections per direction.

use crate::types::Direction;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug)]
pub struct ConnectionCounters {
    max_inbound: i64,
    max_outbound: i64,
    active_inbound: AtomicI64,
    active_outbound: AtomicI64,
    pending_inbound: AtomicI64,
    pending_outbound: AtomicI64,
}

impl ConnectionCounters {
    pub fn new(max_inbound: usize, max_outbound: usize) -> Self {
        Self {
            max_inbound: max_inbound as i64,
            max_outbound: max_outbound as i64,
            active_inbound: AtomicI64::new(0),
            active_outbound: AtomicI64::new(0),
            pending_inbound: AtomicI64::new(0),
            pending_outbound: AtomicI64::new(0),
        }
    }

    fn active(&self, dir: Direction) -> &AtomicI64 {
        match dir {
            Direction::Inbound => &self.active_inbound,
            Direction::Outbound => &self.active_outbound,
        }
    }

    fn pending(&self, dir: Direction) -> &AtomicI64 {
        match dir {
            Direction::Inbound => &self.pending_inbound,
            Direction::Outbound => &self.pending_outbound,
        }
    }

    fn max(&self, dir: Direction) -> i64 {
        match dir {
            Direction::Inbound => self.max_inbound,
            Direction::Outbound => self.max_outbound,
        }
    }

    /// `true` iff `active[dir] + pending[dir] < max[dir]`.
    ///
    /// Intentionally optimistic: the caller is expected to check,
    /// then pop a task, then let the transport's eventual callback update
    /// `active`. This admits a benign transient overshoot bounded by the
    /// number of concurrent dial attempts in flight.
    pub fn has_free_slot(&self, dir: Direction) -> bool {
        let active = self.active(dir).load(Ordering::Relaxed);
        let pending = self.pending(dir).load(Ordering::Relaxed);
        active + pending < self.max(dir)
    }

    pub fn has_free_outbound(&self) -> bool {
        self.has_free_slot(Direction::Outbound)
    }

    pub fn update_active(&self, delta: i64, dir: Direction) {
        self.active(dir).fetch_add(delta, Ordering::Relaxed);
    }

    pub fn update_pending(&self, delta: i64, dir: Direction) {
        self.pending(dir).fetch_add(delta, Ordering::Relaxed);
    }

    pub fn active_count(&self, dir: Direction) -> i64 {
        self.active(dir).load(Ordering::Relaxed)
    }

    pub fn pending_count(&self, dir: Direction) -> i64 {
        self.pending(dir).load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_slot_accounts_for_pending() {
        let c = ConnectionCounters::new(1, 2);
        assert!(c.has_free_outbound());
        c.update_pending(1, Direction::Outbound);
        assert!(c.has_free_outbound());
        c.update_pending(1, Direction::Outbound);
        assert!(!c.has_free_outbound());
    }

    #[test]
    fn active_and_pending_never_exceed_max_under_the_reserve_protocol() {
        let c = ConnectionCounters::new(0, 2);
        c.update_pending(1, Direction::Outbound);
        c.update_active(1, Direction::Outbound);
        c.update_pending(-1, Direction::Outbound);
        assert_eq!(c.active_count(Direction::Outbound), 1);
        assert_eq!(c.pending_count(Direction::Outbound), 0);
        assert!(c.has_free_outbound());
    }
}
