//! Priority queue of pending dial tasks, keyed by peer identity, with a
//! blocking pop and a close signal.

use crate::event_bus::EventBus;
use crate::types::{AddrInfo, DialPriority, DialTask, Event, EventKind, PeerId};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use tokio::sync::Notify;

/// Lightweight heap key. The queue keeps the authoritative `(priority, addr)`
/// for a peer in `pending`; heap entries are lazily invalidated against it so
/// that `del`/merge don't need to rebuild the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    priority: DialPriority,
    seq: u64,
    peer_id: PeerId,
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest (priority, seq)
        // pops first (priority ascending, then insertion order ascending).
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    heap: BinaryHeap<HeapEntry>,
    pending: HashMap<PeerId, (AddrInfo, DialPriority, u64)>,
    next_seq: u64,
    closed: bool,
}

pub struct DialQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    event_bus: Arc<EventBus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed;

impl DialQueue {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                pending: HashMap::new(),
                next_seq: 0,
                closed: false,
            }),
            notify: Notify::new(),
            event_bus,
        }
    }

    /// If the peer is already enqueued, merges by retaining the stricter
    /// (smaller) priority and refreshing the address list; otherwise inserts.
    /// Emits `AddedToDialQueue` whether the task is new or merged.
    pub fn add(&self, addr_info: AddrInfo, priority: DialPriority) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        let peer_id = addr_info.peer_id;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let merged_priority = match inner.pending.get(&peer_id) {
            Some((_, existing_priority, _)) => (*existing_priority).min(priority),
            None => priority,
        };

        inner
            .pending
            .insert(peer_id, (addr_info, merged_priority, seq));
        inner.heap.push(HeapEntry {
            priority: merged_priority,
            seq,
            peer_id,
        });
        drop(inner);
        self.notify.notify_one();
        self.event_bus
            .emit(Event::new(peer_id, EventKind::AddedToDialQueue));
    }

    /// Removes any enqueued task for that peer. A no-op if absent.
    pub fn del(&self, peer_id: &PeerId) {
        self.inner.lock().pending.remove(peer_id);
    }

    /// Blocks until a task is available, or returns `Closed` forever after
    /// `close()`.
    pub async fn pop(&self) -> Result<DialTask, Closed> {
        loop {
            // Registered before the closed-check below so a `close()` (or
            // `add()`) landing between the check and the `.await` can't be
            // missed: `notify_waiters()` stores no permit, so a waiter that
            // starts listening only after the check would block forever.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                loop {
                    match inner.heap.pop() {
                        None => break,
                        Some(entry) => {
                            if let Some((addr_info, priority, seq)) =
                                inner.pending.get(&entry.peer_id).cloned()
                            {
                                if seq == entry.seq {
                                    inner.pending.remove(&entry.peer_id);
                                    return Ok(DialTask {
                                        addr_info,
                                        priority,
                                        seq,
                                    });
                                }
                            }
                            // stale heap entry (superseded merge, or deleted); discard
                        }
                    }
                }
                if inner.closed {
                    return Err(Closed);
                }
            }
            notified.await;
        }
    }

    /// Unblocks pending poppers with `Closed` forever after.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.inner.lock().pending.contains_key(peer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NullMetrics;

    fn addr(id: PeerId) -> AddrInfo {
        AddrInfo::new(id, vec![])
    }

    fn queue() -> DialQueue {
        DialQueue::new(Arc::new(EventBus::new(Arc::new(NullMetrics))))
    }

    #[tokio::test]
    async fn fifo_within_priority() {
        let q = queue();
        let a = PeerId::random();
        let b = PeerId::random();
        q.add(addr(a), DialPriority::RandomDial);
        q.add(addr(b), DialPriority::RandomDial);
        assert_eq!(q.pop().await.unwrap().addr_info.peer_id, a);
        assert_eq!(q.pop().await.unwrap().addr_info.peer_id, b);
    }

    #[tokio::test]
    async fn requested_dial_jumps_the_queue() {
        let q = queue();
        let a = PeerId::random();
        let b = PeerId::random();
        q.add(addr(a), DialPriority::RandomDial);
        q.add(addr(b), DialPriority::RequestedDial);
        assert_eq!(q.pop().await.unwrap().addr_info.peer_id, b);
        assert_eq!(q.pop().await.unwrap().addr_info.peer_id, a);
    }

    #[tokio::test]
    async fn duplicate_add_merges_to_stricter_priority() {
        let q = queue();
        let a = PeerId::random();
        q.add(addr(a), DialPriority::RandomDial);
        q.add(addr(a), DialPriority::RequestedDial);
        assert_eq!(q.len(), 1);
        let task = q.pop().await.unwrap();
        assert_eq!(task.priority, DialPriority::RequestedDial);
    }

    #[tokio::test]
    async fn del_removes_enqueued_peer() {
        let q = queue();
        let a = PeerId::random();
        q.add(addr(a), DialPriority::RandomDial);
        q.del(&a);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn add_emits_added_to_dial_queue() {
        let bus = Arc::new(EventBus::new(Arc::new(NullMetrics)));
        let q = DialQueue::new(bus.clone());
        let mut sub = bus.subscribe();
        let a = PeerId::random();
        q.add(addr(a), DialPriority::RandomDial);
        let event = sub.recv().await.unwrap();
        assert_eq!(event.peer_id, a);
        assert_eq!(event.kind, EventKind::AddedToDialQueue);
    }

    #[tokio::test]
    async fn close_unblocks_poppers() {
        let q = Arc::new(queue());
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.pop().await });
        tokio::task::yield_now().await;
        q.close();
        let result = handle.await.unwrap();
        assert_eq!(result, Err(Closed));
    }
}
