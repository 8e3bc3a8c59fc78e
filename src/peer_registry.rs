//! A single map `peer-id -> PeerRecord` guarded by one mutex; `add_peer` and
//! `del_peer` are the only mutators.

use crate::bootnodes::BootnodeSet;
use crate::counters::ConnectionCounters;
use crate::event_bus::EventBus;
use crate::host::Host;
use crate::metrics::Metrics;
use crate::types::{AddrInfo, Direction, Event, EventKind, PeerId, PeerRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub struct PeerRegistry {
    peers: Mutex<HashMap<PeerId, PeerRecord>>,
    counters: Arc<ConnectionCounters>,
    /// Present only when discovery is enabled.
    bootnodes: Option<Arc<BootnodeSet>>,
    metrics: Arc<dyn Metrics>,
    event_bus: Arc<EventBus>,
    host: Arc<dyn Host>,
}

impl PeerRegistry {
    pub fn new(
        counters: Arc<ConnectionCounters>,
        bootnodes: Option<Arc<BootnodeSet>>,
        metrics: Arc<dyn Metrics>,
        event_bus: Arc<EventBus>,
        host: Arc<dyn Host>,
    ) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            counters,
            bootnodes,
            metrics,
            event_bus,
            host,
        }
    }

    /// Registers a newly connected peer. Emits `Connected` outside the lock.
    pub fn add_peer(&self, id: PeerId, addr_info: AddrInfo, direction: Direction) {
        let snapshot = {
            let mut peers = self.peers.lock();
            peers.insert(
                id,
                PeerRecord {
                    addr_info,
                    direction,
                },
            );
            self.counters.update_active(1, direction);
            if let Some(bootnodes) = &self.bootnodes {
                if bootnodes.is_bootnode(&id) {
                    bootnodes.increase_connected(1);
                }
            }
            self.snapshot(&peers)
        };
        self.metrics
            .record_peer_counts(snapshot.0, snapshot.1, snapshot.2);
        self.event_bus.emit(Event::new(id, EventKind::Connected));
    }

    /// Idempotent: if `id` is absent, the map and counters are untouched,
    /// but `Host.close_peer` is still invoked and `Disconnected` still
    /// emitted.
    pub async fn del_peer(&self, id: PeerId) {
        let snapshot = {
            let mut peers = self.peers.lock();
            if let Some(record) = peers.remove(&id) {
                self.counters.update_active(-1, record.direction);
                if let Some(bootnodes) = &self.bootnodes {
                    if bootnodes.is_bootnode(&id) {
                        bootnodes.increase_connected(-1);
                    }
                }
            }
            self.snapshot(&peers)
        };
        self.metrics
            .record_peer_counts(snapshot.0, snapshot.1, snapshot.2);

        // Transport operation happens outside the lock.
        if let Err(err) = self.host.close_peer(id).await {
            warn!(peer_id = %id, %err, "error closing peer connection");
        }
        self.event_bus.emit(Event::new(id, EventKind::Disconnected));
    }

    fn snapshot(&self, peers: &HashMap<PeerId, PeerRecord>) -> (usize, i64, i64) {
        (
            peers.len(),
            self.counters.active_count(Direction::Inbound),
            self.counters.active_count(Direction::Outbound),
        )
    }

    pub fn peers(&self) -> Vec<PeerRecord> {
        self.peers.lock().values().cloned().collect()
    }

    pub fn has_peer(&self, id: &PeerId) -> bool {
        self.peers.lock().contains_key(id)
    }

    pub fn num_peers(&self) -> usize {
        self.peers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Connectedness;
    use crate::metrics::NullMetrics;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeHost {
        close_calls: AtomicUsize,
    }

    #[async_trait]
    impl Host for FakeHost {
        fn id(&self) -> PeerId {
            PeerId::random()
        }
        fn addrs(&self) -> Vec<crate::types::Multiaddr> {
            vec![]
        }
        async fn listen(&self, _addr: crate::types::Multiaddr) -> Result<(), crate::error::Error> {
            Ok(())
        }
        async fn connect(&self, _addr_info: AddrInfo) -> Result<(), crate::error::Error> {
            Ok(())
        }
        async fn close_peer(&self, _id: PeerId) -> Result<(), crate::error::Error> {
            self.close_calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn connectedness(&self, _id: PeerId) -> Connectedness {
            Connectedness::NotConnected
        }
        async fn new_stream(
            &self,
            _id: PeerId,
            _protocol_id: &str,
        ) -> Result<crate::host::BoxedStream, crate::error::Error> {
            unimplemented!()
        }
        fn set_stream_handler(&self, _protocol_id: &str, _handler: Arc<dyn crate::host::StreamHandler>) {}
        fn on_disconnect(&self, _cb: Box<dyn Fn(PeerId) + Send + Sync>) {}
        fn peerstore(&self) -> Arc<dyn crate::host::Peerstore> {
            unimplemented!()
        }
    }

    fn registry() -> (Arc<ConnectionCounters>, Arc<FakeHost>, PeerRegistry) {
        let counters = Arc::new(ConnectionCounters::new(4, 4));
        let host = Arc::new(FakeHost {
            close_calls: AtomicUsize::new(0),
        });
        let bus = Arc::new(EventBus::new(Arc::new(NullMetrics)));
        let reg = PeerRegistry::new(
            counters.clone(),
            None,
            Arc::new(NullMetrics),
            bus,
            host.clone(),
        );
        (counters, host, reg)
    }

    #[tokio::test]
    async fn add_then_del_restores_counters() {
        let (counters, _host, reg) = registry();
        let peer = PeerId::random();
        reg.add_peer(peer, AddrInfo::new(peer, vec![]), Direction::Inbound);
        assert_eq!(counters.active_count(Direction::Inbound), 1);
        assert!(reg.has_peer(&peer));

        reg.del_peer(peer).await;
        assert_eq!(counters.active_count(Direction::Inbound), 0);
        assert!(!reg.has_peer(&peer));
    }

    #[tokio::test]
    async fn del_peer_is_idempotent_but_still_closes_transport() {
        let (counters, host, reg) = registry();
        let peer = PeerId::random();

        reg.del_peer(peer).await;
        assert_eq!(counters.active_count(Direction::Inbound), 0);
        assert_eq!(host.close_calls.load(Ordering::Relaxed), 1);

        reg.del_peer(peer).await;
        assert_eq!(counters.active_count(Direction::Inbound), 0);
        assert_eq!(host.close_calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn num_peers_matches_registry_membership() {
        let (_counters, _host, reg) = registry();
        let a = PeerId::random();
        let b = PeerId::random();
        reg.add_peer(a, AddrInfo::new(a, vec![]), Direction::Outbound);
        reg.add_peer(b, AddrInfo::new(b, vec![]), Direction::Inbound);
        assert_eq!(reg.num_peers(), 2);
        reg.del_peer(a).await;
        assert_eq!(reg.num_peers(), 1);
    }
}
