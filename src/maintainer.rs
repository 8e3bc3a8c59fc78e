//! Periodic top-up: when the peer count drops below the configured minimum
//! and discovery is enabled, enqueues a random unconnected bootnode as a
//! low-priority dial.

use crate::bootnodes::BootnodeSet;
use crate::config::MAINTAINER_INTERVAL_SECS;
use crate::dial_queue::DialQueue;
use crate::peer_registry::PeerRegistry;
use crate::types::DialPriority;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct PeerMaintainer {
    min_peer_connections: usize,
    registry: Arc<PeerRegistry>,
    bootnodes: Option<Arc<BootnodeSet>>,
    dial_queue: Arc<DialQueue>,
    shutdown: CancellationToken,
}

impl PeerMaintainer {
    pub fn new(
        min_peer_connections: usize,
        registry: Arc<PeerRegistry>,
        bootnodes: Option<Arc<BootnodeSet>>,
        dial_queue: Arc<DialQueue>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            min_peer_connections,
            registry,
            bootnodes,
            dial_queue,
            shutdown,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(MAINTAINER_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => self.maintain(),
            }
        }
    }

    fn maintain(&self) {
        if self.registry.num_peers() >= self.min_peer_connections {
            return;
        }
        let Some(bootnodes) = &self.bootnodes else {
            // Discovery disabled: no source of fresh addresses to dial.
            return;
        };
        if !bootnodes.has_any() {
            return;
        }
        let registry = &self.registry;
        match bootnodes.random_not_connected(|id| registry.has_peer(id)) {
            Some(addr_info) => {
                debug!(peer_id = %addr_info.peer_id, "maintainer topping up with bootnode");
                self.dial_queue.add(addr_info, DialPriority::RandomDial);
            }
            None => debug!("maintainer found no unconnected bootnode to dial"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::ConnectionCounters;
    use crate::event_bus::EventBus;
    use crate::host::Connectedness;
    use crate::metrics::NullMetrics;
    use crate::types::{AddrInfo, PeerId};
    use async_trait::async_trait;

    struct FakeHost;
    #[async_trait]
    impl crate::host::Host for FakeHost {
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

    fn setup() -> (Arc<PeerRegistry>, Arc<BootnodeSet>, Arc<DialQueue>, PeerId) {
        let me = PeerId::random();
        let bootnode = PeerId::random();
        let counters = Arc::new(ConnectionCounters::new(4, 4));
        let bootnodes = Arc::new(BootnodeSet::new(
            vec![AddrInfo::new(bootnode, vec![])],
            me,
        ));
        let bus = Arc::new(EventBus::new(Arc::new(NullMetrics)));
        let host = Arc::new(FakeHost);
        let registry = Arc::new(PeerRegistry::new(
            counters,
            Some(bootnodes.clone()),
            Arc::new(NullMetrics),
            bus.clone(),
            host,
        ));
        (registry, bootnodes, Arc::new(DialQueue::new(bus)), bootnode)
    }

    #[test]
    fn enqueues_bootnode_when_below_minimum() {
        let (registry, bootnodes, queue, bootnode) = setup();
        let maintainer = PeerMaintainer::new(
            1,
            registry,
            Some(bootnodes),
            queue.clone(),
            CancellationToken::new(),
        );
        maintainer.maintain();
        assert!(queue.contains(&bootnode));
    }

    #[test]
    fn does_nothing_once_minimum_is_met() {
        let (registry, bootnodes, queue, _bootnode) = setup();
        registry.add_peer(
            PeerId::random(),
            AddrInfo::new(PeerId::random(), vec![]),
            crate::types::Direction::Outbound,
        );
        let maintainer = PeerMaintainer::new(
            1,
            registry,
            Some(bootnodes),
            queue.clone(),
            CancellationToken::new(),
        );
        maintainer.maintain();
        assert!(queue.is_empty());
    }

    #[test]
    fn does_nothing_without_discovery() {
        let (registry, _bootnodes, queue, _bootnode) = setup();
        let maintainer =
            PeerMaintainer::new(1, registry, None, queue.clone(), CancellationToken::new());
        maintainer.maintain();
        assert!(queue.is_empty());
    }
}
