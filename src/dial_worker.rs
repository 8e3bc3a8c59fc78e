//! Consumes `DialQueue` while outbound slots are free; invokes
//! `Host.connect` and emits outcome events.

use crate::counters::ConnectionCounters;
use crate::dial_queue::{Closed, DialQueue};
use crate::event_bus::EventBus;
use crate::host::Host;
use crate::metrics::Metrics;
use crate::peer_registry::PeerRegistry;
use crate::types::{DialTask, Direction, Event, EventKind};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct DialWorker {
    queue: Arc<DialQueue>,
    counters: Arc<ConnectionCounters>,
    host: Arc<dyn Host>,
    registry: Arc<PeerRegistry>,
    event_bus: Arc<EventBus>,
    metrics: Arc<dyn Metrics>,
    shutdown: CancellationToken,
}

impl DialWorker {
    pub fn new(
        queue: Arc<DialQueue>,
        counters: Arc<ConnectionCounters>,
        host: Arc<dyn Host>,
        registry: Arc<PeerRegistry>,
        event_bus: Arc<EventBus>,
        metrics: Arc<dyn Metrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            counters,
            host,
            registry,
            event_bus,
            metrics,
            shutdown,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        // Subscribes to the events that can free a slot or add new work, so
        // the worker can coalesce wake-ups into a single recheck rather than
        // being driven by the queue alone.
        let mut sub = self.event_bus.subscribe();

        loop {
            while self.counters.has_free_outbound() {
                let task = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return,
                    popped = self.queue.pop() => popped,
                };
                match task {
                    Err(Closed) => return,
                    Ok(task) => self.handle_task(task).await,
                }
            }

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    event = sub.recv() => {
                        match event {
                            None => return,
                            Some(e) if is_wake_event(e.kind) => break,
                            Some(_) => continue,
                        }
                    }
                }
            }
        }
    }

    async fn handle_task(&self, task: DialTask) {
        let peer_id = task.addr_info.peer_id;

        if self.host.is_connected(peer_id) {
            self.event_bus
                .emit(Event::new(peer_id, EventKind::AlreadyConnected));
            return;
        }

        // Strict variant of the check-then-reserve protocol:
        // reserve a pending slot before dialing, release on completion.
        self.counters.update_pending(1, Direction::Outbound);
        let result = self.host.connect(task.addr_info.clone()).await;
        self.counters.update_pending(-1, Direction::Outbound);

        match result {
            Ok(()) => {
                self.metrics.record_dial_outcome(Direction::Outbound, true);
                self.registry
                    .add_peer(peer_id, task.addr_info, Direction::Outbound);
            }
            Err(err) => {
                self.metrics.record_dial_outcome(Direction::Outbound, false);
                debug!(peer_id = %peer_id, %err, "dial failed");
                self.event_bus
                    .emit(Event::new(peer_id, EventKind::FailedToConnect));
            }
        }
        self.event_bus
            .emit(Event::new(peer_id, EventKind::DialCompleted));
    }
}

fn is_wake_event(kind: EventKind) -> bool {
    matches!(
        kind,
        EventKind::Connected
            | EventKind::FailedToConnect
            | EventKind::Disconnected
            | EventKind::DialCompleted
            | EventKind::AddedToDialQueue
    )
}
