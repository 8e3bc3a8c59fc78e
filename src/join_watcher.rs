//! Per-peer one-shot completion channels with timeout.

use crate::error::JoinError;
use crate::event_bus::EventBus;
use crate::types::{EventKind, PeerId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

pub struct JoinWatcher {
    local_id: PeerId,
    pending: Mutex<HashMap<PeerId, oneshot::Sender<bool>>>,
}

impl JoinWatcher {
    pub fn new(local_id: PeerId) -> Self {
        Self {
            local_id,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for a qualifying event for `peer_id`, or times out. Resolves to
    /// an error both on timeout and on a `FailedToConnect` outcome.
    ///
    /// If two `watch` calls race for the same peer-id, the second replaces
    /// the first; the replaced waiter observes a timeout.
    pub async fn watch(&self, peer_id: PeerId, timeout: Duration) -> Result<(), JoinError> {
        let (tx, rx) = oneshot::channel();
        // Dropping the previous sender (if any) completes the replaced
        // waiter's receiver with an error, which we also surface as a
        // timeout below.
        self.pending.lock().insert(peer_id, tx);

        tokio::select! {
            res = rx => {
                match res {
                    Ok(true) => Ok(()),
                    Ok(false) | Err(_) => Err(JoinError { local: self.local_id, remote: peer_id }),
                }
            }
            _ = tokio::time::sleep(timeout) => {
                self.pending.lock().remove(&peer_id);
                Err(JoinError { local: self.local_id, remote: peer_id })
            }
        }
    }

    fn complete(&self, peer_id: PeerId, success: bool) {
        if let Some(tx) = self.pending.lock().remove(&peer_id) {
            let _ = tx.send(success);
        }
    }

    /// Spawns the task that adapts the bus's event stream into watcher
    /// completions for `{Connected, FailedToConnect, AlreadyConnected}`.
    pub fn spawn_pump(self: &Arc<Self>, bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let watcher = self.clone();
        let mut sub = bus.subscribe();
        tokio::spawn(async move {
            while let Some(event) = sub.recv().await {
                match event.kind {
                    EventKind::Connected | EventKind::AlreadyConnected => {
                        watcher.complete(event.peer_id, true);
                    }
                    EventKind::FailedToConnect => {
                        watcher.complete(event.peer_id, false);
                    }
                    _ => {}
                }
            }
        })
    }
}
