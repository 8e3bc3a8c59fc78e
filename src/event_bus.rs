//! In-process publish/subscribe over peer lifecycle events.
//!
//! Backpressure policy: bounded per-subscriber queue, drop-oldest on
//! overflow, with a metric counter. A slow subscriber loses its oldest
//! unread events rather than stalling publishers or the rest of the bus.

use crate::metrics::Metrics;
use crate::types::Event;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::error;

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct SubscriberState {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
}

pub struct EventBus {
    subscribers: Mutex<Vec<Weak<SubscriberState>>>,
    metrics: Arc<dyn Metrics>,
}

/// A typed receiver handle returned by `subscribe()`.
pub struct Subscription {
    state: Arc<SubscriberState>,
}

impl EventBus {
    pub fn new(metrics: Arc<dyn Metrics>) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            metrics,
        }
    }

    /// Non-blocking with respect to subscribers: events are pushed into each
    /// subscriber's bounded queue, dropping the oldest entry on overflow.
    pub fn emit(&self, event: Event) {
        let mut subs = self.subscribers.lock();
        subs.retain(|weak| {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            if state.closed.load(Ordering::Relaxed) {
                return false;
            }
            let mut queue = state.queue.lock();
            if queue.len() >= state.capacity {
                queue.pop_front();
                self.metrics.record_subscription_drop();
                error!("event bus subscriber queue full, dropping oldest event");
            }
            queue.push_back(event.clone());
            drop(queue);
            state.notify.notify_one();
            true
        });
    }

    pub fn subscribe(&self) -> Subscription {
        let state = Arc::new(SubscriberState {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        });
        self.subscribers.lock().push(Arc::downgrade(&state));
        Subscription { state }
    }

    /// Spawns an internal task that invokes `handler` sequentially per
    /// event. A panicking handler is caught and logged; it does not kill the
    /// subscription task.
    pub fn subscribe_fn<F>(&self, mut handler: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(Event) + Send + 'static,
    {
        let mut sub = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = sub.recv().await {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
                if let Err(panic) = result {
                    error!(?panic, "event bus subscriber handler panicked, continuing");
                }
            }
        })
    }
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            {
                let mut queue = self.state.queue.lock();
                if let Some(event) = queue.pop_front() {
                    return Some(event);
                }
            }
            if self.state.closed.load(Ordering::Relaxed) {
                return None;
            }
            self.state.notify.notified().await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.state.closed.store(true, Ordering::Relaxed);
        self.state.notify.notify_waiters();
    }
}
