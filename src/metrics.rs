//! Metrics sink. The core only needs a small
//! capability set; the concrete sink is an external collaborator.

use crate::types::Direction;

pub trait Metrics: Send + Sync {
    fn record_peer_counts(&self, num_peers: usize, active_inbound: i64, active_outbound: i64);
    fn record_dial_outcome(&self, direction: Direction, success: bool);
    fn record_subscription_drop(&self);
}

/// Default sink: discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl Metrics for NullMetrics {
    fn record_peer_counts(&self, _num_peers: usize, _active_inbound: i64, _active_outbound: i64) {}
    fn record_dial_outcome(&self, _direction: Direction, _success: bool) {}
    fn record_subscription_drop(&self) {}
}

/// Prometheus-backed sink (see DESIGN.md for the crate choice).
pub struct PrometheusMetrics {
    peer_count: prometheus::IntGauge,
    active_inbound: prometheus::IntGauge,
    active_outbound: prometheus::IntGauge,
    dial_outcomes: prometheus::IntCounterVec,
    subscription_drops: prometheus::IntCounter,
}

impl PrometheusMetrics {
    pub fn new(registry: &prometheus::Registry) -> Result<Self, prometheus::Error> {
        let peer_count = prometheus::IntGauge::new("p2p_peer_count", "connected peers")?;
        let active_inbound =
            prometheus::IntGauge::new("p2p_active_inbound", "active inbound connections")?;
        let active_outbound =
            prometheus::IntGauge::new("p2p_active_outbound", "active outbound connections")?;
        let dial_outcomes = prometheus::IntCounterVec::new(
            prometheus::Opts::new("p2p_dial_outcomes_total", "dial attempts by direction and outcome"),
            &["direction", "outcome"],
        )?;
        let subscription_drops = prometheus::IntCounter::new(
            "p2p_subscription_drops_total",
            "events dropped due to a slow EventBus subscriber",
        )?;

        registry.register(Box::new(peer_count.clone()))?;
        registry.register(Box::new(active_inbound.clone()))?;
        registry.register(Box::new(active_outbound.clone()))?;
        registry.register(Box::new(dial_outcomes.clone()))?;
        registry.register(Box::new(subscription_drops.clone()))?;

        Ok(Self {
            peer_count,
            active_inbound,
            active_outbound,
            dial_outcomes,
            subscription_drops,
        })
    }
}

impl Metrics for PrometheusMetrics {
    fn record_peer_counts(&self, num_peers: usize, active_inbound: i64, active_outbound: i64) {
        self.peer_count.set(num_peers as i64);
        self.active_inbound.set(active_inbound);
        self.active_outbound.set(active_outbound);
    }

    fn record_dial_outcome(&self, direction: Direction, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.dial_outcomes
            .with_label_values(&[direction.as_str(), outcome])
            .inc();
    }

    fn record_subscription_drop(&self) {
        self.subscription_drops.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_update_the_registered_gauges_and_counters() {
        let registry = prometheus::Registry::new();
        let metrics = PrometheusMetrics::new(&registry).unwrap();

        metrics.record_peer_counts(3, 2, 1);
        assert_eq!(metrics.peer_count.get(), 3);
        assert_eq!(metrics.active_inbound.get(), 2);
        assert_eq!(metrics.active_outbound.get(), 1);

        metrics.record_dial_outcome(Direction::Outbound, true);
        metrics.record_dial_outcome(Direction::Outbound, false);
        assert_eq!(
            metrics
                .dial_outcomes
                .with_label_values(&["outbound", "success"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .dial_outcomes
                .with_label_values(&["outbound", "failure"])
                .get(),
            1
        );

        metrics.record_subscription_drop();
        assert_eq!(metrics.subscription_drops.get(), 1);
    }

    #[test]
    fn registering_the_same_metrics_twice_on_one_registry_fails() {
        let registry = prometheus::Registry::new();
        let _first = PrometheusMetrics::new(&registry).unwrap();
        assert!(PrometheusMetrics::new(&registry).is_err());
    }
}
