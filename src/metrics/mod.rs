//! Prometheus metrics for msghub
//!
//! Exposed by the HTTP server at /metrics when enabled in the config.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// All hub metrics in one place
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Connection metrics
    pub connections_total: IntCounter,
    pub connections_current: IntGauge,
    pub sessions_closed_total: IntCounter,

    // Topic metrics
    pub topics_current: IntGauge,
    pub subscriptions_total: IntCounter,

    // Publish/fan-out metrics
    pub messages_published_total: IntCounter,
    pub deliveries_dispatched_total: IntCounter,
    pub delivery_failures_total: IntCounter,

    // Replay buffer
    pub replay_dropped_total: IntCounter,
    pub replay_rejected_total: IntCounter,

    // HTTP API
    pub http_requests_total: IntCounterVec,
}

fn counter(name: &str, help: &str) -> prometheus::Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
}

fn gauge(name: &str, help: &str) -> prometheus::Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let connections_total = counter(
            "msghub_connections_total",
            "Total number of WebSocket sessions since startup",
        )?;
        let connections_current = gauge(
            "msghub_connections_current",
            "Current number of open WebSocket sessions",
        )?;
        let sessions_closed_total = counter(
            "msghub_sessions_closed_total",
            "Total sessions torn down after a transport error or close",
        )?;

        let topics_current = gauge(
            "msghub_topics_current",
            "Topics created across all hubs",
        )?;
        let subscriptions_total = counter(
            "msghub_subscriptions_total",
            "Total topic subscriptions since startup",
        )?;

        let messages_published_total = counter(
            "msghub_messages_published_total",
            "Total messages published to a topic",
        )?;
        let deliveries_dispatched_total = counter(
            "msghub_deliveries_dispatched_total",
            "Total deliveries handed to the fan-out pool",
        )?;
        let delivery_failures_total = counter(
            "msghub_delivery_failures_total",
            "Total deliveries that failed to write",
        )?;

        let replay_dropped_total = counter(
            "msghub_replay_dropped_total",
            "Oldest replay entries evicted because a topic buffer was full",
        )?;
        let replay_rejected_total = counter(
            "msghub_replay_rejected_total",
            "Messages that could not be buffered after eviction",
        )?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("msghub_http_requests_total", "HTTP API requests by endpoint"),
            &["endpoint"],
        )?;

        registry.register(Box::new(connections_total.clone()))?;
        registry.register(Box::new(connections_current.clone()))?;
        registry.register(Box::new(sessions_closed_total.clone()))?;
        registry.register(Box::new(topics_current.clone()))?;
        registry.register(Box::new(subscriptions_total.clone()))?;
        registry.register(Box::new(messages_published_total.clone()))?;
        registry.register(Box::new(deliveries_dispatched_total.clone()))?;
        registry.register(Box::new(delivery_failures_total.clone()))?;
        registry.register(Box::new(replay_dropped_total.clone()))?;
        registry.register(Box::new(replay_rejected_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            connections_current,
            sessions_closed_total,
            topics_current,
            subscriptions_total,
            messages_published_total,
            deliveries_dispatched_total,
            delivery_failures_total,
            replay_dropped_total,
            replay_rejected_total,
            http_requests_total,
        })
    }

    pub fn session_opened(&self) {
        self.connections_total.inc();
        self.connections_current.inc();
    }

    pub fn session_closed(&self) {
        self.connections_current.dec();
        self.sessions_closed_total.inc();
    }

    pub fn topic_created(&self) {
        self.topics_current.inc();
    }

    pub fn subscription_added(&self) {
        self.subscriptions_total.inc();
    }

    pub fn message_published(&self, deliveries: usize) {
        self.messages_published_total.inc();
        self.deliveries_dispatched_total.inc_by(deliveries as u64);
    }

    pub fn delivery_failed(&self) {
        self.delivery_failures_total.inc();
    }

    pub fn replay_dropped(&self) {
        self.replay_dropped_total.inc();
    }

    pub fn replay_rejected(&self) {
        self.replay_rejected_total.inc();
    }

    pub fn http_request(&self, endpoint: &str) {
        self.http_requests_total
            .with_label_values(&[endpoint])
            .inc();
    }

    /// Render the registry in the Prometheus text format
    pub fn encode(&self) -> Result<(String, Vec<u8>), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_encode() {
        let metrics = Metrics::new().unwrap();
        metrics.session_opened();
        metrics.message_published(3);
        metrics.http_request("pub");

        let (content_type, body) = metrics.encode().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("msghub_connections_current 1"));
        assert!(text.contains("msghub_deliveries_dispatched_total 3"));
        assert!(text.contains("msghub_http_requests_total{endpoint=\"pub\"} 1"));
    }

    #[test]
    fn test_session_closed_decrements_current() {
        let metrics = Metrics::new().unwrap();
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();
        assert_eq!(metrics.connections_current.get(), 1);
        assert_eq!(metrics.sessions_closed_total.get(), 1);
    }
}
