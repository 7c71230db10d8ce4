//! Prometheus metrics for a fedchain node.
//!
//! Every discard path of the node loop has a counter here, so nothing is
//! dropped silently. [`NodeMetrics`] owns its own [`Registry`]; simulated
//! nodes in one process therefore never collide.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Messages taken off the inbound queue.
    pub messages_received: IntCounter,
    /// Messages dropped as duplicates or outside the replay window.
    pub replay_rejected: IntCounter,
    /// Messages that failed validation.
    pub messages_invalid: IntCounter,
    /// Messages parked in the holding map.
    pub messages_held: IntCounter,
    pub messages_executed: IntCounter,
    /// Executions that failed and left state unchanged.
    pub execution_errors: IntCounter,
    /// Frames that did not decode.
    pub decode_failures: IntCounter,
    pub minutes_closed: IntCounter,
    pub heights_saved: IntCounter,
    pub promotions: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Height currently being built.
    pub current_height: IntGauge,
    pub holding_size: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    register_int_counter_with_registry!(Opts::new(name, help), registry)
        .unwrap_or_else(|e| panic!("failed to register {name} counter: {e}"))
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    register_int_gauge_with_registry!(Opts::new(name, help), registry)
        .unwrap_or_else(|e| panic!("failed to register {name} gauge: {e}"))
}

impl NodeMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let messages_received = counter(
            &registry,
            "fedchain_messages_received_total",
            "Messages dequeued by the node loop",
        );
        let replay_rejected = counter(
            &registry,
            "fedchain_replay_rejected_total",
            "Messages rejected by the replay filter",
        );
        let messages_invalid = counter(
            &registry,
            "fedchain_messages_invalid_total",
            "Messages that failed validation",
        );
        let messages_held = counter(
            &registry,
            "fedchain_messages_held_total",
            "Messages held until their validity is known",
        );
        let messages_executed = counter(
            &registry,
            "fedchain_messages_executed_total",
            "Messages executed against node state",
        );
        let execution_errors = counter(
            &registry,
            "fedchain_execution_errors_total",
            "Executions rejected without changing state",
        );
        let decode_failures = counter(
            &registry,
            "fedchain_decode_failures_total",
            "Inbound frames that failed to decode",
        );
        let minutes_closed = counter(
            &registry,
            "fedchain_minutes_closed_total",
            "Minutes closed by an end-of-minute message",
        );
        let heights_saved = counter(
            &registry,
            "fedchain_heights_saved_total",
            "DBStates written to the block store",
        );
        let promotions = counter(
            &registry,
            "fedchain_promotions_total",
            "Audit servers promoted after a fault",
        );

        let current_height = gauge(
            &registry,
            "fedchain_current_height",
            "Directory-block height being built",
        );
        let holding_size = gauge(
            &registry,
            "fedchain_holding_size",
            "Messages waiting in the holding map",
        );

        Self {
            registry,
            messages_received,
            replay_rejected,
            messages_invalid,
            messages_held,
            messages_executed,
            execution_errors,
            decode_failures,
            minutes_closed,
            heights_saved,
            promotions,
            current_height,
            holding_size,
        }
    }

    /// Text exposition of every metric in the registry.
    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(error = %e, "metrics encoding failed");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
