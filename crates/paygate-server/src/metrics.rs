//! Prometheus metrics (§9.5), grounded on
//! `tempo-x402-facilitator::metrics`'s `LazyLock<IntCounterVec>`
//! registration pattern.

use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use std::sync::LazyLock;

use paygate_core::metrics::MetricsSink;

static AUTH_OUTCOMES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "paygate_auth_outcomes_total",
        "Authentication attempts by outcome kind",
        &["kind"]
    )
    .unwrap()
});

static LOCKOUTS_TRIGGERED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "paygate_lockouts_triggered_total",
        "Progressive lockouts triggered",
        &["_unused"]
    )
    .unwrap()
});

static TRANSITIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "paygate_transitions_total",
        "Payment state transitions by result",
        &["result"]
    )
    .unwrap()
});

static RETRY_ATTEMPTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "paygate_retry_attempts_total",
        "Retry engine attempts by error category and success",
        &["category", "success"]
    )
    .unwrap()
});

static WEBHOOK_DELIVERIES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "paygate_webhook_deliveries_total",
        "Webhook deliveries by result",
        &["result"]
    )
    .unwrap()
});

static DEADLOCKS_DETECTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "paygate_deadlocks_detected_total",
        "Deadlock cycles detected by the lock observer",
        &["_unused"]
    )
    .unwrap()
});

static LOCK_WAIT_TIMEOUTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "paygate_lock_wait_timeouts_total",
        "Per-payment lock acquisitions that timed out",
        &["_unused"]
    )
    .unwrap()
});

pub fn metrics_output() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// [`MetricsSink`] backed by the process-global `prometheus` registry.
pub struct PrometheusMetricsSink;

impl MetricsSink for PrometheusMetricsSink {
    fn record_auth_outcome(&self, kind: &str) {
        AUTH_OUTCOMES.with_label_values(&[kind]).inc();
    }

    fn record_lockout_triggered(&self) {
        LOCKOUTS_TRIGGERED.with_label_values(&["triggered"]).inc();
    }

    fn record_transition(&self, result: &str) {
        TRANSITIONS.with_label_values(&[result]).inc();
    }

    fn record_retry_attempt(&self, category: &str, success: bool) {
        RETRY_ATTEMPTS
            .with_label_values(&[category, if success { "true" } else { "false" }])
            .inc();
    }

    fn record_webhook_delivery(&self, result: &str) {
        WEBHOOK_DELIVERIES.with_label_values(&[result]).inc();
    }

    fn record_deadlock_detected(&self) {
        DEADLOCKS_DETECTED.with_label_values(&["detected"]).inc();
    }

    fn record_lock_wait_timeout(&self) {
        LOCK_WAIT_TIMEOUTS.with_label_values(&["timeout"]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_outcomes_does_not_panic_and_output_contains_metric_name() {
        let sink = PrometheusMetricsSink;
        sink.record_auth_outcome("success");
        sink.record_transition("success");
        let output = metrics_output();
        assert!(output.contains("paygate_auth_outcomes_total"));
        assert!(output.contains("paygate_transitions_total"));
    }
}
