//! Narrow metrics capability consumed by the core (§9.5). The concrete
//! exporter (`prometheus`) lives in `paygate-server`; the core only needs
//! somewhere to report outcome counts without depending on an exporter
//! crate directly.

/// Capability interface for recording gateway metrics.
pub trait MetricsSink: Send + Sync {
    fn record_auth_outcome(&self, kind: &str);
    fn record_lockout_triggered(&self);
    fn record_transition(&self, result: &str);
    fn record_retry_attempt(&self, category: &str, success: bool);
    fn record_webhook_delivery(&self, result: &str);
    fn record_deadlock_detected(&self);
    fn record_lock_wait_timeout(&self);
}

/// No-op sink for tests and composition roots that don't care about
/// metrics.
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_auth_outcome(&self, _kind: &str) {}
    fn record_lockout_triggered(&self) {}
    fn record_transition(&self, _result: &str) {}
    fn record_retry_attempt(&self, _category: &str, _success: bool) {}
    fn record_webhook_delivery(&self, _result: &str) {}
    fn record_deadlock_detected(&self) {}
    fn record_lock_wait_timeout(&self) {}
}
