//! Retry engine: selects a policy from the failing error's category, backs
//! off between attempts, and records every attempt for observability
//! (§4.3 "Attempt accounting").

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::GatewayError;
use crate::metrics::{MetricsSink, NoopMetricsSink};
use crate::retry::category::{classify, ErrorCategory};
use crate::retry::policy::RetryPolicy;

/// Cooperative cancellation signal observed between retry attempts and
/// during backoff sleeps (§5 "Cancellation & timeouts"), and shared by the
/// background maintenance sweeps (§9 "Async/task composition").
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<(AtomicBool, tokio::sync::Notify)>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0 .0.store(true, Ordering::SeqCst);
        self.0 .1.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0 .0.load(Ordering::SeqCst)
    }

    pub(crate) async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.0 .1.notified().await;
    }
}

/// A single retry attempt, recorded for audit/observability.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub operation_id: String,
    pub attempt: u32,
    pub category: Option<ErrorCategory>,
    pub error_kind: Option<String>,
    pub delay: Duration,
    pub success: bool,
    pub timestamp_secs: u64,
}

/// Why [`RetryEngine::execute`] did not return a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// The last allowed attempt failed with this error.
    Exhausted(GatewayError),
    /// Cancelled before completing.
    Cancelled,
}

/// Retries an operation per §4.3's category → policy table, recording
/// every attempt and purging records past the configured retention window.
pub struct RetryEngine {
    records: DashMap<String, Vec<AttemptRecord>>,
    retention: Duration,
    metrics: Arc<dyn MetricsSink>,
}

impl RetryEngine {
    pub fn new(retention: Duration) -> Self {
        Self {
            records: DashMap::new(),
            retention,
            metrics: Arc::new(NoopMetricsSink),
        }
    }

    /// Route per-attempt outcomes to `metrics` instead of the default
    /// no-op sink (§9.5 "retry attempts by category/outcome").
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Spawn the retention-window GC as a cooperative background task
    /// (§4.3 "Records older than a retention window are purged", §9).
    pub fn start_purge(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "purged expired retry attempt records");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn push(&self, rec: AttemptRecord) {
        self.records
            .entry(rec.operation_id.clone())
            .or_default()
            .push(rec);
    }

    /// Drop attempt records older than the retention window. Returns how
    /// many were removed.
    pub fn purge_expired(&self) -> usize {
        let cutoff = Self::now_secs().saturating_sub(self.retention.as_secs());
        let mut removed = 0;
        self.records.retain(|_, recs| {
            let before = recs.len();
            recs.retain(|r| r.timestamp_secs >= cutoff);
            removed += before - recs.len();
            !recs.is_empty()
        });
        removed
    }

    pub fn attempts_for(&self, operation_id: &str) -> Vec<AttemptRecord> {
        self.records
            .get(operation_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Execute `op`, retrying per the policy selected for each failure's
    /// category, until success, a `Permanent` error, attempt exhaustion, or
    /// cancellation. Between attempts the caller observes cancellation
    /// promptly instead of sleeping out the full backoff (§5).
    pub async fn execute<F, Fut, T>(
        &self,
        operation_id: &str,
        op: F,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.execute_with(operation_id, RetryPolicy::for_category, op, cancel).await
    }

    /// Execute `op` under a caller-supplied `policy` regardless of the
    /// failing error's category, except that a `Permanent`-classified error
    /// still bypasses retry entirely (§4.3 "Only `Permanent` errors bypass
    /// retry entirely"). Used by callers whose operation runs under a fixed
    /// policy rather than a per-error-category one (e.g. §8 S7's store
    /// update under the Default policy).
    pub async fn execute_with_policy<F, Fut, T>(
        &self,
        operation_id: &str,
        policy: RetryPolicy,
        op: F,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.execute_with(operation_id, move |_| policy, op, cancel).await
    }

    async fn execute_with<F, Fut, T>(
        &self,
        operation_id: &str,
        resolve_policy: impl Fn(ErrorCategory) -> RetryPolicy,
        op: F,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            match op().await {
                Ok(value) => {
                    self.push(AttemptRecord {
                        operation_id: operation_id.to_string(),
                        attempt,
                        category: None,
                        error_kind: None,
                        delay: Duration::ZERO,
                        success: true,
                        timestamp_secs: Self::now_secs(),
                    });
                    self.metrics.record_retry_attempt("none", true);
                    return Ok(value);
                }
                Err(err) => {
                    let category = classify(&err);
                    let policy = resolve_policy(category);
                    let exhausted =
                        category == ErrorCategory::Permanent || attempt >= policy.max_attempts;
                    let delay = if exhausted {
                        Duration::ZERO
                    } else {
                        policy.delay_for_attempt(attempt)
                    };

                    self.push(AttemptRecord {
                        operation_id: operation_id.to_string(),
                        attempt,
                        category: Some(category),
                        error_kind: Some(err.to_string()),
                        delay,
                        success: false,
                        timestamp_secs: Self::now_secs(),
                    });
                    self.metrics.record_retry_attempt(category.label(), false);

                    if exhausted {
                        return Err(RetryError::Exhausted(err));
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn succeeds_immediately_without_retry() {
        let engine = RetryEngine::new(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let result = engine
            .execute("op", || async { Ok::<_, GatewayError>(42) }, &cancel)
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(engine.attempts_for("op").len(), 1);
    }

    #[tokio::test]
    async fn permanent_error_bypasses_retry() {
        let engine = RetryEngine::new(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result = engine
            .execute(
                "op",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(GatewayError::InvalidTransition) }
                },
                &cancel,
            )
            .await;
        assert!(matches!(
            result,
            Err(RetryError::Exhausted(GatewayError::InvalidTransition))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_attempt_cap() {
        let engine = RetryEngine::new(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result = engine
            .execute(
                "op",
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(GatewayError::PersistenceFailed("timeout".into()))
                        } else {
                            Ok(())
                        }
                    }
                },
                &cancel,
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let engine = RetryEngine::new(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine
            .execute("op", || async { Ok::<_, GatewayError>(()) }, &cancel)
            .await;
        assert_eq!(result.unwrap_err(), RetryError::Cancelled);
    }

    #[test]
    fn purge_expired_drops_old_records_only() {
        let engine = RetryEngine::new(Duration::from_secs(0));
        engine.push(AttemptRecord {
            operation_id: "op".into(),
            attempt: 1,
            category: None,
            error_kind: None,
            delay: Duration::ZERO,
            success: true,
            timestamp_secs: 0,
        });
        let removed = engine.purge_expired();
        assert_eq!(removed, 1);
        assert!(engine.attempts_for("op").is_empty());
    }
}
