//! Payment state manager (§4.2): per-payment serialization, transition
//! validation, cache/store coherence, and post-transition notification
//! hand-off.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

use crate::audit::{AuditEvent, AuditSink};
use crate::error::GatewayError;
use crate::metrics::MetricsSink;
use crate::observer::DeadlockObserver;
use crate::payment::lock::LockRegistry;
use crate::payment::model::{Payment, PaymentId};
use crate::payment::status::PaymentStatus;
use crate::payment::store::{PaymentStore, UpdateOutcome};
use crate::retry::engine::{CancellationToken, RetryEngine, RetryError};
use crate::retry::policy::RetryPolicy;
use crate::webhook::WebhookDispatcher;

/// Inbound transition request. `team_slug` is mandatory — §9's Open
/// Question #2 replaces the source's legacy empty-slug convention with an
/// explicit `suppress_webhook` opt-out, so tests that don't want a webhook
/// fired don't have to fake a slug to get there.
pub struct TransitionRequest {
    pub payment_id: PaymentId,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub team_slug: String,
    pub suppress_webhook: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Success,
    /// Rejected by the static transition table or a state mismatch.
    /// `observed` carries the authoritative status when known (§4.2 step
    /// 4's "current status mismatch" case).
    Rejected {
        reason: GatewayError,
        observed: Option<PaymentStatus>,
    },
    /// The lock, store, or retry engine failed in a way that is not a
    /// rejection — the caller should treat this as retryable upstream.
    Failed { reason: GatewayError },
}

impl TransitionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionOutcome::Success)
    }
}

pub struct PaymentManager {
    store: Arc<dyn PaymentStore>,
    cache: DashMap<PaymentId, PaymentStatus>,
    locks: Arc<LockRegistry>,
    retry: Arc<RetryEngine>,
    observer: Arc<DeadlockObserver>,
    dispatcher: Arc<WebhookDispatcher>,
    metrics: Arc<dyn MetricsSink>,
    audit: Arc<dyn AuditSink>,
}

impl PaymentManager {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        locks: Arc<LockRegistry>,
        retry: Arc<RetryEngine>,
        observer: Arc<DeadlockObserver>,
        dispatcher: Arc<WebhookDispatcher>,
        metrics: Arc<dyn MetricsSink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            locks,
            retry,
            observer,
            dispatcher,
            metrics,
            audit,
        }
    }

    /// Create a brand-new payment in `INIT` status and seed the cache.
    pub async fn create(&self, payment: Payment) -> Result<(), GatewayError> {
        self.store.create(payment.clone()).await?;
        self.cache.insert(payment.id, payment.status);
        Ok(())
    }

    /// §4.2 `try_transition`: acquire the per-payment lock, validate and
    /// apply the transition, release the lock, then (outside the lock)
    /// dispatch the terminal notification.
    pub async fn try_transition(&self, req: TransitionRequest) -> TransitionOutcome {
        let holder = format!("txn:{}", uuid::Uuid::new_v4());

        if self.observer.on_request(&holder, &req.payment_id).is_some() {
            self.metrics.record_deadlock_detected();
        }
        let guard = match self.locks.acquire(&req.payment_id).await {
            Ok(guard) => guard,
            Err(e) => {
                self.observer.on_released(&holder, &req.payment_id);
                self.metrics.record_lock_wait_timeout();
                return TransitionOutcome::Failed { reason: e };
            }
        };
        self.observer.on_acquired(&holder, &req.payment_id);

        let outcome = self.transition_locked(&req).await;

        self.observer.on_released(&holder, &req.payment_id);
        drop(guard);

        self.metrics.record_transition(match &outcome {
            TransitionOutcome::Success => "success",
            TransitionOutcome::Rejected { .. } => "rejected",
            TransitionOutcome::Failed { .. } => "failed",
        });

        self.audit
            .record(AuditEvent {
                team_slug: req.team_slug.clone(),
                payment_id: Some(req.payment_id.clone()),
                from_status: Some(req.from.wire_name().to_string()),
                to_status: Some(req.to.wire_name().to_string()),
                outcome: match &outcome {
                    TransitionOutcome::Success => "success".to_string(),
                    TransitionOutcome::Rejected { reason, .. } => format!("rejected:{}", reason.code()),
                    TransitionOutcome::Failed { reason } => format!("failed:{}", reason.code()),
                },
            })
            .await;

        if outcome.is_success() && !req.suppress_webhook {
            let notification_url = self
                .store
                .get_by_payment_id(&req.payment_id)
                .await
                .and_then(|p| p.notification_url);
            self.dispatcher
                .notify(&req.payment_id, &req.team_slug, req.to, notification_url.as_deref())
                .await;
        }

        outcome
    }

    async fn transition_locked(&self, req: &TransitionRequest) -> TransitionOutcome {
        if !req.from.can_transition_to(req.to) {
            return TransitionOutcome::Rejected {
                reason: GatewayError::InvalidTransition,
                observed: None,
            };
        }

        let authoritative = match self.cache.get(&req.payment_id).map(|s| *s) {
            Some(status) => status,
            None => match self.store.get_by_payment_id(&req.payment_id).await {
                Some(payment) => {
                    self.cache.insert(req.payment_id.clone(), payment.status);
                    payment.status
                }
                None => {
                    return TransitionOutcome::Failed {
                        reason: GatewayError::PersistenceFailed("payment not found".into()),
                    }
                }
            },
        };

        if authoritative != req.from {
            return TransitionOutcome::Rejected {
                reason: GatewayError::StateMismatch,
                observed: Some(authoritative),
            };
        }

        let store = Arc::clone(&self.store);
        let id = req.payment_id.clone();
        let from = req.from;
        let to = req.to;
        let op_id = format!("update_status:{id}");
        let cancel = CancellationToken::new();

        let result = self
            .retry
            .execute_with_policy(
                &op_id,
                RetryPolicy::default_policy(),
                || {
                    let store = Arc::clone(&store);
                    let id = id.clone();
                    async move {
                        match store.update_status(&id, from, to, Utc::now()).await {
                            UpdateOutcome::Ok => Ok(()),
                            UpdateOutcome::Conflict { .. } => Err(GatewayError::StateMismatch),
                            UpdateOutcome::TransientError(msg) => Err(GatewayError::PersistenceFailed(msg)),
                            UpdateOutcome::PermanentError(msg) => Err(GatewayError::PersistenceFailed(msg)),
                        }
                    }
                },
                &cancel,
            )
            .await;

        match result {
            Ok(()) => {
                self.cache.insert(req.payment_id.clone(), req.to);
                TransitionOutcome::Success
            }
            Err(RetryError::Exhausted(GatewayError::StateMismatch)) => TransitionOutcome::Rejected {
                reason: GatewayError::StateMismatch,
                observed: None,
            },
            Err(RetryError::Exhausted(reason)) => TransitionOutcome::Failed { reason },
            Err(RetryError::Cancelled) => TransitionOutcome::Failed {
                reason: GatewayError::Internal("transition cancelled".into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::store::InMemoryPaymentStore;
    use crate::webhook::{GenericRouter, WebhookEnvelope, WebhookSender};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct NoopSender;
    #[async_trait]
    impl WebhookSender for NoopSender {
        async fn send(&self, _url: &str, _e: &WebhookEnvelope, _sig: Option<&str>) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn manager() -> PaymentManager {
        let store: Arc<dyn PaymentStore> = Arc::new(InMemoryPaymentStore::new());
        let retry = Arc::new(RetryEngine::new(Duration::from_secs(3600)));
        let observer = Arc::new(DeadlockObserver::new(10, false, Duration::from_secs(120)));
        let locks = Arc::new(LockRegistry::new(Duration::from_secs(5)));
        let dispatcher = Arc::new(WebhookDispatcher::new(Arc::new(NoopSender), Arc::new(GenericRouter), retry.clone()));
        PaymentManager::new(
            store,
            locks,
            retry,
            observer,
            dispatcher,
            Arc::new(crate::metrics::NoopMetricsSink),
            Arc::new(crate::audit::TracingAuditSink),
        )
    }

    fn sample(id: &str) -> Payment {
        Payment::new_init(id.into(), "acme".into(), 1000, "USD".into(), "fp".into(), None)
    }

    #[tokio::test]
    async fn valid_transition_succeeds_and_updates_cache() {
        let mgr = manager();
        mgr.create(sample("P1")).await.unwrap();

        let outcome = mgr
            .try_transition(TransitionRequest {
                payment_id: "P1".into(),
                from: PaymentStatus::Init,
                to: PaymentStatus::New,
                team_slug: "acme".into(),
                suppress_webhook: true,
            })
            .await;

        assert_eq!(outcome, TransitionOutcome::Success);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_without_touching_store() {
        let mgr = manager();
        mgr.create(sample("P1")).await.unwrap();

        let outcome = mgr
            .try_transition(TransitionRequest {
                payment_id: "P1".into(),
                from: PaymentStatus::Init,
                to: PaymentStatus::Confirmed,
                team_slug: "acme".into(),
                suppress_webhook: true,
            })
            .await;

        assert_eq!(
            outcome,
            TransitionOutcome::Rejected {
                reason: GatewayError::InvalidTransition,
                observed: None,
            }
        );
    }

    #[tokio::test]
    async fn state_mismatch_reports_observed_status() {
        let mgr = manager();
        mgr.create(sample("P1")).await.unwrap();

        let outcome = mgr
            .try_transition(TransitionRequest {
                payment_id: "P1".into(),
                from: PaymentStatus::New,
                to: PaymentStatus::FormShowed,
                team_slug: "acme".into(),
                suppress_webhook: true,
            })
            .await;

        assert_eq!(
            outcome,
            TransitionOutcome::Rejected {
                reason: GatewayError::StateMismatch,
                observed: Some(PaymentStatus::Init),
            }
        );
    }

    #[tokio::test]
    async fn unknown_payment_fails_rather_than_rejects() {
        let mgr = manager();
        let outcome = mgr
            .try_transition(TransitionRequest {
                payment_id: "missing".into(),
                from: PaymentStatus::Init,
                to: PaymentStatus::New,
                team_slug: "acme".into(),
                suppress_webhook: true,
            })
            .await;
        assert!(matches!(outcome, TransitionOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn concurrent_transitions_on_same_payment_are_serialized() {
        let mgr = Arc::new(manager());
        mgr.create(sample("P1")).await.unwrap();
        let successes = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..5 {
            let mgr = mgr.clone();
            let successes = successes.clone();
            handles.push(tokio::spawn(async move {
                let outcome = mgr
                    .try_transition(TransitionRequest {
                        payment_id: "P1".into(),
                        from: PaymentStatus::Init,
                        to: PaymentStatus::New,
                        team_slug: "acme".into(),
                        suppress_webhook: true,
                    })
                    .await;
                if outcome.is_success() {
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(successes.load(Ordering::SeqCst), 1, "only one Init->New should win");
    }
}
