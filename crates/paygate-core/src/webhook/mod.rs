//! Outbound status notification composition and delivery (§4.4).
//!
//! The transport itself is an external collaborator (`WebhookSender`);
//! `paygate-server` supplies a concrete `reqwest`-based implementation.
//! Generalized from `tempo-x402-facilitator::webhook`'s fire-and-forget
//! JSON POST into a delivery that runs under the retry engine's `External`
//! policy instead of firing once and giving up.

pub mod signing;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::metrics::{MetricsSink, NoopMetricsSink};
use crate::payment::status::PaymentStatus;
use crate::retry::engine::{CancellationToken, RetryEngine};

/// Wire envelope posted to the merchant's notification URL (§6 "Webhook
/// contract (produced)").
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "paymentId")]
    pub payment_id: String,
    pub status: String,
    #[serde(rename = "teamSlug")]
    pub team_slug: String,
    pub timestamp: String,
    pub extras: Value,
}

/// Narrow capability interface for outbound webhook delivery. The concrete
/// HTTP client is an external collaborator (§1 "out of scope").
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// POST `envelope` to `url`, attaching `signature` as a header when
    /// present. A non-2xx response or transport failure must surface as
    /// [`GatewayError::ExternalUnavailable`] so the retry engine classifies
    /// and retries it.
    async fn send(
        &self,
        url: &str,
        envelope: &WebhookEnvelope,
        signature: Option<&str>,
    ) -> Result<(), GatewayError>;
}

/// Resolves the destination URL for a given outcome. Terminal statuses may
/// route to dedicated per-team endpoints; the default router sends every
/// status to the team's generic notification URL.
pub trait WebhookRouter: Send + Sync {
    fn route(&self, team_slug: &str, status: PaymentStatus, generic_url: &str) -> String;
}

/// Default router: every status uses the generic notification URL.
pub struct GenericRouter;

impl WebhookRouter for GenericRouter {
    fn route(&self, _team_slug: &str, _status: PaymentStatus, generic_url: &str) -> String {
        generic_url.to_string()
    }
}

/// Composes and delivers status notifications. Failures here are logged
/// and metered, never propagated back to the state manager (§4.2 step 6,
/// §7 "webhook failures are never surfaced to request handlers").
pub struct WebhookDispatcher {
    sender: Arc<dyn WebhookSender>,
    router: Arc<dyn WebhookRouter>,
    retry: Arc<RetryEngine>,
    hmac_secret: Option<Vec<u8>>,
    metrics: Arc<dyn MetricsSink>,
}

impl WebhookDispatcher {
    pub fn new(sender: Arc<dyn WebhookSender>, router: Arc<dyn WebhookRouter>, retry: Arc<RetryEngine>) -> Self {
        Self {
            sender,
            router,
            retry,
            hmac_secret: None,
            metrics: Arc::new(NoopMetricsSink),
        }
    }

    /// Sign every delivered envelope with `secret` (§4.4's optional HMAC
    /// signature header).
    pub fn with_hmac_secret(mut self, secret: Vec<u8>) -> Self {
        self.hmac_secret = Some(secret);
        self
    }

    /// Route delivery outcomes to `metrics` instead of the default no-op
    /// sink (§9.5 "webhook deliveries by result").
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn notify(
        &self,
        payment_id: &str,
        team_slug: &str,
        status: PaymentStatus,
        notification_url: Option<&str>,
    ) {
        let Some(generic_url) = notification_url else {
            tracing::debug!(payment_id, "no notification URL configured, skipping webhook");
            return;
        };

        let url = self.router.route(team_slug, status, generic_url);
        let envelope = WebhookEnvelope {
            payment_id: payment_id.to_string(),
            status: status.wire_name().to_string(),
            team_slug: team_slug.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            extras: Value::Object(Default::default()),
        };
        let signature = self.hmac_secret.as_deref().map(|secret| {
            let body = serde_json::to_vec(&envelope).unwrap_or_default();
            signing::compute_signature(secret, &body)
        });

        let sender = Arc::clone(&self.sender);
        let op_id = format!("webhook:{payment_id}:{}", status.wire_name());
        let cancel = CancellationToken::new();
        let result = self
            .retry
            .execute(
                &op_id,
                || {
                    let sender = Arc::clone(&sender);
                    let url = url.clone();
                    let envelope = envelope.clone();
                    let signature = signature.clone();
                    async move { sender.send(&url, &envelope, signature.as_deref()).await }
                },
                &cancel,
            )
            .await;

        match result {
            Ok(()) => {
                tracing::info!(payment_id, status = %status, "webhook delivered");
                self.metrics.record_webhook_delivery("success");
            }
            Err(_) => {
                tracing::warn!(payment_id, status = %status, "webhook delivery exhausted retries");
                self.metrics.record_webhook_delivery("failure");
            }
        }
    }
}
