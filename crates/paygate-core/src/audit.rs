//! Audit trail facet (§9.5), grounded on the same "never log a secret"
//! invariant [`crate::auth::team::Team`] enforces for `Debug`. [`AuditSink`]
//! records only non-secret facts about a transition.

use async_trait::async_trait;

/// A single audit-worthy fact. Callers are responsible for never
/// populating this with a secret or raw token.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub team_slug: String,
    pub payment_id: Option<String>,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub outcome: String,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Default implementation: writes audit facts through `tracing`.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(
            team_slug = %event.team_slug,
            payment_id = ?event.payment_id,
            from_status = ?event.from_status,
            to_status = ?event.to_status,
            outcome = %event.outcome,
            "audit"
        );
    }
}
