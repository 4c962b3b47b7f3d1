//! Payment data model (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payment::status::PaymentStatus;

/// Externally assigned payment identifier.
pub type PaymentId = String;

/// A single transactional intent, identified by `id` and owned by a team.
/// Never deleted by the core — terminal statuses are absorbing (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub team_slug: String,
    /// Monetary amount in integer minor units (e.g. cents).
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Fingerprint used to detect duplicate "init" requests.
    pub idempotency_fingerprint: String,
    pub notification_url: Option<String>,
}

impl Payment {
    /// Construct a freshly created payment in its initial state (§4.2).
    pub fn new_init(
        id: PaymentId,
        team_slug: String,
        amount: i64,
        currency: String,
        idempotency_fingerprint: String,
        notification_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            team_slug,
            amount,
            currency,
            status: PaymentStatus::Init,
            created_at: now,
            updated_at: now,
            idempotency_fingerprint,
            notification_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_init_starts_in_init_status() {
        let p = Payment::new_init(
            "P1".into(),
            "acme".into(),
            1000,
            "USD".into(),
            "fp".into(),
            None,
        );
        assert_eq!(p.status, PaymentStatus::Init);
        assert_eq!(p.created_at, p.updated_at);
    }
}
