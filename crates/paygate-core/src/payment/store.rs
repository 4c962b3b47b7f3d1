//! The durable payment repository contract (§6 "Store contract
//! (consumed)"). The core treats the store as an external collaborator;
//! [`InMemoryPaymentStore`] and [`SqlitePaymentStore`] are reference
//! implementations (grounded on `tempo-x402::nonce_store`'s dual
//! in-memory/SQLite pattern) so the workspace is runnable and testable
//! without a production database.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Mutex;

use crate::payment::model::{Payment, PaymentId};
use crate::payment::status::PaymentStatus;

/// Outcome of a conditional status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Ok,
    /// The store's current status did not match the expected status.
    Conflict { observed: PaymentStatus },
    TransientError(String),
    PermanentError(String),
}

/// Narrow capability interface for the durable payment repository.
/// Implementations are assumed conditionally atomic (§6).
#[async_trait::async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get_by_payment_id(&self, id: &str) -> Option<Payment>;

    async fn update_status(
        &self,
        id: &str,
        expected_status: PaymentStatus,
        new_status: PaymentStatus,
        updated_at: DateTime<Utc>,
    ) -> UpdateOutcome;

    /// Create a brand-new payment record in `INIT` status. Not part of
    /// spec.md's store contract verbatim (which only covers reads and
    /// conditional updates) but required for the "init" request to have
    /// somewhere to persist to; see `DESIGN.md`.
    async fn create(&self, payment: Payment) -> Result<(), crate::error::GatewayError>;
}

/// In-memory reference store. Fast, not durable across restarts.
#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: DashMap<PaymentId, Payment>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn get_by_payment_id(&self, id: &str) -> Option<Payment> {
        self.payments.get(id).map(|p| p.clone())
    }

    async fn update_status(
        &self,
        id: &str,
        expected_status: PaymentStatus,
        new_status: PaymentStatus,
        updated_at: DateTime<Utc>,
    ) -> UpdateOutcome {
        match self.payments.get_mut(id) {
            None => UpdateOutcome::PermanentError("payment not found".into()),
            Some(mut entry) => {
                if entry.status != expected_status {
                    return UpdateOutcome::Conflict {
                        observed: entry.status,
                    };
                }
                entry.status = new_status;
                entry.updated_at = updated_at;
                UpdateOutcome::Ok
            }
        }
    }

    async fn create(&self, payment: Payment) -> Result<(), crate::error::GatewayError> {
        self.payments.insert(payment.id.clone(), payment);
        Ok(())
    }
}

/// SQLite-backed reference store. Survives restarts.
pub struct SqlitePaymentStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqlitePaymentStore {
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                team_slug TEXT NOT NULL,
                amount INTEGER NOT NULL,
                currency TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                idempotency_fingerprint TEXT NOT NULL,
                notification_url TEXT
            );
            PRAGMA journal_mode=WAL;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_payment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Payment> {
        let status_str: String = row.get(4)?;
        let status = PaymentStatus::from_wire(&status_str).unwrap_or(PaymentStatus::Init);
        Ok(Payment {
            id: row.get(0)?,
            team_slug: row.get(1)?,
            amount: row.get(2)?,
            currency: row.get(3)?,
            status,
            created_at: row.get::<_, String>(5)?.parse().unwrap_or_default(),
            updated_at: row.get::<_, String>(6)?.parse().unwrap_or_default(),
            idempotency_fingerprint: row.get(7)?,
            notification_url: row.get(8)?,
        })
    }
}

#[async_trait::async_trait]
impl PaymentStore for SqlitePaymentStore {
    async fn get_by_payment_id(&self, id: &str) -> Option<Payment> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, team_slug, amount, currency, status, created_at, updated_at,
                    idempotency_fingerprint, notification_url
             FROM payments WHERE id = ?1",
            [id],
            Self::row_to_payment,
        )
        .ok()
    }

    async fn update_status(
        &self,
        id: &str,
        expected_status: PaymentStatus,
        new_status: PaymentStatus,
        updated_at: DateTime<Utc>,
    ) -> UpdateOutcome {
        let conn = self.conn.lock().unwrap();
        let current: Option<String> = conn
            .query_row("SELECT status FROM payments WHERE id = ?1", [id], |r| r.get(0))
            .ok();

        let Some(current) = current else {
            return UpdateOutcome::PermanentError("payment not found".into());
        };
        if current != expected_status.wire_name() {
            let observed = PaymentStatus::from_wire(&current).unwrap_or(PaymentStatus::Init);
            return UpdateOutcome::Conflict { observed };
        }

        match conn.execute(
            "UPDATE payments SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            rusqlite::params![
                new_status.wire_name(),
                updated_at.to_rfc3339(),
                id,
                expected_status.wire_name()
            ],
        ) {
            Ok(0) => UpdateOutcome::Conflict {
                observed: PaymentStatus::from_wire(&current).unwrap_or(PaymentStatus::Init),
            },
            Ok(_) => UpdateOutcome::Ok,
            Err(e) => UpdateOutcome::TransientError(e.to_string()),
        }
    }

    async fn create(&self, payment: Payment) -> Result<(), crate::error::GatewayError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO payments (id, team_slug, amount, currency, status, created_at,
                                    updated_at, idempotency_fingerprint, notification_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                payment.id,
                payment.team_slug,
                payment.amount,
                payment.currency,
                payment.status.wire_name(),
                payment.created_at.to_rfc3339(),
                payment.updated_at.to_rfc3339(),
                payment.idempotency_fingerprint,
                payment.notification_url,
            ],
        )
        .map_err(|e| crate::error::GatewayError::PersistenceFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> Payment {
        Payment::new_init(id.into(), "acme".into(), 1000, "USD".into(), "fp".into(), None)
    }

    #[tokio::test]
    async fn in_memory_round_trips_a_payment() {
        let store = InMemoryPaymentStore::new();
        store.create(sample("P1")).await.unwrap();
        let p = store.get_by_payment_id("P1").await.unwrap();
        assert_eq!(p.status, PaymentStatus::Init);
    }

    #[tokio::test]
    async fn in_memory_update_status_conflict_reports_observed() {
        let store = InMemoryPaymentStore::new();
        store.create(sample("P1")).await.unwrap();
        let outcome = store
            .update_status("P1", PaymentStatus::Confirmed, PaymentStatus::New, Utc::now())
            .await;
        assert_eq!(
            outcome,
            UpdateOutcome::Conflict {
                observed: PaymentStatus::Init
            }
        );
    }

    #[tokio::test]
    async fn in_memory_update_status_ok_on_match() {
        let store = InMemoryPaymentStore::new();
        store.create(sample("P1")).await.unwrap();
        let outcome = store
            .update_status("P1", PaymentStatus::Init, PaymentStatus::New, Utc::now())
            .await;
        assert_eq!(outcome, UpdateOutcome::Ok);
        assert_eq!(
            store.get_by_payment_id("P1").await.unwrap().status,
            PaymentStatus::New
        );
    }

    #[tokio::test]
    async fn sqlite_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payments.db");
        {
            let store = SqlitePaymentStore::open(path.to_str().unwrap()).unwrap();
            store.create(sample("P1")).await.unwrap();
        }
        let store = SqlitePaymentStore::open(path.to_str().unwrap()).unwrap();
        let p = store.get_by_payment_id("P1").await.unwrap();
        assert_eq!(p.status, PaymentStatus::Init);
    }

    #[tokio::test]
    async fn sqlite_update_status_conflict_reports_observed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payments.db");
        let store = SqlitePaymentStore::open(path.to_str().unwrap()).unwrap();
        store.create(sample("P1")).await.unwrap();
        let outcome = store
            .update_status("P1", PaymentStatus::Confirmed, PaymentStatus::New, Utc::now())
            .await;
        assert_eq!(
            outcome,
            UpdateOutcome::Conflict {
                observed: PaymentStatus::Init
            }
        );
    }
}
