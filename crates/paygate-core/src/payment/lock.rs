//! Per-payment serialization primitive (§4.2 "Synchronization primitives").
//!
//! Generalizes `tempo-x402::scheme_facilitator`'s
//! `payer_locks: DashMap<Address, Arc<Mutex<()>>>` pattern to
//! `DashMap<PaymentId, Arc<tokio::sync::Mutex<()>>>`, including the same
//! idle-lock GC sweep (`start_nonce_cleanup` there, [`LockRegistry::gc`]
//! plus [`LockRegistry::start_gc`] here).

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::GatewayError;
use crate::payment::model::PaymentId;
use crate::retry::engine::CancellationToken;

/// Registry of per-payment mutexes, lazily created on first use and
/// reclaimed once idle.
pub struct LockRegistry {
    locks: Arc<DashMap<PaymentId, Arc<Mutex<()>>>>,
    acquire_timeout: Duration,
}

/// An acquired per-payment lock. Dropping it releases the mutex; the slot
/// itself is reclaimed later by [`LockRegistry::gc`].
pub struct OwnedLockGuard {
    _guard: OwnedMutexGuard<()>,
}

impl LockRegistry {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            acquire_timeout,
        }
    }

    fn slot(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the lock for `payment_id`, bounded by the configured
    /// timeout. Failure to acquire in time is a transient failure, never a
    /// transition rejection (§4.2 step 1).
    pub async fn acquire(&self, payment_id: &str) -> Result<OwnedLockGuard, GatewayError> {
        let mutex = self.slot(payment_id);
        match tokio::time::timeout(self.acquire_timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(OwnedLockGuard { _guard: guard }),
            Err(_) => Err(GatewayError::LockTimeout),
        }
    }

    /// Reclaim any lock slot with no current holder and no outstanding
    /// clone of its `Arc` (§9 "the primitive may be garbage-collected when
    /// no holder is present"), mirroring the teacher's
    /// `Arc::strong_count(lock) > 1 || lock.try_lock().is_err()` retain.
    pub fn gc(&self) -> usize {
        let before = self.locks.len();
        self.locks
            .retain(|_, lock| Arc::strong_count(lock) > 1 || lock.try_lock().is_err());
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Spawn the idle-lock GC as a cooperative background task, mirroring
    /// the teacher's `start_nonce_cleanup` spawn-and-tick shape.
    pub fn start_gc(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reclaimed = self.gc();
                        if reclaimed > 0 {
                            tracing::debug!(reclaimed, "reclaimed idle payment lock slots");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_then_release_allows_reacquire() {
        let registry = LockRegistry::new(Duration::from_millis(100));
        let guard = registry.acquire("P1").await.unwrap();
        drop(guard);
        registry.acquire("P1").await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_acquire_on_same_payment_times_out() {
        let registry = LockRegistry::new(Duration::from_millis(50));
        let _held = registry.acquire("P1").await.unwrap();
        let result = registry.acquire("P1").await;
        assert_eq!(result.unwrap_err(), GatewayError::LockTimeout);
    }

    #[tokio::test]
    async fn different_payments_do_not_contend() {
        let registry = LockRegistry::new(Duration::from_millis(50));
        let _a = registry.acquire("P1").await.unwrap();
        registry.acquire("P2").await.unwrap();
    }

    #[tokio::test]
    async fn gc_reclaims_idle_slots_only() {
        let registry = LockRegistry::new(Duration::from_millis(50));
        let guard = registry.acquire("P1").await.unwrap();
        assert_eq!(registry.gc(), 0, "held lock must not be reclaimed");
        drop(guard);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.gc(), 1);
        assert!(registry.is_empty());
    }
}
