//! Nonce and replay-fingerprint storage (§4.1, §3 `TokenUsageRecord`).
//!
//! Generalized from `tempo-x402::nonce_store`'s `NonceStore` trait: the
//! same shape (`is_used` / `record` / `try_use` / `purge_expired`) over an
//! opaque string key instead of a 32-byte on-chain nonce, so the same
//! store backs both nonce validation and replay-fingerprint tracking —
//! callers namespace their keys (`"nonce:{slug}:{nonce}"`,
//! `"replay:{fingerprint}"`) to keep the two independent.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::retry::engine::CancellationToken;

/// Storage backend for replay-protection keys (nonces and replay
/// fingerprints alike). Implementations must be thread-safe.
pub trait ReplayStore: Send + Sync {
    /// Check if `key` has already been recorded.
    fn is_used(&self, key: &str) -> bool;

    /// Record `key` as used.
    fn record(&self, key: &str);

    /// Atomically check-and-record. Returns `true` if `key` was
    /// successfully claimed (was not previously used), `false` if it was
    /// already used (a replay).
    fn try_use(&self, key: &str) -> bool;

    /// Purge entries older than `max_age`. Returns the number purged.
    fn purge_expired(&self, max_age: Duration) -> usize;
}

/// In-memory store backed by `DashMap`. Fast, lost on restart.
#[derive(Default)]
pub struct InMemoryReplayStore {
    entries: DashMap<String, Instant>,
}

impl InMemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplayStore for InMemoryReplayStore {
    fn is_used(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn record(&self, key: &str) {
        self.entries.insert(key.to_string(), Instant::now());
    }

    fn try_use(&self, key: &str) -> bool {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(Instant::now());
                true
            }
        }
    }

    fn purge_expired(&self, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, inserted| inserted.elapsed() < max_age);
        before - self.entries.len()
    }
}

/// Persistent store backed by SQLite. Survives restarts, so replay
/// protection holds across process bounces — the same reasoning the
/// teacher's `SqliteNonceStore` documents.
pub struct SqliteReplayStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteReplayStore {
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS replay_keys (
                key TEXT PRIMARY KEY,
                recorded_at INTEGER NOT NULL
            );
            PRAGMA journal_mode=WAL;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn now_secs() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

impl ReplayStore for SqliteReplayStore {
    fn is_used(&self, key: &str) -> bool {
        let conn = self.conn.lock().unwrap();
        // Fail-secure: a query error is treated as "already used" so a
        // transient database problem can never let a replay through.
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM replay_keys WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .unwrap_or(1);
        count > 0
    }

    fn record(&self, key: &str) {
        let conn = self.conn.lock().unwrap();
        if let Err(e) = conn.execute(
            "INSERT OR IGNORE INTO replay_keys (key, recorded_at) VALUES (?1, ?2)",
            rusqlite::params![key, Self::now_secs()],
        ) {
            tracing::warn!(error = %e, "failed to record replay key");
        }
    }

    fn try_use(&self, key: &str) -> bool {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO replay_keys (key, recorded_at) VALUES (?1, ?2)",
            rusqlite::params![key, Self::now_secs()],
        )
        .is_ok()
    }

    fn purge_expired(&self, max_age: Duration) -> usize {
        let conn = self.conn.lock().unwrap();
        let cutoff = Self::now_secs() - max_age.as_secs() as i64;
        conn.execute("DELETE FROM replay_keys WHERE recorded_at < ?1", [cutoff])
            .unwrap_or(0)
    }
}

/// Spawn a retention-window purge over `store` as a cooperative background
/// task, mirroring the teacher's `start_nonce_cleanup` shape (§4.1, §4.3
/// "Records older than a retention window are purged"). `label` identifies
/// the store in logs (e.g. `"nonce"` vs `"replay"`) since the same
/// `ReplayStore` shape backs both.
pub fn start_replay_purge(
    store: Arc<dyn ReplayStore>,
    max_age: Duration,
    interval: Duration,
    label: &'static str,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = store.purge_expired(max_age);
                    if purged > 0 {
                        tracing::debug!(purged, store = label, "purged expired replay keys");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_try_use_is_atomic_first_wins() {
        let store = InMemoryReplayStore::new();
        assert!(store.try_use("nonce:acme:abc"));
        assert!(!store.try_use("nonce:acme:abc"));
        assert!(store.is_used("nonce:acme:abc"));
    }

    #[test]
    fn in_memory_keys_are_independent() {
        let store = InMemoryReplayStore::new();
        store.record("replay:fp-1");
        assert!(store.is_used("replay:fp-1"));
        assert!(!store.is_used("replay:fp-2"));
    }

    #[test]
    fn sqlite_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.db");
        {
            let store = SqliteReplayStore::open(path.to_str().unwrap()).unwrap();
            store.record("nonce:acme:xyz");
        }
        let store = SqliteReplayStore::open(path.to_str().unwrap()).unwrap();
        assert!(store.is_used("nonce:acme:xyz"));
    }

    #[test]
    fn sqlite_try_use_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.db");
        let store = SqliteReplayStore::open(path.to_str().unwrap()).unwrap();
        assert!(store.try_use("replay:fp-1"));
        assert!(!store.try_use("replay:fp-1"));
    }

    #[test]
    fn sqlite_purge_removes_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.db");
        let store = SqliteReplayStore::open(path.to_str().unwrap()).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO replay_keys (key, recorded_at) VALUES (?1, ?2)",
                rusqlite::params!["old-key", 1000i64],
            )
            .unwrap();
        }
        assert!(store.is_used("old-key"));
        let purged = store.purge_expired(Duration::from_secs(60));
        assert_eq!(purged, 1);
        assert!(!store.is_used("old-key"));
    }
}
