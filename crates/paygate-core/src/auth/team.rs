//! Team (merchant) model and the narrow store capability the auth
//! pipeline consumes. The team secret is deliberately excluded from
//! `Debug`/`Display` — it must never reach logs, audit entries, error
//! messages, or webhook payloads (§3 invariants).

use chrono::{DateTime, Utc};
use std::fmt;

/// A merchant team. `secret` is never derived `Debug` automatically;
/// [`Team::fmt`] below redacts it explicitly so an accidental
/// `#[derive(Debug)]` regression can't slip back in unnoticed.
#[derive(Clone)]
pub struct Team {
    pub slug: String,
    pub secret: String,
    pub active: bool,
    pub locked: bool,
    /// Optional per-merchant transaction limit, in minor units.
    pub amount_limit: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Team")
            .field("slug", &self.slug)
            .field("secret", &"<redacted>")
            .field("active", &self.active)
            .field("locked", &self.locked)
            .field("amount_limit", &self.amount_limit)
            .field("created_at", &self.created_at)
            .field("last_login_at", &self.last_login_at)
            .finish()
    }
}

impl Team {
    pub fn is_usable(&self) -> bool {
        self.active && !self.locked
    }
}

/// Narrow capability interface for team lookups. The concrete store
/// (database, config file, secret manager) is an external collaborator —
/// team registration tooling itself is out of scope.
#[async_trait::async_trait]
pub trait TeamStore: Send + Sync {
    async fn get_team_by_slug(&self, slug: &str) -> Option<Team>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_secret() {
        let team = Team {
            slug: "acme".into(),
            secret: "super-secret-value".into(),
            active: true,
            locked: false,
            amount_limit: None,
            created_at: Utc::now(),
            last_login_at: None,
        };
        let debug = format!("{team:?}");
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn is_usable_requires_active_and_unlocked() {
        let mut team = Team {
            slug: "acme".into(),
            secret: "s".into(),
            active: true,
            locked: false,
            amount_limit: None,
            created_at: Utc::now(),
            last_login_at: None,
        };
        assert!(team.is_usable());
        team.locked = true;
        assert!(!team.is_usable());
        team.locked = false;
        team.active = false;
        assert!(!team.is_usable());
    }
}
