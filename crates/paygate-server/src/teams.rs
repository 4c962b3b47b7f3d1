//! In-memory team directory, seeded from the environment at startup
//! (§10 — team registration tooling itself stays out of scope).
//!
//! Teams are declared as `TEAM_<SLUG>_SECRET=<secret>` pairs, mirroring
//! the teacher's flat `FACILITATOR_SHARED_SECRET`-style env-var
//! configuration rather than introducing a registration API.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;

use paygate_core::auth::{Team, TeamStore};

/// Team directory backed by an in-process map. Not durable — restarting
/// the process re-reads the environment.
#[derive(Default)]
pub struct InMemoryTeamStore {
    teams: DashMap<String, Team>,
}

impl InMemoryTeamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, team: Team) {
        self.teams.insert(team.slug.clone(), team);
    }

    /// Scan the environment for `TEAM_<SLUG>_SECRET` pairs and seed a
    /// store from them. Slugs are upper-cased env-var keys lower-cased
    /// back for the team's `slug` field (`TEAM_ACME_SECRET` -> `acme`).
    pub fn from_env() -> Self {
        let store = Self::new();
        for (key, value) in std::env::vars() {
            let Some(rest) = key.strip_prefix("TEAM_") else {
                continue;
            };
            let Some(slug_upper) = rest.strip_suffix("_SECRET") else {
                continue;
            };
            if slug_upper.is_empty() || value.is_empty() {
                continue;
            }
            let slug = slug_upper.to_lowercase();
            store.insert(Team {
                slug,
                secret: value,
                active: true,
                locked: false,
                amount_limit: None,
                created_at: Utc::now(),
                last_login_at: None,
            });
        }
        store
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

#[async_trait::async_trait]
impl TeamStore for InMemoryTeamStore {
    async fn get_team_by_slug(&self, slug: &str) -> Option<Team> {
        self.teams.get(slug).map(|t| t.clone())
    }
}

impl From<HashMap<String, String>> for InMemoryTeamStore {
    /// Build a store directly from `slug -> secret` pairs, mainly useful
    /// in tests that don't want to mutate process environment.
    fn from(pairs: HashMap<String, String>) -> Self {
        let store = Self::new();
        for (slug, secret) in pairs {
            store.insert(Team {
                slug,
                secret,
                active: true,
                locked: false,
                amount_limit: None,
                created_at: Utc::now(),
                last_login_at: None,
            });
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_seeded_team() {
        let mut pairs = HashMap::new();
        pairs.insert("acme".to_string(), "s3cret".to_string());
        let store = InMemoryTeamStore::from(pairs);
        let team = store.get_team_by_slug("acme").await.unwrap();
        assert_eq!(team.secret, "s3cret");
    }

    #[tokio::test]
    async fn unknown_slug_returns_none() {
        let store = InMemoryTeamStore::new();
        assert!(store.get_team_by_slug("nobody").await.is_none());
    }

    #[test]
    fn from_env_reads_team_prefixed_vars() {
        std::env::set_var("TEAM_WIDGETCO_SECRET", "top-secret");
        let store = InMemoryTeamStore::from_env();
        assert!(store.len() >= 1);
        std::env::remove_var("TEAM_WIDGETCO_SECRET");
    }
}
