//! Request authentication pipeline (§4.1).
//!
//! Ties together token verification, timestamp/nonce validation, replay
//! fingerprinting, and progressive lockout into a single
//! [`AuthPipeline::authenticate`] call.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::lockout::{LockoutDecision, LockoutTracker};
use crate::auth::replay::ReplayStore;
use crate::auth::team::{Team, TeamStore};
use crate::auth::token::verify_token;
use crate::constants::GatewayConfig;
use crate::error::GatewayError;
use crate::metrics::MetricsSink;

/// Inbound authentication request: the parameter map excludes nothing —
/// `Token` is filtered out internally when computing the canonical string.
pub struct AuthRequest {
    pub slug: String,
    pub params: BTreeMap<String, String>,
    pub token: String,
    pub client_ip: Option<String>,
}

/// Outcome of an authentication attempt.
pub enum AuthOutcome {
    Success { team: Team },
    Failure { kind: GatewayError, message: String },
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success { .. })
    }
}

/// Authentication result paired with the observable processing time
/// (§4.1 "Processing time is reported as an observable side-value").
pub struct AuthResult {
    pub outcome: AuthOutcome,
    pub elapsed: Duration,
}

/// Parameters considered for the replay fingerprint (§4.1), independent of
/// the nonce mechanism.
const REPLAY_FINGERPRINT_KEYS: &[&str] = &["OrderId", "Amount", "TeamSlug", "Timestamp", "Nonce"];

fn find_param_case_insensitive<'a>(
    params: &'a BTreeMap<String, String>,
    name: &str,
) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Stable label for the `kind` dimension on the auth-outcome counter (§9.5
/// "auth outcomes by kind").
fn outcome_kind(outcome: &AuthOutcome) -> &'static str {
    match outcome {
        AuthOutcome::Success { .. } => "success",
        AuthOutcome::Failure { kind, .. } => match kind {
            GatewayError::MissingParameters(_) => "missing_parameters",
            GatewayError::InvalidToken => "invalid_token",
            GatewayError::TeamNotFound => "team_not_found",
            GatewayError::TeamBlocked => "team_blocked",
            GatewayError::TeamInactive => "team_inactive",
            GatewayError::ReplayDetected => "replay_detected",
            GatewayError::TimestampInvalid => "timestamp_invalid",
            _ => "other",
        },
    }
}

fn replay_fingerprint(slug: &str, token: &str, params: &BTreeMap<String, String>) -> String {
    let mut parts = vec![format!("slug={slug}"), format!("token={token}")];
    for key in REPLAY_FINGERPRINT_KEYS {
        if let Some(v) = find_param_case_insensitive(params, key) {
            parts.push(format!("{key}={v}"));
        }
    }
    let joined = parts.join("&");
    let digest = Sha256::digest(joined.as_bytes());
    use std::fmt::Write;
    digest.iter().fold(String::new(), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

pub struct AuthPipeline {
    team_store: Arc<dyn TeamStore>,
    nonce_store: Arc<dyn ReplayStore>,
    fingerprint_store: Arc<dyn ReplayStore>,
    lockout: LockoutTracker,
    config: GatewayConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl AuthPipeline {
    pub fn new(
        team_store: Arc<dyn TeamStore>,
        nonce_store: Arc<dyn ReplayStore>,
        fingerprint_store: Arc<dyn ReplayStore>,
        config: GatewayConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let lockout = LockoutTracker::new(
            config.lockout_window,
            config.lockout_threshold,
            config.ip_attempt_cap,
        );
        Self {
            team_store,
            nonce_store,
            fingerprint_store,
            lockout,
            config,
            metrics,
        }
    }

    fn validate_timestamp(&self, params: &BTreeMap<String, String>) -> Result<(), GatewayError> {
        let Some(raw) = find_param_case_insensitive(params, "Timestamp") else {
            return if self.config.allow_missing_timestamp {
                Ok(())
            } else {
                Err(GatewayError::TimestampInvalid)
            };
        };

        let parsed: DateTime<Utc> = raw
            .parse()
            .or_else(|_| {
                raw.parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                    .ok_or(())
            })
            .map_err(|_| GatewayError::TimestampInvalid)?;

        let now = Utc::now();
        let diff = (now - parsed).num_seconds().unsigned_abs();
        if diff > self.config.timestamp_tolerance.as_secs() {
            return Err(GatewayError::TimestampInvalid);
        }
        Ok(())
    }

    fn validate_nonce(&self, slug: &str, params: &BTreeMap<String, String>) -> Result<(), GatewayError> {
        let Some(nonce) = find_param_case_insensitive(params, "Nonce") else {
            return Ok(());
        };
        let key = format!("nonce:{slug}:{nonce}");
        if self.nonce_store.try_use(&key) {
            Ok(())
        } else {
            Err(GatewayError::ReplayDetected)
        }
    }

    fn validate_replay_fingerprint(
        &self,
        slug: &str,
        token: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<(), GatewayError> {
        let fp = replay_fingerprint(slug, token, params);
        let key = format!("replay:{fp}");
        if self.fingerprint_store.try_use(&key) {
            Ok(())
        } else {
            Err(GatewayError::ReplayDetected)
        }
    }

    /// Authenticate a request, enforcing lockout, timestamp/nonce/replay
    /// validation, and constant-time token comparison.
    pub async fn authenticate(&self, req: AuthRequest) -> AuthResult {
        let start = Instant::now();

        if req.params.is_empty() {
            return self.finish(
                start,
                AuthOutcome::Failure {
                    kind: GatewayError::MissingParameters("no request parameters supplied".into()),
                    message: "no request parameters supplied".into(),
                },
                &req,
                None,
            );
        }

        if let Some(ip) = req.client_ip.as_deref() {
            if !self.lockout.check_ip_cap(ip) {
                return self.finish(
                    start,
                    AuthOutcome::Failure {
                        kind: GatewayError::TeamBlocked,
                        message: "too many attempts from this client".into(),
                    },
                    &req,
                    None,
                );
            }
        }

        if let LockoutDecision::Blocked { .. } = self.lockout.check_blocked(&req.slug) {
            tracing::warn!(slug = %req.slug, "authentication attempt while team blocked");
            return self.finish(
                start,
                AuthOutcome::Failure {
                    kind: GatewayError::TeamBlocked,
                    message: "team is temporarily blocked".into(),
                },
                &req,
                None,
            );
        }

        let Some(team) = self.team_store.get_team_by_slug(&req.slug).await else {
            return self.finish(
                start,
                AuthOutcome::Failure {
                    kind: GatewayError::TeamNotFound,
                    message: "unknown team".into(),
                },
                &req,
                None,
            );
        };

        if !team.is_usable() {
            return self.finish(
                start,
                AuthOutcome::Failure {
                    kind: GatewayError::TeamInactive,
                    message: "team is inactive or locked".into(),
                },
                &req,
                None,
            );
        }

        if let Err(kind) = self.validate_timestamp(&req.params) {
            return self.finish(
                start,
                AuthOutcome::Failure {
                    kind,
                    message: "timestamp outside tolerance".into(),
                },
                &req,
                Some(&team),
            );
        }

        if let Err(kind) = self.validate_nonce(&req.slug, &req.params) {
            return self.finish(
                start,
                AuthOutcome::Failure {
                    kind,
                    message: "nonce already used".into(),
                },
                &req,
                Some(&team),
            );
        }

        if let Err(kind) = self.validate_replay_fingerprint(&req.slug, &req.token, &req.params) {
            return self.finish(
                start,
                AuthOutcome::Failure {
                    kind,
                    message: "request already processed".into(),
                },
                &req,
                Some(&team),
            );
        }

        if !verify_token(&req.params, &team.secret, &req.token) {
            return self.finish(
                start,
                AuthOutcome::Failure {
                    kind: GatewayError::InvalidToken,
                    message: "token verification failed".into(),
                },
                &req,
                Some(&team),
            );
        }

        self.finish(start, AuthOutcome::Success { team }, &req, None)
    }

    fn finish(
        &self,
        start: Instant,
        outcome: AuthOutcome,
        req: &AuthRequest,
        team_for_logging: Option<&Team>,
    ) -> AuthResult {
        let success = outcome.is_success();
        let slug = team_for_logging.map(|t| t.slug.as_str()).unwrap_or(&req.slug);
        self.metrics.record_auth_outcome(outcome_kind(&outcome));
        if self
            .lockout
            .record_attempt(slug, success, req.client_ip.as_deref())
        {
            self.metrics.record_lockout_triggered();
        }
        AuthResult {
            outcome,
            elapsed: start.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::replay::InMemoryReplayStore;
    use std::collections::BTreeMap;

    struct FixedTeamStore(Option<Team>);

    #[async_trait::async_trait]
    impl TeamStore for FixedTeamStore {
        async fn get_team_by_slug(&self, slug: &str) -> Option<Team> {
            self.0
                .as_ref()
                .filter(|t| t.slug == slug)
                .cloned()
        }
    }

    fn team(slug: &str, secret: &str) -> Team {
        Team {
            slug: slug.to_string(),
            secret: secret.to_string(),
            active: true,
            locked: false,
            amount_limit: None,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    fn pipeline(t: Team) -> AuthPipeline {
        AuthPipeline::new(
            Arc::new(FixedTeamStore(Some(t))),
            Arc::new(InMemoryReplayStore::new()),
            Arc::new(InMemoryReplayStore::new()),
            GatewayConfig::default(),
            Arc::new(crate::metrics::NoopMetricsSink),
        )
    }

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn s1_successful_authentication() {
        let pipeline = pipeline(team("TestMerchant", "test_password_123"));
        let p = params(&[
            ("TeamSlug", "TestMerchant"),
            ("Amount", "100000"),
            ("OrderId", "ORD-1"),
        ]);
        let token = crate::auth::token::compute_token(&p, "test_password_123");

        let result = pipeline
            .authenticate(AuthRequest {
                slug: "TestMerchant".into(),
                params: p,
                token,
                client_ip: None,
            })
            .await;

        assert!(result.outcome.is_success());
    }

    #[tokio::test]
    async fn s2_invalid_token_is_rejected() {
        let pipeline = pipeline(team("TestMerchant", "test_password_123"));
        let p = params(&[("OrderId", "ORD-1")]);

        let result = pipeline
            .authenticate(AuthRequest {
                slug: "TestMerchant".into(),
                params: p,
                token: "0000000000000000000000000000000000000000000000000000000000000000".into(),
                client_ip: None,
            })
            .await;

        match result.outcome {
            AuthOutcome::Failure { kind, .. } => assert_eq!(kind, GatewayError::InvalidToken),
            AuthOutcome::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn unknown_team_is_rejected() {
        let pipeline = AuthPipeline::new(
            Arc::new(FixedTeamStore(None)),
            Arc::new(InMemoryReplayStore::new()),
            Arc::new(InMemoryReplayStore::new()),
            GatewayConfig::default(),
            Arc::new(crate::metrics::NoopMetricsSink),
        );
        let result = pipeline
            .authenticate(AuthRequest {
                slug: "nobody".into(),
                params: params(&[("OrderId", "ORD-1")]),
                token: "x".into(),
                client_ip: None,
            })
            .await;
        match result.outcome {
            AuthOutcome::Failure { kind, .. } => assert_eq!(kind, GatewayError::TeamNotFound),
            AuthOutcome::Success { .. } => panic!("expected failure"),
        }
    }

    /// S8 Replay: an identical request replayed within the window is
    /// rejected as `replay_detected`.
    #[tokio::test]
    async fn s8_replay_is_rejected_on_second_identical_request() {
        let pipeline = pipeline(team("TestMerchant", "secret"));
        let p = params(&[
            ("OrderId", "ORD-1"),
            ("Amount", "100"),
            ("TeamSlug", "TestMerchant"),
        ]);
        let token = crate::auth::token::compute_token(&p, "secret");

        let first = pipeline
            .authenticate(AuthRequest {
                slug: "TestMerchant".into(),
                params: p.clone(),
                token: token.clone(),
                client_ip: None,
            })
            .await;
        assert!(first.outcome.is_success());

        let second = pipeline
            .authenticate(AuthRequest {
                slug: "TestMerchant".into(),
                params: p,
                token,
                client_ip: None,
            })
            .await;
        match second.outcome {
            AuthOutcome::Failure { kind, .. } => assert_eq!(kind, GatewayError::ReplayDetected),
            AuthOutcome::Success { .. } => panic!("expected replay rejection"),
        }
    }

    #[tokio::test]
    async fn inactive_team_is_rejected() {
        let mut t = team("TestMerchant", "secret");
        t.active = false;
        let pipeline = pipeline(t);
        let result = pipeline
            .authenticate(AuthRequest {
                slug: "TestMerchant".into(),
                params: params(&[("OrderId", "ORD-1")]),
                token: "x".into(),
                client_ip: None,
            })
            .await;
        match result.outcome {
            AuthOutcome::Failure { kind, .. } => assert_eq!(kind, GatewayError::TeamInactive),
            AuthOutcome::Success { .. } => panic!("expected failure"),
        }
    }
}
