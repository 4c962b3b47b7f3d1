//! Environment-driven configuration (§9.3), grounded on
//! `tempo-x402-facilitator::main`'s `std::env::var` parsing style and
//! `x402_server::config::PaymentGateConfig::from_env`.

use std::time::Duration;

use paygate_core::GatewayConfig;

fn env_duration_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn env_csv(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Server-level settings layered on top of [`GatewayConfig`] (§9.3's
/// configurable knob list).
pub struct ServerConfig {
    pub gateway: GatewayConfig,
    pub port: u16,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    pub payments_db_path: Option<String>,
    pub replay_db_path: Option<String>,
    pub webhook_urls: Vec<String>,
    pub webhook_hmac_secret: Option<Vec<u8>>,
    pub metrics_token: Option<Vec<u8>>,
}

impl ServerConfig {
    /// Load configuration from the environment, falling back to
    /// `GatewayConfig::default()`'s values (mirrors
    /// `PaymentGateConfig::from_env`).
    pub fn from_env() -> Self {
        let gateway = GatewayConfig {
            timestamp_tolerance: env_duration_secs(
                "TIMESTAMP_TOLERANCE_SECS",
                GatewayConfig::default().timestamp_tolerance,
            ),
            nonce_window: env_duration_secs("NONCE_WINDOW_SECS", GatewayConfig::default().nonce_window),
            replay_window: env_duration_secs("REPLAY_WINDOW_SECS", GatewayConfig::default().replay_window),
            lockout_window: env_duration_secs("LOCKOUT_WINDOW_SECS", GatewayConfig::default().lockout_window),
            lockout_threshold: env_u32("LOCKOUT_THRESHOLD", GatewayConfig::default().lockout_threshold),
            ip_attempt_cap: env_u32("IP_ATTEMPT_CAP", GatewayConfig::default().ip_attempt_cap),
            lock_timeout: env_duration_secs("LOCK_TIMEOUT_SECS", GatewayConfig::default().lock_timeout),
            max_lock_wait: env_duration_secs("MAX_LOCK_WAIT_SECS", GatewayConfig::default().max_lock_wait),
            sweep_interval: env_duration_secs("SWEEP_INTERVAL_SECS", GatewayConfig::default().sweep_interval),
            deadlock_history: env_usize("DEADLOCK_HISTORY", GatewayConfig::default().deadlock_history),
            attempt_retention: env_duration_secs(
                "ATTEMPT_RETENTION_SECS",
                GatewayConfig::default().attempt_retention,
            ),
            allow_missing_timestamp: env_bool(
                "ALLOW_MISSING_TIMESTAMP",
                GatewayConfig::default().allow_missing_timestamp,
            ),
            auto_resolve_deadlocks: env_bool("AUTO_RESOLVE_DEADLOCKS", false),
        };

        let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(4040);
        let rate_limit_rpm: u64 = std::env::var("RATE_LIMIT_RPM")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or(120);

        let payments_db_path = std::env::var("PAYMENTS_DB_PATH").ok();
        let replay_db_path = std::env::var("REPLAY_DB_PATH").ok();

        let webhook_urls = env_csv("WEBHOOK_URLS");
        let webhook_hmac_secret = std::env::var("WEBHOOK_HMAC_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());
        let metrics_token = std::env::var("METRICS_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());

        Self {
            gateway,
            port,
            rate_limit_rpm,
            allowed_origins: env_csv("ALLOWED_ORIGINS"),
            payments_db_path,
            replay_db_path,
            webhook_urls,
            webhook_hmac_secret,
            metrics_token,
        }
    }
}
