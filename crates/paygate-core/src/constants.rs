//! Tunable defaults for the auth pipeline, state manager, retry engine,
//! and lock observer. Grouped into [`GatewayConfig`] so `paygate-server`
//! can load overrides from the environment without scattering magic
//! numbers through the core.

use std::time::Duration;

/// Default timestamp tolerance for request freshness (§4.1).
pub const DEFAULT_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(5 * 60);

/// Default nonce validity window (§4.1).
pub const DEFAULT_NONCE_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Default replay-fingerprint retention window (§4.1).
pub const DEFAULT_REPLAY_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Default sliding window over which auth failures are counted (§4.1).
pub const DEFAULT_LOCKOUT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Default failure count at which a team is blocked (§4.1).
pub const DEFAULT_LOCKOUT_THRESHOLD: u32 = 5;

/// Default per-IP attempt cap within the lockout window (§4.1).
pub const DEFAULT_IP_ATTEMPT_CAP: u32 = 20;

/// Default lock-acquisition timeout (§4.2, §5).
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default threshold above which a pending lock request is flagged as a
/// long wait (§4.5).
pub const DEFAULT_MAX_LOCK_WAIT: Duration = Duration::from_secs(2 * 60);

/// Default interval between deadlock-observer sweeps (§4.5).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on the deadlock chain history ring (§4.5).
pub const DEFAULT_DEADLOCK_HISTORY: usize = 100;

/// Default retention window for retry attempt records (§4.3).
pub const DEFAULT_ATTEMPT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Progressive lockout step table keyed by (1-indexed) failure count within
/// the window. The last entry's duration applies to every count at or
/// beyond its threshold.
pub const LOCKOUT_STEP_TABLE: &[(u32, Duration)] = &[
    (1, Duration::from_secs(5 * 60)),
    (2, Duration::from_secs(15 * 60)),
    (3, Duration::from_secs(30 * 60)),
    (4, Duration::from_secs(60 * 60)),
    (5, Duration::from_secs(2 * 60 * 60)),
];

/// Resolve the block duration for a given failure count using
/// [`LOCKOUT_STEP_TABLE`]; counts beyond the table's last entry use the
/// last entry's duration.
pub fn lockout_duration_for(failure_count: u32) -> Duration {
    LOCKOUT_STEP_TABLE
        .iter()
        .rev()
        .find(|(count, _)| failure_count >= *count)
        .map(|(_, dur)| *dur)
        .unwrap_or(LOCKOUT_STEP_TABLE[0].1)
}

/// Runtime configuration bundle. Decouples the core from compile-time
/// constants so `paygate-server` can override individual knobs from the
/// environment, mirroring `tempo-x402::ChainConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub timestamp_tolerance: Duration,
    pub nonce_window: Duration,
    pub replay_window: Duration,
    pub lockout_window: Duration,
    pub lockout_threshold: u32,
    pub ip_attempt_cap: u32,
    pub lock_timeout: Duration,
    pub max_lock_wait: Duration,
    pub sweep_interval: Duration,
    pub deadlock_history: usize,
    pub attempt_retention: Duration,
    /// Whether a missing `Timestamp` parameter is tolerated (§4.1).
    pub allow_missing_timestamp: bool,
    /// Whether the deadlock observer may resolve cycles automatically
    /// (§4.5). Advisory-only (report, no resolution) when `false`.
    pub auto_resolve_deadlocks: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
            nonce_window: DEFAULT_NONCE_WINDOW,
            replay_window: DEFAULT_REPLAY_WINDOW,
            lockout_window: DEFAULT_LOCKOUT_WINDOW,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            ip_attempt_cap: DEFAULT_IP_ATTEMPT_CAP,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_lock_wait: DEFAULT_MAX_LOCK_WAIT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            deadlock_history: DEFAULT_DEADLOCK_HISTORY,
            attempt_retention: DEFAULT_ATTEMPT_RETENTION,
            allow_missing_timestamp: true,
            auto_resolve_deadlocks: false,
        }
    }
}
