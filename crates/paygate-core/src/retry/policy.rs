//! Backoff policy selection and delay computation (§4.3).

use rand::Rng;
use std::time::Duration;

use crate::retry::category::ErrorCategory;

/// Per-category retry policy: attempt cap plus exponential-backoff
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base: Duration, max: Duration, multiplier: f64, jitter: bool) -> Self {
        Self {
            max_attempts,
            base,
            max,
            multiplier,
            jitter,
        }
    }

    /// Policy table from §4.3.
    pub fn for_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::TemporaryIssues => Self::new(
                5,
                Duration::from_secs(30),
                Duration::from_secs(5 * 60),
                1.5,
                true,
            ),
            ErrorCategory::External => Self::new(
                3,
                Duration::from_secs(60),
                Duration::from_secs(10 * 60),
                2.0,
                true,
            ),
            ErrorCategory::System => Self::new(
                2,
                Duration::from_secs(5 * 60),
                Duration::from_secs(15 * 60),
                3.0,
                false,
            ),
            // Permanent errors never reach the delay calculation (the
            // engine bypasses retry for them), but a policy is still
            // defined here so callers that compute a speculative delay
            // for logging don't need to special-case it.
            ErrorCategory::Permanent => Self::default_policy(),
        }
    }

    /// Default policy for operations with no category-specific override.
    pub fn default_policy() -> Self {
        Self::new(
            3,
            Duration::from_secs(1),
            Duration::from_secs(5 * 60),
            2.0,
            true,
        )
    }

    /// `delay(n) = min(base * multiplier^(n-1), max)`, plus `±25%` jitter
    /// when enabled, clamped to non-negative (§4.3).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max.as_secs_f64());

        let final_secs = if self.jitter {
            let spread = capped * 0.25;
            let noise = rand::rng().random_range(-spread..=spread);
            (capped + noise).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(final_secs)
    }
}
