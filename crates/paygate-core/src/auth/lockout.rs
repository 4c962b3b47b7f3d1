//! Progressive lockout and sliding-window attempt tracking (§4.1, §3
//! `AuthenticationAttempt`).
//!
//! Each team keeps a sliding window of failure timestamps. When the
//! rolling failure count reaches the configured threshold the team is
//! blocked; the block *duration* escalates with each successive lockout
//! for that team (the step table is keyed on "how many times has this
//! team been blocked before", not on the raw failure count — the raw
//! count is pinned at the threshold every time a block triggers).

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::constants::lockout_duration_for;

/// Outcome of recording an authentication attempt against the lockout
/// tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutDecision {
    /// The attempt may proceed.
    Allowed,
    /// The team is currently blocked; `remaining` is how much longer.
    Blocked { remaining: Duration },
}

#[derive(Default)]
struct TeamWindow {
    failures: VecDeque<Instant>,
    blocked_until: Option<Instant>,
    block_occurrences: u32,
}

/// Tracks per-team failure history and per-IP attempt volume.
pub struct LockoutTracker {
    teams: DashMap<String, TeamWindow>,
    ip_attempts: DashMap<String, VecDeque<Instant>>,
    lockout_window: Duration,
    lockout_threshold: u32,
    ip_attempt_cap: u32,
}

impl LockoutTracker {
    pub fn new(lockout_window: Duration, lockout_threshold: u32, ip_attempt_cap: u32) -> Self {
        Self {
            teams: DashMap::new(),
            ip_attempts: DashMap::new(),
            lockout_window,
            lockout_threshold,
            ip_attempt_cap,
        }
    }

    fn prune(&self, window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = window.front() {
            if now.duration_since(*front) > self.lockout_window {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Check whether `slug` is currently blocked, without recording
    /// anything. A block past its expiry is treated as lifted (the team
    /// is auto-unblocked on the next attempt, per §4.1).
    pub fn check_blocked(&self, slug: &str) -> LockoutDecision {
        let now = Instant::now();
        let Some(entry) = self.teams.get(slug) else {
            return LockoutDecision::Allowed;
        };
        match entry.blocked_until {
            Some(until) if until > now => LockoutDecision::Blocked {
                remaining: until - now,
            },
            _ => LockoutDecision::Allowed,
        }
    }

    /// Check the IP attempt cap for the sliding window, without recording
    /// an attempt. Returns `false` if the cap has been reached.
    pub fn check_ip_cap(&self, ip: &str) -> bool {
        let now = Instant::now();
        match self.ip_attempts.get(ip) {
            Some(window) => {
                let in_window = window
                    .iter()
                    .filter(|t| now.duration_since(**t) <= self.lockout_window)
                    .count();
                (in_window as u32) < self.ip_attempt_cap
            }
            None => true,
        }
    }

    /// Record an attempt outcome for `slug` (and optionally `ip`). Returns
    /// `true` exactly when this call is the one that newly triggers a
    /// block (for the `lockouts_triggered` metric) — not merely whether the
    /// team ends up blocked. Call [`Self::check_blocked`] first in the
    /// pipeline; this method is for bookkeeping once the token has actually
    /// been evaluated (or skipped because the team was already blocked).
    pub fn record_attempt(&self, slug: &str, success: bool, ip: Option<&str>) -> bool {
        let now = Instant::now();

        if let Some(ip) = ip {
            let mut window = self.ip_attempts.entry(ip.to_string()).or_default();
            self.prune(&mut window, now);
            window.push_back(now);
        }

        let mut entry = self.teams.entry(slug.to_string()).or_default();

        if success {
            // A successful attempt does not retroactively clear failure
            // history inside the window (§4.1 describes a pure sliding
            // window), but it never contributes a failure timestamp.
            return false;
        }

        self.prune(&mut entry.failures, now);
        entry.failures.push_back(now);

        if entry.failures.len() as u32 >= self.lockout_threshold {
            entry.block_occurrences += 1;
            let duration = lockout_duration_for(entry.block_occurrences);
            entry.blocked_until = Some(now + duration);
            // Reset the failure window so the next cycle starts fresh
            // once this block expires.
            entry.failures.clear();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S3 Progressive lockout from the spec's concrete scenarios: five
    /// consecutive failures trigger a block; the first block for a team
    /// uses the first step-table entry (5 minutes).
    #[test]
    fn s3_progressive_lockout_first_block_uses_first_step() {
        let tracker = LockoutTracker::new(Duration::from_secs(15 * 60), 5, 20);
        for _ in 0..5 {
            assert_eq!(tracker.check_blocked("X"), LockoutDecision::Allowed);
            tracker.record_attempt("X", false, None);
        }
        match tracker.check_blocked("X") {
            LockoutDecision::Blocked { remaining } => {
                assert!(remaining <= Duration::from_secs(5 * 60));
                assert!(remaining > Duration::from_secs(0));
            }
            LockoutDecision::Allowed => panic!("expected team to be blocked after 5 failures"),
        }
    }

    #[test]
    fn second_block_for_same_team_escalates_to_second_step() {
        let tracker = LockoutTracker::new(Duration::from_secs(15 * 60), 2, 20);
        // First block.
        tracker.record_attempt("X", false, None);
        tracker.record_attempt("X", false, None);
        assert!(matches!(
            tracker.check_blocked("X"),
            LockoutDecision::Blocked { .. }
        ));

        // Simulate the block having expired by directly manipulating
        // internal state is not exposed; instead verify the occurrence
        // counter drives duration via a second tracker seeded to the
        // second occurrence.
        let tracker2 = LockoutTracker::new(Duration::from_secs(15 * 60), 2, 20);
        {
            let mut entry = tracker2.teams.entry("X".to_string()).or_default();
            entry.block_occurrences = 1;
        }
        tracker2.record_attempt("X", false, None);
        tracker2.record_attempt("X", false, None);
        match tracker2.check_blocked("X") {
            LockoutDecision::Blocked { remaining } => {
                assert!(remaining > Duration::from_secs(5 * 60));
            }
            LockoutDecision::Allowed => panic!("expected second block to trigger"),
        }
    }

    #[test]
    fn unblocked_team_is_allowed() {
        let tracker = LockoutTracker::new(Duration::from_secs(15 * 60), 5, 20);
        assert_eq!(tracker.check_blocked("fresh-team"), LockoutDecision::Allowed);
    }

    #[test]
    fn ip_cap_blocks_after_threshold_attempts() {
        let tracker = LockoutTracker::new(Duration::from_secs(15 * 60), 100, 3);
        for _ in 0..3 {
            assert!(tracker.check_ip_cap("1.2.3.4"));
            tracker.record_attempt("some-team", true, Some("1.2.3.4"));
        }
        assert!(!tracker.check_ip_cap("1.2.3.4"));
    }

    #[test]
    fn success_does_not_count_as_failure() {
        let tracker = LockoutTracker::new(Duration::from_secs(15 * 60), 2, 20);
        tracker.record_attempt("X", true, None);
        tracker.record_attempt("X", true, None);
        assert_eq!(tracker.check_blocked("X"), LockoutDecision::Allowed);
    }
}
