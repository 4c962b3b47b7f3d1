//! Shared security utilities for the payment gateway core.
//!
//! All secret/token comparisons use the `subtle` crate for timing-attack
//! resistance, mirroring the pattern used for bearer-token checks across
//! the workspace.

use subtle::ConstantTimeEq;

/// Constant-time comparison of two equal-length byte strings, via
/// `subtle::ConstantTimeEq`.
///
/// Unequal lengths fail immediately (comparing variable-length secrets is
/// not on the hot path this guards — token equality is always checked
/// against a fixed-length hex digest) but the equal-length path is
/// delegated entirely to `ct_eq`, which never short-circuits on content, so
/// no prefix of a match leaks through timing.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Constant-time comparison for secrets of unknown/variable length, e.g.
/// bearer tokens supplied by a caller. Both inputs are hashed to
/// fixed-length digests first so timing reveals neither the length nor the
/// content of either input.
pub fn constant_time_eq_variable_length(a: &[u8], b: &[u8]) -> bool {
    use sha2::{Digest, Sha256};
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_match() {
        assert!(constant_time_eq(b"deadbeef", b"deadbeef"));
    }

    #[test]
    fn different_inputs_do_not_match() {
        assert!(!constant_time_eq(b"deadbeef", b"deadc0de"));
    }

    #[test]
    fn different_length_inputs_do_not_match() {
        assert!(!constant_time_eq(b"short", b"much longer input"));
    }

    #[test]
    fn variable_length_handles_empty_inputs() {
        assert!(constant_time_eq_variable_length(b"", b""));
        assert!(!constant_time_eq_variable_length(b"", b"nonempty"));
    }
}
