//! Signed-parameter token computation and verification (§4.1).
//!
//! The expected token is the lowercase-hex SHA-256 digest of the
//! canonicalized request parameters plus the team's shared secret.
//! Equality is checked only — the token is never decoded.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::security::constant_time_eq;

/// Parameter name excluded from the canonical string: the token itself
/// must not sign over its own value.
const TOKEN_PARAM: &str = "Token";

/// Build the canonical `name=value&...&SecretKey=<secret>` string from the
/// request parameters (excluding `Token`), sorted by parameter name in
/// ordinal (byte) order.
pub fn canonical_string(params: &BTreeMap<String, String>, secret: &str) -> String {
    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .filter(|(k, _)| k.as_str() != TOKEN_PARAM)
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    // BTreeMap already iterates in ordinal key order, but sort explicitly
    // so callers passing a different map type still get the right order.
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    if !out.is_empty() {
        out.push('&');
    }
    out.push_str("SecretKey=");
    out.push_str(secret);
    out
}

/// Compute the expected token: lowercase hex SHA-256 of the canonical
/// string.
pub fn compute_token(params: &BTreeMap<String, String>, secret: &str) -> String {
    let canonical = canonical_string(params, secret);
    hex_encode(Sha256::digest(canonical.as_bytes()))
}

/// Verify a caller-provided token against the expected token in constant
/// time, via [`crate::security::constant_time_eq`]'s `subtle::ConstantTimeEq`
/// comparison. Unequal lengths fail immediately without comparing content;
/// equal lengths never short-circuit on content, so no prefix match leaks
/// through timing.
pub fn verify_token(params: &BTreeMap<String, String>, secret: &str, provided: &str) -> bool {
    let expected = compute_token(params, secret);
    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

fn hex_encode(bytes: impl AsRef<[u8]>) -> String {
    use std::fmt::Write;
    bytes.as_ref().iter().fold(String::new(), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// S1 Token round-trip from the spec's concrete scenarios.
    #[test]
    fn s1_token_round_trip() {
        let p = params(&[
            ("TeamSlug", "TestMerchant"),
            ("Amount", "100000"),
            ("OrderId", "ORD-1"),
        ]);
        let canonical = canonical_string(&p, "test_password_123");
        assert_eq!(
            canonical,
            "Amount=100000&OrderId=ORD-1&TeamSlug=TestMerchant&SecretKey=test_password_123"
        );

        let expected = compute_token(&p, "test_password_123");
        assert!(verify_token(&p, "test_password_123", &expected));
    }

    /// S2 Token mismatch: differ in the last hex character.
    #[test]
    fn s2_token_mismatch() {
        let p = params(&[
            ("TeamSlug", "TestMerchant"),
            ("Amount", "100000"),
            ("OrderId", "ORD-1"),
        ]);
        let expected = compute_token(&p, "test_password_123");
        let mut tampered = expected.clone();
        let last = tampered.pop().unwrap();
        let replacement = if last == '0' { '1' } else { '0' };
        tampered.push(replacement);

        assert!(!verify_token(&p, "test_password_123", &tampered));
    }

    #[test]
    fn token_param_itself_is_excluded_from_canonical_string() {
        let p = params(&[("Token", "ignored-value"), ("OrderId", "ORD-1")]);
        let canonical = canonical_string(&p, "secret");
        assert!(!canonical.contains("ignored-value"));
        assert_eq!(canonical, "OrderId=ORD-1&SecretKey=secret");
    }

    #[test]
    fn empty_params_still_append_secret() {
        let p = BTreeMap::new();
        assert_eq!(canonical_string(&p, "secret"), "SecretKey=secret");
    }

    #[test]
    fn different_secret_yields_different_token() {
        let p = params(&[("OrderId", "ORD-1")]);
        assert_ne!(compute_token(&p, "secret-a"), compute_token(&p, "secret-b"));
    }

    #[test]
    fn wrong_length_tokens_are_rejected_without_panicking() {
        let p = params(&[("OrderId", "ORD-1")]);
        assert!(!verify_token(&p, "secret", "short"));
    }
}
