//! HMAC-SHA256 signing for outbound webhook bodies (§4.4's optional
//! signature header), grounded on `tempo-x402::hmac`: the same
//! compute/verify shape and zero-dependency hex helper, retargeted from
//! authenticating inbound facilitator requests to signing outbound
//! webhook payloads.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encode `bytes` without pulling in the `hex` crate, mirroring
/// `tempo-x402::hmac`'s local `mod hex`.
fn hex_encode(bytes: impl AsRef<[u8]>) -> String {
    use std::fmt::Write;
    bytes.as_ref().iter().fold(String::new(), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

/// Compute the hex-encoded HMAC-SHA256 signature of `body` under `secret`.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    hex_encode(mac.finalize().into_bytes())
}

/// Verify `signature` against `body` under `secret`. Always computes the
/// full MAC and lets `hmac`'s constant-time `verify_slice` decide — no
/// early return before the comparison (§4.1 timing-safety invariant,
/// mirrored here for signature checks).
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let expected = hex_decode(signature).unwrap_or_default();
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let sig = compute_signature(b"secret", b"body");
        assert!(verify_signature(b"secret", b"body", &sig));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let sig = compute_signature(b"secret", b"original");
        assert!(!verify_signature(b"secret", b"tampered", &sig));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let sig = compute_signature(b"secret", b"body");
        assert!(!verify_signature(b"other", b"body", &sig));
    }

    #[test]
    fn invalid_hex_is_rejected_not_panicking() {
        assert!(!verify_signature(b"secret", b"body", "not-hex"));
        assert!(!verify_signature(b"secret", b"body", "zz"));
    }
}
