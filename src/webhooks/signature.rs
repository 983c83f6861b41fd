//! Webhook token derivation and verification using HMAC-SHA256.
//!
//! GitLab sends the secret token configured on a webhook verbatim in the
//! `X-Gitlab-Token` header. Each recipient's token is the hex-encoded
//! HMAC-SHA256 of `"{recipient}_{salt}"` keyed with the process secret, so the
//! relay never has to store tokens: it recomputes the expected value and
//! compares.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
///
/// # Examples
///
/// ```
/// use gitlab_chat_relay::webhooks::compute_token;
///
/// let token = compute_token(b"secret", "42_salt");
/// assert_eq!(token.len(), 64);
/// assert_eq!(token, compute_token(b"secret", "42_salt"));
/// ```
pub fn compute_token(secret: &[u8], payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a candidate token against the expected HMAC of `payload`.
///
/// Returns `false` for anything that is not valid hex. Uses constant-time
/// comparison to prevent timing attacks.
///
/// # Examples
///
/// ```
/// use gitlab_chat_relay::webhooks::{compute_token, verify_token};
///
/// let token = compute_token(b"secret", "42_salt");
/// assert!(verify_token(&token, b"secret", "42_salt"));
/// assert!(!verify_token(&token, b"secret", "42_other"));
/// assert!(!verify_token("not-hex", b"secret", "42_salt"));
/// ```
pub fn verify_token(candidate: &str, secret: &[u8], payload: &str) -> bool {
    let candidate = match hex::decode(candidate.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload.as_bytes());

    mac.verify_slice(&candidate).is_ok()
}

/// Builds the HMAC input for a recipient.
pub fn token_payload(recipient: impl std::fmt::Display, salt: &str) -> String {
    format!("{recipient}_{salt}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use crate::test_utils::arb_recipient;

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2.
        let token = compute_token(b"Jefe", "what do ya want for nothing?");
        assert_eq!(
            token,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn payload_format() {
        assert_eq!(token_payload(42, "AbC123"), "42_AbC123");
        assert_eq!(token_payload(-5, ""), "-5_");
    }

    #[test]
    fn uppercase_candidate_is_accepted() {
        let token = compute_token(b"s", "1_x");
        assert!(verify_token(&token.to_uppercase(), b"s", "1_x"));
    }

    #[test]
    fn malformed_candidates_are_rejected() {
        assert!(!verify_token("", b"s", "1_x"));
        assert!(!verify_token("abc", b"s", "1_x"));
        assert!(!verify_token("zz", b"s", "1_x"));
        assert!(!verify_token(&"a".repeat(64), b"s", "1_x"));
    }

    #[test]
    fn truncated_token_is_rejected() {
        let token = compute_token(b"s", "1_x");
        assert!(!verify_token(&token[..32], b"s", "1_x"));
    }

    proptest! {
        #[test]
        fn prop_compute_verify_roundtrip(secret: Vec<u8>, payload in ".*") {
            let token = compute_token(&secret, &payload);
            prop_assert!(verify_token(&token, &secret, &payload));
        }

        #[test]
        fn prop_wrong_secret_fails(
            secret1 in "[a-zA-Z0-9]{1,32}",
            secret2 in "[a-zA-Z0-9]{1,32}",
            payload in ".*"
        ) {
            // Secrets without NUL bytes, since HMAC zero-pads short keys.
            prop_assume!(secret1 != secret2);
            let token = compute_token(secret1.as_bytes(), &payload);
            prop_assert!(!verify_token(&token, secret2.as_bytes(), &payload));
        }

        #[test]
        fn prop_token_is_64_hex_chars(secret: Vec<u8>, payload in ".*") {
            let token = compute_token(&secret, &payload);
            prop_assert_eq!(token.len(), 64);
            prop_assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        }

        #[test]
        fn prop_token_is_bound_to_recipient(
            a in arb_recipient(),
            b in arb_recipient(),
            salt in "[a-zA-Z0-9]{16}"
        ) {
            prop_assume!(a != b);
            let token = compute_token(b"secret", &token_payload(a, &salt));
            prop_assert!(!verify_token(&token, b"secret", &token_payload(b, &salt)));
        }

        #[test]
        fn prop_garbage_never_panics(candidate in ".*", secret: Vec<u8>, payload in ".*") {
            let _ = verify_token(&candidate, &secret, &payload);
        }
    }
}
