//! Token freshness.
//!
//! The vendor issues JWT id tokens; the bridge only needs to know
//! whether a cached one is still worth presenting. The payload segment
//! is base64url without padding; only the `exp` claim matters here, so
//! no signature verification happens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;

/// Validity margin required of a cached token, seconds.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Whether a JWT is still fresh enough to reuse.
///
/// A token that cannot be decoded, carries no `exp`, or expires within
/// the margin counts as stale.
pub fn token_is_fresh(token: &str) -> bool {
    match expiry_of(token) {
        Some(exp) => exp > Utc::now().timestamp() + EXPIRY_MARGIN_SECS,
        None => false,
    }
}

/// Extract the `exp` claim from a JWT without verifying it.
fn expiry_of(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_exp(exp: i64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "exp": exp }).to_string());
        format!("header.{payload}.signature")
    }

    #[test]
    fn test_future_token_is_fresh() {
        let token = token_with_exp(Utc::now().timestamp() + 3600);
        assert!(token_is_fresh(&token));
    }

    #[test]
    fn test_expired_token_is_stale() {
        let token = token_with_exp(Utc::now().timestamp() - 10);
        assert!(!token_is_fresh(&token));
    }

    #[test]
    fn test_token_inside_margin_is_stale() {
        let token = token_with_exp(Utc::now().timestamp() + EXPIRY_MARGIN_SECS / 2);
        assert!(!token_is_fresh(&token));
    }

    #[test]
    fn test_garbage_is_stale() {
        assert!(!token_is_fresh("not-a-jwt"));
        assert!(!token_is_fresh(""));
        assert!(!token_is_fresh("a.!!!.c"));
    }

    #[test]
    fn test_token_without_exp_is_stale() {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "sub": "user" }).to_string());
        assert!(!token_is_fresh(&format!("h.{payload}.s")));
    }
}
