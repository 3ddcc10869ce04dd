//! Small helpers for auth validation and token handling.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{Rng, RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Create a new token for verification and reset links.
///
/// The returned value is only sent to the user; the database stores a hash.
pub(crate) fn generate_link_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate link token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Create a six-digit two-factor code.
pub(crate) fn generate_two_factor_code() -> String {
    let code = OsRng.gen_range(100_000..1_000_000);
    code.to_string()
}

/// Hash a token so raw values never touch the database.
/// The hash is used for lookups when the token is presented.
pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Build the frontend verification link included in outbound emails.
pub(crate) fn build_verification_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/auth/new-verification?token={token}")
}

/// Build the frontend password reset link included in outbound emails.
pub(crate) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/auth/new-password?token={token}")
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Current unix time, clamped to zero on a pre-epoch clock.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn generate_link_token_decodes_to_32_bytes() {
        let decoded_len = generate_link_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn generate_two_factor_code_is_six_digits() {
        for _ in 0..32 {
            let code = generate_two_factor_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn hash_token_stable() {
        let first = hash_token("token");
        let second = hash_token("token");
        let different = hash_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn build_verification_url_trims_trailing_slash() {
        let url = build_verification_url("https://janua.dev/", "token");
        assert_eq!(url, "https://janua.dev/auth/new-verification?token=token");
    }

    #[test]
    fn build_reset_url_appends_token() {
        let url = build_reset_url("https://janua.dev", "token");
        assert_eq!(url, "https://janua.dev/auth/new-password?token=token");
    }

    #[test]
    fn unix_now_is_positive() {
        assert!(unix_now() > 0);
    }
}
