//! # Janua (Credential & Two-Factor Authentication Service)
//!
//! `janua` is the server-side core of a credential + OAuth authentication
//! stack: registration, login, email verification, two-factor challenges,
//! password reset, and stateless signed-session claims over PostgreSQL.
//!
//! ## Tokens
//!
//! Verification, password-reset, and two-factor tokens are short-lived,
//! single-use secrets bound to an email address. Only SHA-256 hashes are
//! stored; issuing a new token of a kind revokes the previous one in the
//! same transaction, so at most one live token per (email, kind) exists.
//!
//! ## Two-factor confirmations
//!
//! Passing the second factor records a confirmation row for the user. The
//! sign-in gate consumes that row before granting a session, which forces a
//! fresh challenge on every login cycle.
//!
//! ## Sessions
//!
//! Sessions are stateless HS256 tokens carried in an `HttpOnly` cookie.
//! `role`, `is_two_factor_enabled`, `is_oauth`, `name`, and `email` are
//! recomputed from the database on every refresh; materializing the session
//! object copies the claims verbatim without further lookups.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
