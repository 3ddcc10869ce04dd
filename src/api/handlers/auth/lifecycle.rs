//! Session lifecycle: the sign-in gate, claim refresh, session
//! materialization, and the OAuth link-account event.
//!
//! These are the hooks a session framework would call at fixed lifecycle
//! points, expressed as plain methods so the core stays free of HTTP types:
//!
//! 1) `authorize_sign_in` runs before a session is granted and consumes the
//!    user's two-factor confirmation, forcing a fresh challenge next login.
//! 2) `refresh_claims` runs on every token refresh and recomputes the
//!    database-derived claims.
//! 3) `materialize` builds the externally visible session object from the
//!    claims alone, never from the database.
//! 4) `link_account` runs after an OAuth provider links an account.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::storage::{
    UserRecord, consume_two_factor_confirmation, get_user_by_id, has_oauth_account,
    stamp_email_verified,
};
use super::types::{Role, SessionResponse, SessionUser};
use super::utils::unix_now;

/// Claims embedded in the signed session token.
///
/// `role`, `is_two_factor_enabled`, `is_oauth`, `name`, and `email` are
/// refreshed from the database on every reload; `sub`, `iat`, and `exp` are
/// fixed at sign-in.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    pub is_two_factor_enabled: bool,
    pub is_oauth: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Outcome of the pre-session sign-in gate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignInDecision {
    Allow,
    Deny,
}

/// Explicit session-lifecycle hooks over the user directory.
#[derive(Clone)]
pub struct SessionLifecycle {
    pool: PgPool,
}

impl SessionLifecycle {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pre-session gate: deny unless the user exists, is verified, and — when
    /// two-factor is enabled — holds a confirmation. The confirmation is
    /// consumed here so every new login cycle requires a fresh second factor.
    pub async fn authorize_sign_in(&self, user_id: Uuid) -> Result<SignInDecision> {
        let Some(user) = get_user_by_id(&self.pool, user_id).await? else {
            return Ok(SignInDecision::Deny);
        };

        if !user.email_verified {
            return Ok(SignInDecision::Deny);
        }

        if user.is_two_factor_enabled
            && !consume_two_factor_confirmation(&self.pool, user.id).await?
        {
            return Ok(SignInDecision::Deny);
        }

        Ok(SignInDecision::Allow)
    }

    /// Build the initial claims for a freshly authenticated user.
    pub async fn claims_for_user(
        &self,
        user: &UserRecord,
        ttl_seconds: i64,
    ) -> Result<SessionClaims> {
        let is_oauth = has_oauth_account(&self.pool, user.id).await?;
        let now = unix_now();
        Ok(SessionClaims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            is_two_factor_enabled: user.is_two_factor_enabled,
            is_oauth,
            iat: now,
            exp: now.saturating_add(ttl_seconds),
        })
    }

    /// Refresh the database-derived claims.
    ///
    /// A subject that no longer resolves to a user passes through unchanged;
    /// downstream handlers keep trusting the signed claims as-is.
    pub async fn refresh_claims(&self, claims: SessionClaims) -> Result<SessionClaims> {
        let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
            return Ok(claims);
        };
        let Some(user) = get_user_by_id(&self.pool, user_id).await? else {
            return Ok(claims);
        };
        let is_oauth = has_oauth_account(&self.pool, user.id).await?;

        Ok(SessionClaims {
            sub: claims.sub,
            name: user.name,
            email: user.email,
            role: user.role,
            is_two_factor_enabled: user.is_two_factor_enabled,
            is_oauth,
            iat: claims.iat,
            exp: claims.exp,
        })
    }

    /// Build the session object from the claims verbatim. No database work
    /// happens at this stage.
    #[must_use]
    pub fn materialize(claims: &SessionClaims) -> SessionResponse {
        SessionResponse {
            user: SessionUser {
                id: claims.sub.clone(),
                name: claims.name.clone(),
                email: claims.email.clone(),
                role: claims.role,
                is_two_factor_enabled: claims.is_two_factor_enabled,
                is_oauth: claims.is_oauth,
            },
            expires: claims.exp,
        }
    }

    /// Post-link event: an OAuth provider vouched for the address, so the
    /// account is marked verified without a token round trip.
    pub async fn link_account(&self, user_id: Uuid) -> Result<()> {
        stamp_email_verified(&self.pool, user_id).await
    }
}
