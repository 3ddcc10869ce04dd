//! Short-lived token issuance and consumption.
//!
//! One table backs the three token kinds. Issuing a token deletes any prior
//! token of the same kind for that email inside the caller's transaction, so
//! at most one live token per (email, kind) exists. Raw values are returned
//! to the caller for delivery and never stored; lookups go through SHA-256
//! hashes.

use anyhow::{Context, Result};
use sqlx::Row;
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{generate_link_token, generate_two_factor_code, hash_token};

/// Kind of a short-lived token bound to an email address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TokenKind {
    Verification,
    PasswordReset,
    TwoFactor,
}

impl TokenKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Verification => "verification",
            Self::PasswordReset => "password_reset",
            Self::TwoFactor => "two_factor",
        }
    }
}

/// A freshly issued token: the raw value for delivery plus its expiry.
#[derive(Debug)]
pub(crate) struct IssuedToken {
    pub(crate) token: String,
    pub(crate) expires_unix: i64,
}

/// Stored token row, with expiry already evaluated against the database clock.
#[derive(Debug)]
pub(crate) struct TokenRecord {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) token_hash: Vec<u8>,
    pub(crate) expired: bool,
}

/// Issue a new token, revoking any live token of the same kind for the email.
///
/// Runs inside the caller's transaction so delete and insert land atomically.
pub(crate) async fn issue(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    email: &str,
    kind: TokenKind,
    ttl_seconds: i64,
) -> Result<IssuedToken> {
    let token = match kind {
        TokenKind::TwoFactor => generate_two_factor_code(),
        TokenKind::Verification | TokenKind::PasswordReset => generate_link_token()?,
    };
    let token_hash = hash_token(&token);

    let query = "DELETE FROM auth_tokens WHERE email = $1 AND kind = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(kind.as_str())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to revoke prior token")?;

    let query = r"
        INSERT INTO auth_tokens (email, kind, token_hash, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
        RETURNING EXTRACT(EPOCH FROM expires_at)::BIGINT AS expires_unix
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(kind.as_str())
        .bind(token_hash)
        .bind(ttl_seconds)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert token")?;

    Ok(IssuedToken {
        token,
        expires_unix: row.get("expires_unix"),
    })
}

/// Look up the live token of a kind for an email, if any.
pub(crate) async fn find_by_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    email: &str,
    kind: TokenKind,
) -> Result<Option<TokenRecord>> {
    let query = r"
        SELECT id, email, token_hash, (expires_at < NOW()) AS expired
        FROM auth_tokens
        WHERE email = $1 AND kind = $2
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(kind.as_str())
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup token by email")?;

    Ok(row.map(|row| TokenRecord {
        id: row.get("id"),
        email: row.get("email"),
        token_hash: row.get("token_hash"),
        expired: row.get("expired"),
    }))
}

/// Look up a token of a kind by the submitted raw value.
pub(crate) async fn find_by_value(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token: &str,
    kind: TokenKind,
) -> Result<Option<TokenRecord>> {
    let token_hash = hash_token(token);
    let query = r"
        SELECT id, email, token_hash, (expires_at < NOW()) AS expired
        FROM auth_tokens
        WHERE token_hash = $1 AND kind = $2
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(kind.as_str())
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup token by value")?;

    Ok(row.map(|row| TokenRecord {
        id: row.get("id"),
        email: row.get("email"),
        token_hash: row.get("token_hash"),
        expired: row.get("expired"),
    }))
}

/// Delete a token after successful validation. Single-use: callers consume
/// exactly once so a replayed value finds nothing.
pub(crate) async fn consume(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token_id: Uuid,
) -> Result<()> {
    let query = "DELETE FROM auth_tokens WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume token")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::TokenKind;

    #[test]
    fn token_kind_column_values() {
        assert_eq!(TokenKind::Verification.as_str(), "verification");
        assert_eq!(TokenKind::PasswordReset.as_str(), "password_reset");
        assert_eq!(TokenKind::TwoFactor.as_str(), "two_factor");
    }
}
