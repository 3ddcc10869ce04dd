//! Database helpers for users, two-factor confirmations, and email enqueueing.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::types::Role;
use super::utils::is_unique_violation;

/// Outcome when attempting to create a new user.
#[derive(Debug)]
pub(crate) enum InsertUserOutcome {
    Created(Uuid),
    Conflict,
}

/// User row as seen by the auth flows.
#[derive(Clone, Debug)]
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) name: Option<String>,
    pub(crate) email: String,
    pub(crate) password_hash: Option<String>,
    pub(crate) email_verified: bool,
    pub(crate) role: Role,
    pub(crate) is_two_factor_enabled: bool,
}

const USER_COLUMNS: &str = r"
    id, name, email, password_hash,
    (email_verified_at IS NOT NULL) AS email_verified,
    role, is_two_factor_enabled
";

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    let role: String = row.get("role");
    UserRecord {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        email_verified: row.get("email_verified"),
        role: Role::from_str(&role).unwrap_or(Role::User),
        is_two_factor_enabled: row.get("is_two_factor_enabled"),
    }
}

/// Look up a user by normalized email.
pub(crate) async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.map(|row| user_from_row(&row)))
}

/// Look up a user by id.
pub(crate) async fn get_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;
    Ok(row.map(|row| user_from_row(&row)))
}

/// Whether the user has any linked OAuth account.
pub(crate) async fn has_oauth_account(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let query = "SELECT 1 FROM accounts WHERE user_id = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup linked accounts")?;
    Ok(row.is_some())
}

/// Insert a new credential user, relying on the unique email index for
/// duplicate detection.
pub(crate) async fn insert_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    name: &str,
    email: &str,
    password_hash: &str,
) -> Result<InsertUserOutcome> {
    let query = r"
        INSERT INTO users (name, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(InsertUserOutcome::Created(row.get("id"))),
        Err(err) if is_unique_violation(&err) => Ok(InsertUserOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Stamp the verification timestamp and adopt the verified email address.
pub(crate) async fn mark_email_verified(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    email: &str,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET email_verified_at = NOW(),
            email = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(email)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to mark email verified")?;
    Ok(())
}

/// Stamp the verification timestamp without changing the address. Used by
/// the OAuth link-account event, where the provider already proved the email.
pub(crate) async fn stamp_email_verified(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET email_verified_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to stamp email verified")?;
    Ok(())
}

/// Store a fresh password hash.
pub(crate) async fn update_password_hash(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;
    Ok(())
}

/// Apply allow-listed settings updates; absent fields keep their value.
pub(crate) async fn update_user_settings(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    name: Option<&str>,
    role: Option<Role>,
    is_two_factor_enabled: Option<bool>,
    password_hash: Option<&str>,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET name = COALESCE($2, name),
            role = COALESCE($3, role),
            is_two_factor_enabled = COALESCE($4, is_two_factor_enabled),
            password_hash = COALESCE($5, password_hash),
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(name)
        .bind(role.map(Role::as_str))
        .bind(is_two_factor_enabled)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update user settings")?;
    Ok(())
}

/// Record that the user passed the second factor, replacing any prior marker.
pub(crate) async fn replace_two_factor_confirmation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<()> {
    let query = "DELETE FROM two_factor_confirmations WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to clear two-factor confirmation")?;

    let query = "INSERT INTO two_factor_confirmations (user_id) VALUES ($1)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to record two-factor confirmation")?;
    Ok(())
}

/// Consume the user's confirmation marker. Returns whether one existed, so
/// the sign-in gate both checks and spends it in a single statement.
pub(crate) async fn consume_two_factor_confirmation(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<bool> {
    let query = "DELETE FROM two_factor_confirmations WHERE user_id = $1 RETURNING user_id";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume two-factor confirmation")?;
    Ok(row.is_some())
}

/// Enqueue an outbound email in the caller's transaction so delivery intent
/// commits atomically with the state change that requires it.
pub(crate) async fn enqueue_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_email: &str,
    template: &str,
    payload_json: &serde_json::Value,
) -> Result<()> {
    let payload_text =
        serde_json::to_string(payload_json).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to enqueue email")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{InsertUserOutcome, UserRecord};
    use crate::api::handlers::auth::types::Role;
    use uuid::Uuid;

    #[test]
    fn insert_user_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", InsertUserOutcome::Created(Uuid::nil())),
            format!("Created({:?})", Uuid::nil())
        );
        assert_eq!(format!("{:?}", InsertUserOutcome::Conflict), "Conflict");
    }

    #[test]
    fn user_record_holds_values() {
        let record = UserRecord {
            id: Uuid::nil(),
            name: Some("Alice".to_string()),
            email: "alice@example.com".to_string(),
            password_hash: None,
            email_verified: false,
            role: Role::User,
            is_two_factor_enabled: true,
        };
        assert_eq!(record.id, Uuid::nil());
        assert!(record.password_hash.is_none());
        assert!(record.is_two_factor_enabled);
    }
}
