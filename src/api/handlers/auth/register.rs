//! Registration endpoint.

use anyhow::{Context, Result};
use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::password::hash_password;
use super::state::AuthState;
use super::storage::{InsertUserOutcome, enqueue_email, insert_user};
use super::tokens::{self, TokenKind};
use super::types::{ActionResult, RegisterRequest};
use super::utils::{build_verification_url, normalize_email, valid_email};
use super::{MSG_CONFIRMATION_SENT, MSG_EMAIL_IN_USE, MSG_INVALID_FIELDS, MSG_WENT_WRONG};

const MIN_PASSWORD_LEN: usize = 6;

/// Outcome of a registration attempt.
#[derive(Debug)]
pub(crate) enum RegisterOutcome {
    Created,
    Conflict,
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User created, confirmation email sent", body = ActionResult),
        (status = 400, description = "Malformed fields", body = ActionResult),
        (status = 409, description = "Email already in use", body = ActionResult)
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResult::error(MSG_INVALID_FIELDS)),
        )
            .into_response();
    };

    let email = normalize_email(&request.email);
    let name = request.name.trim();
    // Validation happens before any database work.
    if !valid_email(&email) || request.password.len() < MIN_PASSWORD_LEN || name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResult::error(MSG_INVALID_FIELDS)),
        )
            .into_response();
    }

    match create_user(&pool, &auth_state, name, &email, &request.password).await {
        Ok(RegisterOutcome::Created) => (
            StatusCode::OK,
            Json(ActionResult::success(MSG_CONFIRMATION_SENT)),
        )
            .into_response(),
        Ok(RegisterOutcome::Conflict) => (
            StatusCode::CONFLICT,
            Json(ActionResult::error(MSG_EMAIL_IN_USE)),
        )
            .into_response(),
        Err(err) => {
            error!("Registration failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResult::error(MSG_WENT_WRONG)),
            )
                .into_response()
        }
    }
}

/// Create the user, the verification token, and the outbox row in a single
/// transaction. The unique email index decides duplicates race-free.
pub(crate) async fn create_user(
    pool: &PgPool,
    auth_state: &AuthState,
    name: &str,
    email: &str,
    password: &str,
) -> Result<RegisterOutcome> {
    let password_hash = hash_password(password)?;

    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let user_id = match insert_user(&mut tx, name, email, &password_hash).await? {
        InsertUserOutcome::Created(user_id) => user_id,
        InsertUserOutcome::Conflict => {
            let _ = tx.rollback().await;
            return Ok(RegisterOutcome::Conflict);
        }
    };

    let ttl = auth_state.config().verification_token_ttl_seconds();
    let issued = tokens::issue(&mut tx, email, TokenKind::Verification, ttl).await?;

    let verify_url = build_verification_url(auth_state.config().frontend_base_url(), &issued.token);
    let payload = json!({
        "email": email,
        "verify_url": verify_url,
    });
    enqueue_email(&mut tx, email, "verify_email", &payload).await?;

    tx.commit().await.context("commit signup transaction")?;

    tracing::debug!(%user_id, "user registered");
    Ok(RegisterOutcome::Created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::AuthConfig;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(AuthConfig::new(
            "https://janua.dev".to_string(),
            SecretString::from("signing-secret"),
        )))
    }

    #[tokio::test]
    async fn register_missing_payload_is_invalid_fields() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = register(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_short_password() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = register(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(RegisterRequest {
                email: "a@x.com".to_string(),
                password: "short".to_string(),
                name: "A".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_blank_name() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = register(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(RegisterRequest {
                email: "a@x.com".to_string(),
                password: "secret1".to_string(),
                name: "   ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[test]
    fn register_outcome_debug_names() {
        assert_eq!(format!("{:?}", RegisterOutcome::Created), "Created");
        assert_eq!(format!("{:?}", RegisterOutcome::Conflict), "Conflict");
    }
}
