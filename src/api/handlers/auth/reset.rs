//! Password reset endpoints: request a reset link, then set a new password.

use anyhow::{Context, Result};
use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::password::hash_password;
use super::state::AuthState;
use super::storage::{enqueue_email, get_user_by_email, update_password_hash};
use super::tokens::{self, TokenKind};
use super::types::{ActionResult, NewPasswordRequest, ResetRequest};
use super::utils::{build_reset_url, normalize_email, valid_email};
use super::{MSG_EMAIL_MISSING, MSG_EMAIL_NOT_FOUND, MSG_INVALID_FIELDS, MSG_PASSWORD_UPDATED,
            MSG_RESET_SENT, MSG_TOKEN_EXPIRED, MSG_TOKEN_INVALID, MSG_TOKEN_MISSING,
            MSG_WENT_WRONG};

const MIN_PASSWORD_LEN: usize = 6;

#[utoipa::path(
    post,
    path = "/v1/auth/reset",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Reset email sent", body = ActionResult),
        (status = 400, description = "Malformed email", body = ActionResult),
        (status = 404, description = "Unknown email", body = ActionResult)
    ),
    tag = "auth"
)]
pub async fn reset(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResult::error(MSG_INVALID_FIELDS)),
        )
            .into_response();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResult::error(MSG_INVALID_FIELDS)),
        )
            .into_response();
    }

    match send_reset_token(&pool, &auth_state, &email).await {
        Ok(true) => (StatusCode::OK, Json(ActionResult::success(MSG_RESET_SENT))).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ActionResult::error(MSG_EMAIL_NOT_FOUND)),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to start password reset: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResult::error(MSG_WENT_WRONG)),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/new-password",
    request_body = NewPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = ActionResult),
        (status = 400, description = "Invalid fields or token", body = ActionResult)
    ),
    tag = "auth"
)]
pub async fn new_password(
    pool: Extension<PgPool>,
    payload: Option<Json<NewPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResult::error(MSG_TOKEN_MISSING)),
        )
            .into_response();
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResult::error(MSG_TOKEN_MISSING)),
        )
            .into_response();
    }
    if request.password.len() < MIN_PASSWORD_LEN {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResult::error(MSG_INVALID_FIELDS)),
        )
            .into_response();
    }

    match apply_new_password(&pool, token, &request.password).await {
        Ok(None) => (
            StatusCode::OK,
            Json(ActionResult::success(MSG_PASSWORD_UPDATED)),
        )
            .into_response(),
        Ok(Some(message)) => {
            (StatusCode::BAD_REQUEST, Json(ActionResult::error(message))).into_response()
        }
        Err(err) => {
            error!("Failed to set new password: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResult::error(MSG_WENT_WRONG)),
            )
                .into_response()
        }
    }
}

/// Issue a reset token and enqueue the email. Returns false for unknown
/// addresses.
pub(crate) async fn send_reset_token(
    pool: &PgPool,
    auth_state: &AuthState,
    email: &str,
) -> Result<bool> {
    if get_user_by_email(pool, email).await?.is_none() {
        return Ok(false);
    }

    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let ttl = auth_state.config().reset_token_ttl_seconds();
    let issued = tokens::issue(&mut tx, email, TokenKind::PasswordReset, ttl).await?;

    let reset_url = build_reset_url(auth_state.config().frontend_base_url(), &issued.token);
    let payload = json!({
        "email": email,
        "reset_url": reset_url,
    });
    enqueue_email(&mut tx, email, "password_reset", &payload).await?;

    tx.commit().await.context("commit reset transaction")?;
    Ok(true)
}

/// Consume the reset token and store the new hash in one transaction.
/// Returns a rejection message for invalid input.
pub(crate) async fn apply_new_password(
    pool: &PgPool,
    token: &str,
    password: &str,
) -> Result<Option<&'static str>> {
    let mut tx = pool.begin().await.context("begin new-password transaction")?;

    let Some(record) = tokens::find_by_value(&mut tx, token, TokenKind::PasswordReset).await?
    else {
        return Ok(Some(MSG_TOKEN_INVALID));
    };

    if record.expired {
        return Ok(Some(MSG_TOKEN_EXPIRED));
    }

    let Some(user) = get_user_by_email(pool, &record.email).await? else {
        return Ok(Some(MSG_EMAIL_MISSING));
    };

    let password_hash = hash_password(password)?;
    update_password_hash(&mut tx, user.id, &password_hash).await?;
    tokens::consume(&mut tx, record.id).await?;

    tx.commit().await.context("commit new-password transaction")?;
    Ok(None)
}
