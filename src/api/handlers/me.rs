//! Authenticated self-service endpoints.
//!
//! Flow Overview:
//! 1) Authenticate via the signed session cookie.
//! 2) Resolve the current user from the database.
//! 3) Apply allow-listed settings updates.
//!
//! OAuth-managed fields (email, password, two-factor flag) are ignored for
//! accounts that came in through a provider.

use anyhow::{Context, Result};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::session::authenticate_claims;
use super::auth::state::AuthState;
use super::auth::storage::{get_user_by_email, get_user_by_id, has_oauth_account,
                           update_user_settings};
use super::auth::types::{ActionResult, Role, SessionUser};
use super::auth::utils::{normalize_email, valid_email};
use super::auth::{MSG_EMAIL_IN_USE, MSG_INVALID_FIELDS, MSG_SETTINGS_UPDATED,
                  MSG_VERIFICATION_SENT, MSG_WENT_WRONG, lifecycle::SessionLifecycle,
                  login::send_verification_token, password};

const MIN_PASSWORD_LEN: usize = 6;
const MSG_UNAUTHORIZED: &str = "Unauthorized!";
const MSG_INCORRECT_PASSWORD: &str = "Incorrect password!";

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SettingsRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub new_password: Option<String>,
    pub role: Option<Role>,
    pub is_two_factor_enabled: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user", body = SessionUser),
        (status = 401, description = "Missing or invalid session cookie")
    ),
    tag = "me"
)]
pub async fn get_me(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    lifecycle: Extension<SessionLifecycle>,
) -> impl IntoResponse {
    let Some(claims) = authenticate_claims(&headers, &auth_state) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match lifecycle.refresh_claims(claims).await {
        Ok(refreshed) => {
            let session = SessionLifecycle::materialize(&refreshed);
            (StatusCode::OK, Json(session.user)).into_response()
        }
        Err(err) => {
            error!("Failed to load /v1/me: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/me",
    request_body = SettingsRequest,
    responses(
        (status = 200, description = "Settings updated or verification email sent", body = ActionResult),
        (status = 400, description = "Invalid update payload", body = ActionResult),
        (status = 401, description = "Missing or invalid session cookie", body = ActionResult)
    ),
    tag = "me"
)]
pub async fn patch_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SettingsRequest>>,
) -> impl IntoResponse {
    let Some(claims) = authenticate_claims(&headers, &auth_state) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ActionResult::error(MSG_UNAUTHORIZED)),
        )
            .into_response();
    };

    let Some(Json(request)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResult::error(MSG_INVALID_FIELDS)),
        )
            .into_response();
    };

    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ActionResult::error(MSG_UNAUTHORIZED)),
        )
            .into_response();
    };

    match apply_settings(&pool, &auth_state, user_id, request).await {
        Ok(SettingsOutcome::Updated) => (
            StatusCode::OK,
            Json(ActionResult::success(MSG_SETTINGS_UPDATED)),
        )
            .into_response(),
        Ok(SettingsOutcome::VerificationSent) => (
            StatusCode::OK,
            Json(ActionResult::success(MSG_VERIFICATION_SENT)),
        )
            .into_response(),
        Ok(SettingsOutcome::Rejected(message)) => {
            (StatusCode::BAD_REQUEST, Json(ActionResult::error(message))).into_response()
        }
        Err(err) => {
            error!("Failed to update settings: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResult::error(MSG_WENT_WRONG)),
            )
                .into_response()
        }
    }
}

#[derive(Debug)]
pub(crate) enum SettingsOutcome {
    Updated,
    VerificationSent,
    Rejected(&'static str),
}

pub(crate) async fn apply_settings(
    pool: &PgPool,
    auth_state: &AuthState,
    user_id: Uuid,
    mut request: SettingsRequest,
) -> Result<SettingsOutcome> {
    let Some(user) = get_user_by_id(pool, user_id).await? else {
        return Ok(SettingsOutcome::Rejected(MSG_UNAUTHORIZED));
    };

    // Provider-managed accounts cannot change credential-backed fields.
    if has_oauth_account(pool, user.id).await? {
        request.email = None;
        request.password = None;
        request.new_password = None;
        request.is_two_factor_enabled = None;
    }

    // Password changes require both the current and the new password.
    if request.password.is_some() != request.new_password.is_some() {
        return Ok(SettingsOutcome::Rejected(MSG_INVALID_FIELDS));
    }

    if let Some(email) = request.email.as_deref() {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Ok(SettingsOutcome::Rejected(MSG_INVALID_FIELDS));
        }
        if email != user.email {
            if get_user_by_email(pool, &email).await?.is_some() {
                return Ok(SettingsOutcome::Rejected(MSG_EMAIL_IN_USE));
            }
            // The address changes only once the new email is verified.
            send_verification_token(pool, auth_state, &email).await?;
            return Ok(SettingsOutcome::VerificationSent);
        }
    }

    let password_hash = match (request.password.as_deref(), request.new_password.as_deref()) {
        (Some(current), Some(new)) => {
            if new.len() < MIN_PASSWORD_LEN {
                return Ok(SettingsOutcome::Rejected(MSG_INVALID_FIELDS));
            }
            let Some(stored_hash) = user.password_hash.as_deref() else {
                return Ok(SettingsOutcome::Rejected(MSG_INCORRECT_PASSWORD));
            };
            if !password::verify_password(current, stored_hash)? {
                return Ok(SettingsOutcome::Rejected(MSG_INCORRECT_PASSWORD));
            }
            Some(password::hash_password(new)?)
        }
        _ => None,
    };

    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let mut tx = pool.begin().await.context("begin settings transaction")?;
    update_user_settings(
        &mut tx,
        user.id,
        name,
        request.role,
        request.is_two_factor_enabled,
        password_hash.as_deref(),
    )
    .await?;
    tx.commit().await.context("commit settings transaction")?;

    Ok(SettingsOutcome::Updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::AuthConfig;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(AuthConfig::new(
            "https://janua.dev".to_string(),
            SecretString::from("signing-secret"),
        )))
    }

    #[tokio::test]
    async fn patch_me_requires_session() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = patch_me(HeaderMap::new(), Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn get_me_requires_session() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = get_me(
            HeaderMap::new(),
            Extension(auth_state()),
            Extension(SessionLifecycle::new(pool)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[test]
    fn settings_request_rejects_unknown_fields() {
        let parsed: Result<SettingsRequest, _> =
            serde_json::from_str(r#"{"name":"A","unknown":true}"#);
        assert!(parsed.is_err());
    }
}
