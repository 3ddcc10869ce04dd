//! Login endpoint: the credential verifier.
//!
//! Transitions are evaluated in a fixed order for an incoming
//! (email, password, optional code):
//!
//! 1) unknown email or OAuth-only account (no password hash) -> rejected
//! 2) unverified email -> issue a verification token and halt
//! 3) two-factor enabled, no code -> issue a challenge code and halt
//! 4) two-factor enabled, code given -> validate and record a confirmation
//! 5) delegate password check and session establishment to the lifecycle

use anyhow::{Context, Result};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use super::lifecycle::{SessionLifecycle, SignInDecision};
use super::session::{encode_session_token, session_cookie};
use super::state::AuthState;
use super::storage::{enqueue_email, get_user_by_email, replace_two_factor_confirmation};
use super::tokens::{self, TokenKind};
use super::types::{ActionResult, LoginRequest};
use super::utils::{build_verification_url, hash_token, normalize_email, valid_email};
use super::{MSG_CODE_EXPIRED, MSG_CONFIRMATION_SENT, MSG_INVALID_CODE, MSG_INVALID_CREDENTIALS,
            MSG_INVALID_FIELDS, MSG_LOGGED_IN, MSG_WENT_WRONG};

/// Terminal outcome of a login attempt.
#[derive(Debug)]
pub(crate) enum LoginOutcome {
    LoggedIn { token: String },
    TwoFactorRequired,
    VerificationSent,
    Rejected(&'static str),
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, confirmation sent, or second factor required", body = ActionResult),
        (status = 400, description = "Malformed fields", body = ActionResult),
        (status = 401, description = "Rejected credentials or code", body = ActionResult)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    lifecycle: Extension<SessionLifecycle>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResult::error(MSG_INVALID_FIELDS)),
        )
            .into_response();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) || request.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResult::error(MSG_INVALID_FIELDS)),
        )
            .into_response();
    }

    let outcome = attempt_login(
        &pool,
        &auth_state,
        &lifecycle,
        &email,
        &request.password,
        request.code.as_deref(),
    )
    .await;

    match outcome {
        Ok(LoginOutcome::LoggedIn { token }) => {
            let mut headers = HeaderMap::new();
            if let Ok(cookie) = session_cookie(&auth_state, &token) {
                headers.insert(SET_COOKIE, cookie);
            }
            (
                StatusCode::OK,
                headers,
                Json(ActionResult::success(MSG_LOGGED_IN)),
            )
                .into_response()
        }
        Ok(LoginOutcome::TwoFactorRequired) => {
            (StatusCode::OK, Json(ActionResult::two_factor())).into_response()
        }
        Ok(LoginOutcome::VerificationSent) => (
            StatusCode::OK,
            Json(ActionResult::success(MSG_CONFIRMATION_SENT)),
        )
            .into_response(),
        Ok(LoginOutcome::Rejected(message)) => {
            (StatusCode::UNAUTHORIZED, Json(ActionResult::error(message))).into_response()
        }
        Err(err) => {
            error!("Login attempt failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResult::error(MSG_WENT_WRONG)),
            )
                .into_response()
        }
    }
}

/// Run the verifier state machine for a validated request.
pub(crate) async fn attempt_login(
    pool: &PgPool,
    auth_state: &AuthState,
    lifecycle: &SessionLifecycle,
    email: &str,
    password: &str,
    code: Option<&str>,
) -> Result<LoginOutcome> {
    let Some(user) = get_user_by_email(pool, email).await? else {
        return Ok(LoginOutcome::Rejected(MSG_INVALID_CREDENTIALS));
    };
    // OAuth-only accounts have no password hash and cannot log in here.
    let Some(password_hash) = user.password_hash.clone() else {
        return Ok(LoginOutcome::Rejected(MSG_INVALID_CREDENTIALS));
    };

    if !user.email_verified {
        send_verification_token(pool, auth_state, &user.email).await?;
        return Ok(LoginOutcome::VerificationSent);
    }

    if user.is_two_factor_enabled {
        match code {
            None => {
                send_two_factor_code(pool, auth_state, &user.email).await?;
                return Ok(LoginOutcome::TwoFactorRequired);
            }
            Some(code) => {
                if let Some(rejection) = validate_two_factor_code(pool, &user, code).await? {
                    return Ok(LoginOutcome::Rejected(rejection));
                }
            }
        }
    }

    // Final password check and session establishment.
    if !super::password::verify_password(password, &password_hash)? {
        return Ok(LoginOutcome::Rejected(MSG_INVALID_CREDENTIALS));
    }

    match lifecycle.authorize_sign_in(user.id).await? {
        SignInDecision::Deny => Ok(LoginOutcome::Rejected(MSG_WENT_WRONG)),
        SignInDecision::Allow => {
            let ttl = auth_state.config().session_ttl_seconds();
            let claims = lifecycle.claims_for_user(&user, ttl).await?;
            let token = encode_session_token(auth_state, &claims)?;
            info!(user_id = %user.id, "session established");
            Ok(LoginOutcome::LoggedIn { token })
        }
    }
}

/// Issue a fresh verification token and enqueue the email in one transaction.
pub(crate) async fn send_verification_token(
    pool: &PgPool,
    auth_state: &AuthState,
    email: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin verification transaction")?;

    let ttl = auth_state.config().verification_token_ttl_seconds();
    let issued = tokens::issue(&mut tx, email, TokenKind::Verification, ttl).await?;

    let verify_url = build_verification_url(auth_state.config().frontend_base_url(), &issued.token);
    let payload = json!({
        "email": email,
        "verify_url": verify_url,
    });
    enqueue_email(&mut tx, email, "verify_email", &payload).await?;

    tx.commit().await.context("commit verification transaction")?;
    Ok(())
}

/// Issue a fresh two-factor code and enqueue the email in one transaction.
async fn send_two_factor_code(pool: &PgPool, auth_state: &AuthState, email: &str) -> Result<()> {
    let mut tx = pool.begin().await.context("begin two-factor transaction")?;

    let ttl = auth_state.config().two_factor_token_ttl_seconds();
    let issued = tokens::issue(&mut tx, email, TokenKind::TwoFactor, ttl).await?;

    let payload = json!({
        "email": email,
        "code": issued.token,
    });
    enqueue_email(&mut tx, email, "two_factor_code", &payload).await?;

    tx.commit().await.context("commit two-factor transaction")?;
    Ok(())
}

/// Validate a submitted two-factor code. On success the token is consumed
/// and a confirmation recorded atomically; returns a rejection message
/// otherwise.
async fn validate_two_factor_code(
    pool: &PgPool,
    user: &super::storage::UserRecord,
    code: &str,
) -> Result<Option<&'static str>> {
    let mut tx = pool.begin().await.context("begin code validation")?;

    let Some(record) = tokens::find_by_email(&mut tx, &user.email, TokenKind::TwoFactor).await?
    else {
        return Ok(Some(MSG_INVALID_CODE));
    };

    if record.token_hash != hash_token(code.trim()) {
        return Ok(Some(MSG_INVALID_CODE));
    }

    if record.expired {
        return Ok(Some(MSG_CODE_EXPIRED));
    }

    tokens::consume(&mut tx, record.id).await?;
    replace_two_factor_confirmation(&mut tx, user.id).await?;

    tx.commit().await.context("commit code validation")?;
    Ok(None)
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
    async fn login_missing_payload_is_invalid_fields() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(
            Extension(pool.clone()),
            Extension(auth_state()),
            Extension(SessionLifecycle::new(pool)),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn login_rejects_malformed_email() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(
            Extension(pool.clone()),
            Extension(auth_state()),
            Extension(SessionLifecycle::new(pool)),
            Some(Json(LoginRequest {
                email: "not-an-email".to_string(),
                password: "secret1".to_string(),
                code: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn login_rejects_empty_password() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(
            Extension(pool.clone()),
            Extension(auth_state()),
            Extension(SessionLifecycle::new(pool)),
            Some(Json(LoginRequest {
                email: "a@x.com".to_string(),
                password: String::new(),
                code: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[test]
    fn login_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", LoginOutcome::TwoFactorRequired),
            "TwoFactorRequired"
        );
        assert_eq!(
            format!("{:?}", LoginOutcome::VerificationSent),
            "VerificationSent"
        );
    }
}
