//! Email verification endpoint.

use anyhow::{Context, Result};
use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use tracing::error;

use super::storage::{get_user_by_email, mark_email_verified};
use super::tokens::{self, TokenKind};
use super::types::{ActionResult, NewVerificationRequest};
use super::{MSG_EMAIL_MISSING, MSG_EMAIL_VERIFIED, MSG_TOKEN_EXPIRED, MSG_TOKEN_MISSING,
            MSG_WENT_WRONG};

/// Outcome of consuming a verification token.
#[derive(Debug)]
pub(crate) enum VerifyOutcome {
    Verified,
    Rejected(&'static str),
}

#[utoipa::path(
    post,
    path = "/v1/auth/new-verification",
    request_body = NewVerificationRequest,
    responses(
        (status = 200, description = "Email verified", body = ActionResult),
        (status = 400, description = "Invalid or expired token", body = ActionResult)
    ),
    tag = "auth"
)]
pub async fn new_verification(
    pool: Extension<PgPool>,
    payload: Option<Json<NewVerificationRequest>>,
) -> impl IntoResponse {
    let token = match &payload {
        Some(Json(request)) => request.token.trim(),
        None => "",
    };
    if token.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResult::error(MSG_TOKEN_MISSING)),
        )
            .into_response();
    }

    match verify_email(&pool, token).await {
        Ok(VerifyOutcome::Verified) => (
            StatusCode::OK,
            Json(ActionResult::success(MSG_EMAIL_VERIFIED)),
        )
            .into_response(),
        Ok(VerifyOutcome::Rejected(message)) => {
            (StatusCode::BAD_REQUEST, Json(ActionResult::error(message))).into_response()
        }
        Err(err) => {
            error!("Failed to verify email: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResult::error(MSG_WENT_WRONG)),
            )
                .into_response()
        }
    }
}

/// Consume the token and stamp the user verified in one transaction.
pub(crate) async fn verify_email(pool: &PgPool, token: &str) -> Result<VerifyOutcome> {
    let mut tx = pool.begin().await.context("begin verify transaction")?;

    let Some(record) = tokens::find_by_value(&mut tx, token, TokenKind::Verification).await? else {
        return Ok(VerifyOutcome::Rejected(MSG_TOKEN_MISSING));
    };

    if record.expired {
        return Ok(VerifyOutcome::Rejected(MSG_TOKEN_EXPIRED));
    }

    let Some(user) = get_user_by_email(pool, &record.email).await? else {
        return Ok(VerifyOutcome::Rejected(MSG_EMAIL_MISSING));
    };

    // The token's email is adopted as the verified address.
    mark_email_verified(&mut tx, user.id, &record.email).await?;
    tokens::consume(&mut tx, record.id).await?;

    tx.commit().await.context("commit verify transaction")?;
    Ok(VerifyOutcome::Verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn new_verification_missing_payload() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = new_verification(Extension(pool), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn new_verification_blank_token() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = new_verification(
            Extension(pool),
            Some(Json(NewVerificationRequest {
                token: "  ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
