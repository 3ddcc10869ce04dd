//! Session token signing and the session/logout endpoints.

use anyhow::{Context, Result};
use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use jsonwebtoken::{Algorithm, Header, Validation};
use std::sync::Arc;
use tracing::error;

use super::lifecycle::{SessionClaims, SessionLifecycle};
use super::state::AuthState;
use super::types::SessionResponse;
use super::utils::unix_now;

const SESSION_COOKIE_NAME: &str = "janua_session";

/// Sign the claims into a compact session token.
pub(crate) fn encode_session_token(state: &AuthState, claims: &SessionClaims) -> Result<String> {
    jsonwebtoken::encode(&Header::default(), claims, state.encoding_key())
        .context("failed to sign session token")
}

/// Decode and validate a session token. Expired or tampered tokens yield
/// `None`; callers treat that the same as no session.
pub(crate) fn decode_session_token(state: &AuthState, token: &str) -> Option<SessionClaims> {
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<SessionClaims>(token, state.decoding_key(), &validation)
        .map(|data| data.claims)
        .ok()
}

/// Resolve the request's session claims, if a valid token is presented.
pub(crate) fn authenticate_claims(headers: &HeaderMap, state: &AuthState) -> Option<SessionClaims> {
    let token = extract_session_token(headers)?;
    decode_session_token(state, &token)
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    lifecycle: Extension<SessionLifecycle>,
) -> impl IntoResponse {
    // Missing or invalid cookies are treated as "no session".
    let Some(claims) = authenticate_claims(&headers, &auth_state) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let refreshed = match lifecycle.refresh_claims(claims).await {
        Ok(refreshed) => refreshed,
        Err(err) => {
            error!("Failed to refresh session claims: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Re-issue the cookie so refreshed claims reach the client; the original
    // expiry is preserved rather than extended.
    let mut response_headers = HeaderMap::new();
    match encode_session_token(&auth_state, &refreshed) {
        Ok(token) => {
            let max_age = refreshed.exp.saturating_sub(unix_now()).max(0);
            if let Ok(cookie) = session_cookie_with_max_age(&auth_state, &token, max_age) {
                response_headers.insert(SET_COOKIE, cookie);
            }
        }
        Err(err) => error!("Failed to re-sign session token: {err}"),
    }

    let response = SessionLifecycle::materialize(&refreshed);
    (StatusCode::OK, response_headers, Json(response)).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Sessions are stateless; logout just clears the cookie.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&auth_state) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie for a freshly issued session token.
pub(crate) fn session_cookie(
    auth_state: &AuthState,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    session_cookie_with_max_age(auth_state, token, auth_state.config().session_ttl_seconds())
}

fn session_cookie_with_max_age(
    auth_state: &AuthState,
    token: &str,
    max_age: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    // Only mark cookies secure when the frontend is served over HTTPS.
    let secure = auth_state.config().session_cookie_secure();
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(auth_state: &AuthState) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_state.config().session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::AuthConfig;
    use crate::api::handlers::auth::types::Role;
    use secrecy::SecretString;

    fn auth_state() -> AuthState {
        AuthState::new(AuthConfig::new(
            "https://janua.dev".to_string(),
            SecretString::from("signing-secret"),
        ))
    }

    fn claims() -> SessionClaims {
        let now = unix_now();
        SessionClaims {
            sub: "0d9f9e6e-3b6a-4c3f-9e46-1f5c1e9f0a11".to_string(),
            name: None,
            email: "alice@example.com".to_string(),
            role: Role::User,
            is_two_factor_enabled: false,
            is_oauth: false,
            iat: now,
            exp: now + 3600,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let state = auth_state();
        let claims = claims();
        let token = encode_session_token(&state, &claims).ok();
        let decoded = token.and_then(|token| decode_session_token(&state, &token));
        assert_eq!(decoded, Some(claims));
    }

    #[test]
    fn decode_rejects_expired_token() {
        let state = auth_state();
        let mut claims = claims();
        claims.iat -= 7200;
        claims.exp = claims.iat + 60;
        let token = encode_session_token(&state, &claims).ok();
        let decoded = token.and_then(|token| decode_session_token(&state, &token));
        assert_eq!(decoded, None);
    }

    #[test]
    fn decode_rejects_wrong_secret() {
        let state = auth_state();
        let other = AuthState::new(AuthConfig::new(
            "https://janua.dev".to_string(),
            SecretString::from("a-different-secret"),
        ));
        let token = encode_session_token(&state, &claims()).ok();
        let decoded = token.and_then(|token| decode_session_token(&other, &token));
        assert_eq!(decoded, None);
    }

    #[test]
    fn session_cookie_sets_attributes() {
        let state = auth_state();
        let cookie = session_cookie(&state, "token").ok();
        let value = cookie.as_ref().and_then(|c| c.to_str().ok());
        let value = value.unwrap_or_default();
        assert!(value.starts_with("janua_session=token;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let state = auth_state();
        let cookie = clear_session_cookie(&state).ok();
        let value = cookie.as_ref().and_then(|c| c.to_str().ok());
        assert!(value.unwrap_or_default().contains("Max-Age=0"));
    }

    #[test]
    fn extract_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("other=1; janua_session=abc; theme=dark"),
        );
        assert_eq!(extract_session_token(&headers), Some("abc".to_string()));
    }

    #[test]
    fn extract_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("janua_session=abc"),
        );
        assert_eq!(extract_session_token(&headers), Some("xyz".to_string()));
    }

    #[test]
    fn extract_token_none_when_missing() {
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
    }
}
