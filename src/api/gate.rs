//! Route gating: classify request paths and steer clients by auth state.
//!
//! Paths fall into four classes. API auth routes always pass. Auth-only
//! pages (login, register, ...) bounce already-authenticated clients to the
//! default post-login path. Protected paths bounce unauthenticated clients
//! to the login path with the original URL carried in `callbackUrl`.

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode, header::LOCATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::handlers::auth::{AuthState, session::authenticate_claims};

const API_AUTH_PREFIX: &str = "/v1/auth";
const PUBLIC_ROUTES: &[&str] = &["/", "/health", "/auth/new-verification"];
const AUTH_ROUTES: &[&str] = &[
    "/auth/login",
    "/auth/register",
    "/auth/error",
    "/auth/reset",
    "/auth/new-password",
];
const LOGIN_PATH: &str = "/auth/login";
const DEFAULT_LOGIN_REDIRECT: &str = "/settings";

/// Classification of an incoming request path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RouteClass {
    ApiAuth,
    Public,
    Auth,
    Protected,
}

/// What the gate does with a request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum GateDecision {
    Allow,
    Redirect(String),
}

pub(crate) fn classify(path: &str) -> RouteClass {
    if path.starts_with(API_AUTH_PREFIX) {
        return RouteClass::ApiAuth;
    }
    if PUBLIC_ROUTES.contains(&path) {
        return RouteClass::Public;
    }
    if AUTH_ROUTES.contains(&path) {
        return RouteClass::Auth;
    }
    RouteClass::Protected
}

pub(crate) fn decide(
    class: RouteClass,
    is_logged_in: bool,
    path: &str,
    query: Option<&str>,
) -> GateDecision {
    match class {
        RouteClass::ApiAuth | RouteClass::Public => GateDecision::Allow,
        RouteClass::Auth => {
            if is_logged_in {
                GateDecision::Redirect(DEFAULT_LOGIN_REDIRECT.to_string())
            } else {
                GateDecision::Allow
            }
        }
        RouteClass::Protected => {
            if is_logged_in {
                GateDecision::Allow
            } else {
                let mut callback_url = path.to_string();
                if let Some(query) = query {
                    callback_url.push('?');
                    callback_url.push_str(query);
                }
                let encoded: String =
                    url::form_urlencoded::byte_serialize(callback_url.as_bytes()).collect();
                GateDecision::Redirect(format!("{LOGIN_PATH}?callbackUrl={encoded}"))
            }
        }
    }
}

/// Middleware applying the gate to every request.
pub(crate) async fn enforce(request: Request, next: Next) -> Response {
    let is_logged_in = request
        .extensions()
        .get::<Arc<AuthState>>()
        .is_some_and(|state| authenticate_claims(request.headers(), state).is_some());

    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);

    match decide(classify(&path), is_logged_in, &path, query.as_deref()) {
        GateDecision::Allow => next.run(request).await,
        GateDecision::Redirect(location) => match HeaderValue::from_str(&location) {
            Ok(location) => {
                (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, location)]).into_response()
            }
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{GateDecision, RouteClass, classify, decide};

    #[test]
    fn classify_api_auth_prefix() {
        assert_eq!(classify("/v1/auth/login"), RouteClass::ApiAuth);
        assert_eq!(classify("/v1/auth/session"), RouteClass::ApiAuth);
    }

    #[test]
    fn classify_known_routes() {
        assert_eq!(classify("/"), RouteClass::Public);
        assert_eq!(classify("/health"), RouteClass::Public);
        assert_eq!(classify("/auth/login"), RouteClass::Auth);
        assert_eq!(classify("/auth/reset"), RouteClass::Auth);
        assert_eq!(classify("/settings"), RouteClass::Protected);
        assert_eq!(classify("/v1/me"), RouteClass::Protected);
    }

    #[test]
    fn api_auth_always_passes() {
        assert_eq!(
            decide(RouteClass::ApiAuth, false, "/v1/auth/login", None),
            GateDecision::Allow
        );
        assert_eq!(
            decide(RouteClass::ApiAuth, true, "/v1/auth/login", None),
            GateDecision::Allow
        );
    }

    #[test]
    fn auth_routes_bounce_logged_in_clients() {
        assert_eq!(
            decide(RouteClass::Auth, true, "/auth/login", None),
            GateDecision::Redirect("/settings".to_string())
        );
        assert_eq!(
            decide(RouteClass::Auth, false, "/auth/login", None),
            GateDecision::Allow
        );
    }

    #[test]
    fn protected_routes_redirect_with_callback() {
        assert_eq!(
            decide(RouteClass::Protected, false, "/settings", None),
            GateDecision::Redirect("/auth/login?callbackUrl=%2Fsettings".to_string())
        );
        assert_eq!(
            decide(RouteClass::Protected, true, "/settings", None),
            GateDecision::Allow
        );
    }

    #[test]
    fn callback_preserves_query_string() {
        assert_eq!(
            decide(RouteClass::Protected, false, "/settings", Some("tab=security")),
            GateDecision::Redirect(
                "/auth/login?callbackUrl=%2Fsettings%3Ftab%3Dsecurity".to_string()
            )
        );
    }
}
