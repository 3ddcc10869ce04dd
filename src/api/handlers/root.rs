use axum::response::IntoResponse;

/// Undocumented root route; points humans at the service name and version.
pub async fn root() -> impl IntoResponse {
    crate::APP_USER_AGENT
}
