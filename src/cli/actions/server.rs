use crate::api;
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub session_secret: SecretString,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub verification_token_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub two_factor_token_ttl_seconds: i64,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database connection or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config =
        api::handlers::auth::AuthConfig::new(args.frontend_base_url, args.session_secret)
            .with_session_ttl_seconds(args.session_ttl_seconds)
            .with_verification_token_ttl_seconds(args.verification_token_ttl_seconds)
            .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds)
            .with_two_factor_token_ttl_seconds(args.two_factor_token_ttl_seconds);

    let email_config = api::email::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    api::new(args.port, args.dsn, auth_config, email_config).await
}
