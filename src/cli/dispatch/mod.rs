//! Command-line argument dispatch and server initialization.
//!
//! This module maps validated CLI arguments to the appropriate action, such
//! as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let session_secret = matches
        .get_one::<String>("session-secret")
        .cloned()
        .context("missing required argument: --session-secret")?;
    let frontend_base_url = matches
        .get_one::<String>("frontend-base-url")
        .cloned()
        .context("missing required argument: --frontend-base-url")?;

    let get_i64 = |name: &str| -> Result<i64> {
        matches
            .get_one::<i64>(name)
            .copied()
            .with_context(|| format!("missing required argument: --{name}"))
    };
    let get_u64 = |name: &str| -> Result<u64> {
        matches
            .get_one::<u64>(name)
            .copied()
            .with_context(|| format!("missing required argument: --{name}"))
    };

    Ok(Action::Server(Box::new(Args {
        port,
        dsn,
        session_secret: SecretString::from(session_secret),
        frontend_base_url,
        session_ttl_seconds: get_i64("session-ttl-seconds")?,
        verification_token_ttl_seconds: get_i64("verification-token-ttl-seconds")?,
        reset_token_ttl_seconds: get_i64("reset-token-ttl-seconds")?,
        two_factor_token_ttl_seconds: get_i64("two-factor-token-ttl-seconds")?,
        email_outbox_poll_seconds: get_u64("email-outbox-poll-seconds")?,
        email_outbox_batch_size: matches
            .get_one::<usize>("email-outbox-batch-size")
            .copied()
            .context("missing required argument: --email-outbox-batch-size")?,
        email_outbox_max_attempts: matches
            .get_one::<u32>("email-outbox-max-attempts")
            .copied()
            .context("missing required argument: --email-outbox-max-attempts")?,
        email_outbox_backoff_base_seconds: get_u64("email-outbox-backoff-base-seconds")?,
        email_outbox_backoff_max_seconds: get_u64("email-outbox-backoff-max-seconds")?,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;

    #[test]
    fn session_secret_required() {
        temp_env::with_vars(
            [
                ("JANUA_SESSION_SECRET", None::<&str>),
                ("JANUA_DSN", Some("postgres://user@localhost:5432/janua")),
            ],
            || {
                let command = crate::cli::commands::new();
                let result = command.try_get_matches_from(vec!["janua"]);
                assert!(result.is_err());
            },
        );
    }

    #[test]
    fn dispatches_server_action() {
        temp_env::with_vars(
            [
                ("JANUA_SESSION_SECRET", Some("signing-secret")),
                ("JANUA_DSN", Some("postgres://user@localhost:5432/janua")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["janua"]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.port, 8080);
                    assert_eq!(args.session_ttl_seconds, 604_800);
                    assert_eq!(args.two_factor_token_ttl_seconds, 300);
                }
            },
        );
    }
}
