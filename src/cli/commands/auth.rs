use clap::{Arg, Command};

pub const ARG_SESSION_SECRET: &str = "session-secret";

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_token_args(command);
    with_outbox_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for verification and reset links")
                .env("JANUA_FRONTEND_BASE_URL")
                .default_value("https://janua.dev"),
        )
        .arg(
            Arg::new(ARG_SESSION_SECRET)
                .long("session-secret")
                .help("Secret used to sign session tokens")
                .env("JANUA_SESSION_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session cookie TTL in seconds")
                .env("JANUA_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("verification-token-ttl-seconds")
                .long("verification-token-ttl-seconds")
                .help("Email verification token TTL in seconds")
                .env("JANUA_VERIFICATION_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-token-ttl-seconds")
                .long("reset-token-ttl-seconds")
                .help("Password reset token TTL in seconds")
                .env("JANUA_RESET_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("two-factor-token-ttl-seconds")
                .long("two-factor-token-ttl-seconds")
                .help("Two-factor code TTL in seconds")
                .env("JANUA_TWO_FACTOR_TOKEN_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("JANUA_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("JANUA_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("JANUA_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("JANUA_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("JANUA_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}
