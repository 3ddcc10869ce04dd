//! Auth configuration and shared state.

use jsonwebtoken::{DecodingKey, EncodingKey};
use secrecy::{ExposeSecret, SecretString};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_TWO_FACTOR_TOKEN_TTL_SECONDS: i64 = 5 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_secret: SecretString,
    session_ttl_seconds: i64,
    verification_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    two_factor_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String, session_secret: SecretString) -> Self {
        Self {
            frontend_base_url,
            session_secret,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            verification_token_ttl_seconds: DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            two_factor_token_ttl_seconds: DEFAULT_TWO_FACTOR_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_two_factor_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.two_factor_token_ttl_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn verification_token_ttl_seconds(&self) -> i64 {
        self.verification_token_ttl_seconds
    }

    pub(crate) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(crate) fn two_factor_token_ttl_seconds(&self) -> i64 {
        self.two_factor_token_ttl_seconds
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Shared auth state: configuration plus the session signing keys derived
/// from the configured secret.
pub struct AuthState {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let secret = config.session_secret.expose_secret().as_bytes();
        let encoding_key = EncodingKey::from_secret(secret);
        let decoding_key = DecodingKey::from_secret(secret);
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, AuthState};
    use secrecy::SecretString;

    fn config() -> AuthConfig {
        AuthConfig::new(
            "https://janua.dev".to_string(),
            SecretString::from("signing-secret"),
        )
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = config();

        assert_eq!(config.frontend_base_url(), "https://janua.dev");
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert_eq!(
            config.verification_token_ttl_seconds(),
            super::DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.reset_token_ttl_seconds(),
            super::DEFAULT_RESET_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.two_factor_token_ttl_seconds(),
            super::DEFAULT_TWO_FACTOR_TOKEN_TTL_SECONDS
        );
        assert!(config.session_cookie_secure());

        let config = config
            .with_session_ttl_seconds(3600)
            .with_verification_token_ttl_seconds(120)
            .with_reset_token_ttl_seconds(240)
            .with_two_factor_token_ttl_seconds(60);

        assert_eq!(config.session_ttl_seconds(), 3600);
        assert_eq!(config.verification_token_ttl_seconds(), 120);
        assert_eq!(config.reset_token_ttl_seconds(), 240);
        assert_eq!(config.two_factor_token_ttl_seconds(), 60);
    }

    #[test]
    fn insecure_frontend_disables_secure_cookie() {
        let config = AuthConfig::new(
            "http://localhost:3000".to_string(),
            SecretString::from("signing-secret"),
        );
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn auth_state_exposes_config() {
        let state = AuthState::new(config());
        assert_eq!(state.config().frontend_base_url(), "https://janua.dev");
    }
}
