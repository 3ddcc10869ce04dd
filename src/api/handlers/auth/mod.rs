//! Authentication flows: registration, login, email verification,
//! two-factor challenges, password reset, and session management.

pub mod lifecycle;
pub mod login;
pub(crate) mod password;
pub mod register;
pub mod reset;
pub mod session;
pub mod state;
pub(crate) mod storage;
pub(crate) mod tokens;
pub mod types;
pub(crate) mod utils;
pub mod verification;

pub use lifecycle::{SessionClaims, SessionLifecycle, SignInDecision};
pub use state::{AuthConfig, AuthState};
pub use types::Role;

// User-facing result messages. Exactly one of these lands in the single-key
// action result returned by each endpoint.
pub(crate) const MSG_INVALID_FIELDS: &str = "Invalid fields!";
pub(crate) const MSG_INVALID_CREDENTIALS: &str = "Invalid credentials!";
pub(crate) const MSG_EMAIL_IN_USE: &str = "Email already in use!";
pub(crate) const MSG_CONFIRMATION_SENT: &str = "Confirmation email sent!";
pub(crate) const MSG_INVALID_CODE: &str = "Invalid code!";
pub(crate) const MSG_CODE_EXPIRED: &str = "Code has expired!";
pub(crate) const MSG_LOGGED_IN: &str = "Logged in!";
pub(crate) const MSG_WENT_WRONG: &str = "Something went wrong!";
pub(crate) const MSG_TOKEN_MISSING: &str = "Token does not exist!";
pub(crate) const MSG_TOKEN_INVALID: &str = "Invalid token!";
pub(crate) const MSG_TOKEN_EXPIRED: &str = "Token has expired!";
pub(crate) const MSG_EMAIL_MISSING: &str = "Email does not exist!";
pub(crate) const MSG_EMAIL_VERIFIED: &str = "Email verified!";
pub(crate) const MSG_RESET_SENT: &str = "Reset email sent!";
pub(crate) const MSG_EMAIL_NOT_FOUND: &str = "Email not found!";
pub(crate) const MSG_PASSWORD_UPDATED: &str = "Password updated!";
pub(crate) const MSG_VERIFICATION_SENT: &str = "Verification email sent!";
pub(crate) const MSG_SETTINGS_UPDATED: &str = "Settings updated!";
