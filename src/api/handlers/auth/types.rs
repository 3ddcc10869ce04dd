//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User role propagated into session claims.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    pub(crate) fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// Discriminated action result: exactly one of `error`, `success`, or
/// `twoFactor` is present.
#[derive(ToSchema, Serialize, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum ActionResult {
    Success {
        success: String,
    },
    Error {
        error: String,
    },
    TwoFactor {
        #[serde(rename = "twoFactor")]
        two_factor: bool,
    },
}

impl ActionResult {
    pub(crate) fn success(message: &str) -> Self {
        Self::Success {
            success: message.to_string(),
        }
    }

    pub(crate) fn error(message: &str) -> Self {
        Self::Error {
            error: message.to_string(),
        }
    }

    pub(crate) fn two_factor() -> Self {
        Self::TwoFactor { two_factor: true }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct NewVerificationRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct NewPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Externally visible session user, copied verbatim from the token claims.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    pub is_two_factor_enabled: bool,
    pub is_oauth: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SessionResponse {
    pub user: SessionUser,
    pub expires: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!(Role::from_str("admin"), Some(Role::Admin));
        assert_eq!(Role::from_str("user"), Some(Role::User));
        assert_eq!(Role::from_str("root"), None);
        assert_eq!(Role::Admin.as_str(), "admin");
        assert_eq!(Role::User.as_str(), "user");
    }

    #[test]
    fn action_result_serializes_single_key() -> Result<()> {
        let success = serde_json::to_value(ActionResult::success("Logged in!"))?;
        let object = success.as_object().context("expected object")?;
        assert_eq!(object.len(), 1);
        assert_eq!(object.get("success").and_then(|v| v.as_str()), Some("Logged in!"));

        let error = serde_json::to_value(ActionResult::error("Invalid fields!"))?;
        let object = error.as_object().context("expected object")?;
        assert_eq!(object.len(), 1);
        assert_eq!(
            object.get("error").and_then(|v| v.as_str()),
            Some("Invalid fields!")
        );

        let two_factor = serde_json::to_value(ActionResult::two_factor())?;
        let object = two_factor.as_object().context("expected object")?;
        assert_eq!(object.len(), 1);
        assert_eq!(
            object.get("twoFactor").and_then(serde_json::Value::as_bool),
            Some(true)
        );
        Ok(())
    }

    #[test]
    fn login_request_accepts_missing_code() -> Result<()> {
        let request: LoginRequest =
            serde_json::from_str(r#"{"email":"a@x.com","password":"secret1"}"#)?;
        assert_eq!(request.email, "a@x.com");
        assert!(request.code.is_none());
        Ok(())
    }
}
