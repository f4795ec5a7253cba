use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ApiResponse;
use crate::models::AccountId;

/// Missing fields decode as empty strings and then fail validation.
#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(email(message = "is not a valid email"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(min = 4, max = 64, message = "must be between 4 and 64 characters"))]
    pub password: String,
}

impl RegisterRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Public identity summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
    pub email: String,
    pub user_id: AccountId,
    pub is_activated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(flatten)]
    pub response: ApiResponse,
    pub user: UserDto,
    pub access_token: String,
    pub refresh_token: String,
}
