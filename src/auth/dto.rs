use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::User;

/// Request body for password registration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    pub password: String,
    pub password_confirmation: String,
    #[serde(default)]
    pub full_name: String,
}

/// Request body for email/password sign in.
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Provider callback body for both OAuth2 register and sign in. `state` is
/// the value returned by the authorization step.
#[derive(Debug, Deserialize)]
pub struct OAuth2Request {
    pub state: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredResponse {
    pub id: i64,
}

/// Public profile of the signed-in user.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    pub full_name: String,
    pub is_active: bool,
    pub provider: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for ProfileResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            username: u.username,
            full_name: u.full_name,
            is_active: u.is_active,
            provider: u.provider,
            created_at: u.created_at,
        }
    }
}
