use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::password::{hash_password, HashingError};

/// User record as stored by a repository.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub hashed_password: String,        // Argon2 PHC string, empty for OAuth2 accounts
    pub full_name: String,
    pub is_active: bool,
    pub is_super_admin: bool,
    #[serde(skip_serializing)]
    pub activation_key: Option<String>,
    pub provider: Option<String>,       // OAuth2 provider tag, None for password accounts
    pub created_at: OffsetDateTime,
}

/// A user that has not been persisted yet; the repository assigns `id` and
/// `created_at` on create.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub hashed_password: String,
    pub full_name: String,
    pub is_active: bool,
    pub is_super_admin: bool,
    pub activation_key: Option<String>,
    pub provider: Option<String>,
}

impl NewUser {
    /// Inactive account with a hashed password and a fresh activation key.
    pub fn password_user(email: &str, password: &str) -> Result<Self, HashingError> {
        let hashed_password = hash_password(password)?;
        Ok(Self {
            email: email.to_string(),
            hashed_password,
            is_active: false,
            activation_key: Some(Uuid::new_v4().to_string()),
            ..Self::default()
        })
    }

    /// Active account owned by an external identity provider.
    pub fn oauth2_user(email: &str, provider: &str) -> Self {
        Self {
            email: email.to_string(),
            is_active: true,
            provider: Some(provider.to_string()),
            ..Self::default()
        }
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    pub fn super_admin(mut self) -> Self {
        self.is_super_admin = true;
        self
    }

    pub fn activated(mut self) -> Self {
        self.is_active = true;
        self
    }

    pub(crate) fn into_user(self, id: i64, created_at: OffsetDateTime) -> User {
        User {
            id,
            email: self.email,
            username: self.username,
            hashed_password: self.hashed_password,
            full_name: self.full_name,
            is_active: self.is_active,
            is_super_admin: self.is_super_admin,
            activation_key: self.activation_key,
            provider: self.provider,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;

    #[test]
    fn password_user_starts_inactive_with_activation_key() {
        let u = NewUser::password_user("foo@bar.com", "abcd1234").unwrap();
        assert!(!u.is_active);
        assert!(u.provider.is_none());
        assert!(verify_password("abcd1234", &u.hashed_password));
        let key = u.activation_key.expect("activation key");
        assert_eq!(Uuid::parse_str(&key).unwrap().get_version_num(), 4);
    }

    #[test]
    fn activation_keys_are_unique() {
        let a = NewUser::password_user("a@bar.com", "abcd1234").unwrap();
        let b = NewUser::password_user("b@bar.com", "abcd1234").unwrap();
        assert_ne!(a.activation_key, b.activation_key);
    }

    #[test]
    fn oauth2_user_is_active_with_provider_and_no_password() {
        let u = NewUser::oauth2_user("foo@bar.com", "google");
        assert!(u.is_active);
        assert_eq!(u.provider.as_deref(), Some("google"));
        assert!(u.hashed_password.is_empty());
        assert!(u.activation_key.is_none());
    }

    #[test]
    fn user_json_hides_secrets() {
        let u = NewUser::password_user("foo@bar.com", "abcd1234")
            .unwrap()
            .into_user(1, OffsetDateTime::now_utc());
        let json = serde_json::to_string(&u).unwrap();
        assert!(json.contains("foo@bar.com"));
        assert!(!json.contains("hashed_password"));
        assert!(!json.contains("activation_key"));
    }
}
