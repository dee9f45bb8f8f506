use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use super::dto::RegisterInput;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// The field rule a payload broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("email is not well-formed")]
    Email,
    #[error("password is required")]
    PasswordRequired,
    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),
    #[error("password must be at most {0} characters")]
    PasswordTooLong(usize),
    #[error("password must contain a letter")]
    PasswordMissingLetter,
    #[error("password must contain a digit")]
    PasswordMissingDigit,
    #[error("password confirmation does not match")]
    ConfirmationMismatch,
    #[error("username is required")]
    UsernameRequired,
    #[error("username must be between {0} and {1} characters")]
    UsernameLength(usize, usize),
    #[error("full name is required")]
    FullNameRequired,
}

/// Whether registration carries a username and enforces its uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsernamePolicy {
    Required,
    #[default]
    Optional,
    /// Usernames are not part of the schema; any submitted value is dropped.
    Disabled,
}

impl std::str::FromStr for UsernamePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "optional" => Ok(Self::Optional),
            "disabled" => Ok(Self::Disabled),
            other => anyhow::bail!("unknown username policy: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationPolicy {
    pub username: UsernamePolicy,
    pub username_min_len: usize,
    pub username_max_len: usize,
    pub password_min_len: usize,
    pub password_max_len: Option<usize>,
    pub require_full_name: bool,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            username: UsernamePolicy::Optional,
            username_min_len: 2,
            username_max_len: 30,
            password_min_len: 8,
            password_max_len: Some(72),
            require_full_name: true,
        }
    }
}

impl RegistrationPolicy {
    pub fn check_password(&self, password: &str) -> Result<(), ValidationError> {
        let len = password.chars().count();
        if len < self.password_min_len {
            return Err(ValidationError::PasswordTooShort(self.password_min_len));
        }
        if let Some(max) = self.password_max_len {
            if len > max {
                return Err(ValidationError::PasswordTooLong(max));
            }
        }
        if !password.chars().any(char::is_alphabetic) {
            return Err(ValidationError::PasswordMissingLetter);
        }
        if !password.chars().any(char::is_numeric) {
            return Err(ValidationError::PasswordMissingDigit);
        }
        Ok(())
    }

    /// Validates a registration payload and returns the username to store,
    /// which is `None` when the policy disables usernames or none was given.
    pub fn check_registration(
        &self,
        input: &RegisterInput,
    ) -> Result<Option<String>, ValidationError> {
        if !is_valid_email(&input.email) {
            return Err(ValidationError::Email);
        }
        self.check_password(&input.password)?;
        if input.password_confirmation != input.password {
            return Err(ValidationError::ConfirmationMismatch);
        }

        let username = match self.username {
            UsernamePolicy::Disabled => None,
            policy => {
                let given = input
                    .username
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty());
                match given {
                    None if policy == UsernamePolicy::Required => {
                        return Err(ValidationError::UsernameRequired)
                    }
                    None => None,
                    Some(u) => {
                        let len = u.chars().count();
                        if len < self.username_min_len || len > self.username_max_len {
                            return Err(ValidationError::UsernameLength(
                                self.username_min_len,
                                self.username_max_len,
                            ));
                        }
                        Some(u.to_string())
                    }
                }
            }
        };

        if self.require_full_name && input.full_name.trim().is_empty() {
            return Err(ValidationError::FullNameRequired);
        }
        Ok(username)
    }
}

/// Shape check for a sign-in attempt; the password content is not judged here.
pub fn check_sign_in(email: &str, password: &str) -> Result<(), ValidationError> {
    if !is_valid_email(email) {
        return Err(ValidationError::Email);
    }
    if password.is_empty() {
        return Err(ValidationError::PasswordRequired);
    }
    Ok(())
}
