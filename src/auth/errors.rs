use thiserror::Error;

use super::jwt::TokenSigningError;
use super::password::HashingError;
use super::repo::RepoError;
use super::validation::ValidationError;

/// Every failure the auth core hands back to its callers.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("not activated")]
    NotActivated,

    #[error("email already existed: {0}")]
    EmailExisted(String),

    #[error("username already existed: {0}")]
    UsernameExisted(String),

    #[error("oauth2 provider not supported: {0}")]
    InvalidOAuth2Provider(String),

    #[error("unknown error")]
    Unknown(#[source] anyhow::Error),
}

/// Flat discriminant of [`AuthError`], used by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotAuthenticated,
    NotActivated,
    EmailExisted,
    UsernameExisted,
    InvalidOAuth2Provider,
    Unknown,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotAuthenticated => ErrorKind::NotAuthenticated,
            Self::NotActivated => ErrorKind::NotActivated,
            Self::EmailExisted(_) => ErrorKind::EmailExisted,
            Self::UsernameExisted(_) => ErrorKind::UsernameExisted,
            Self::InvalidOAuth2Provider(_) => ErrorKind::InvalidOAuth2Provider,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn unknown(err: impl Into<anyhow::Error>) -> Self {
        Self::Unknown(err.into())
    }
}

impl From<HashingError> for AuthError {
    fn from(e: HashingError) -> Self {
        Self::unknown(e)
    }
}

impl From<TokenSigningError> for AuthError {
    fn from(e: TokenSigningError) -> Self {
        Self::unknown(e)
    }
}

impl From<RepoError> for AuthError {
    fn from(e: RepoError) -> Self {
        Self::unknown(e)
    }
}
