use crate::state::AppState;
use axum::Router;

pub mod activation;
pub mod claims;
pub mod dto;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod oauth2;
pub mod oauth2_state;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
#[cfg(test)]
pub(crate) mod test_support;
pub mod validation;

pub use errors::{AuthError, ErrorKind};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
