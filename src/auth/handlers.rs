use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64ct::{Base64, Encoding};
use serde_json::json;
use tracing::{error, instrument, warn};

use crate::{
    auth::{
        dto::{
            OAuth2Request, ProfileResponse, RegisterInput, RegisteredResponse, SignInRequest,
            TokenResponse,
        },
        errors::{AuthError, ErrorKind},
        extractors::AuthUser,
        oauth2::AuthorizationRequest,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signin", post(sign_in))
        .route("/auth/register", post(register))
        .route("/auth/oauth2/register", post(oauth2_register))
        .route("/auth/oauth2/signin", post(oauth2_sign_in))
        .route("/auth/oauth2/:provider", get(oauth2_authorize))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::InvalidInput | ErrorKind::InvalidOAuth2Provider => StatusCode::BAD_REQUEST,
            ErrorKind::NotAuthenticated | ErrorKind::NotActivated => StatusCode::UNAUTHORIZED,
            ErrorKind::EmailExisted | ErrorKind::UsernameExisted => StatusCode::CONFLICT,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            AuthError::Unknown(e) => {
                error!(error = ?e, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// `Authorization: Basic base64(email:password)`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = Base64::decode_vec(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (email, password) = decoded.split_once(':')?;
    Some((email.to_string(), password.to_string()))
}

#[instrument(skip(state, headers, body))]
pub async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<SignInRequest>>,
) -> Result<Json<TokenResponse>, AuthError> {
    let (email, password) = basic_credentials(&headers)
        .or_else(|| body.map(|Json(b)| (b.email, b.password)))
        .unwrap_or_default();

    let token = state.sign_in.sign_in(email.trim(), &password).await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state, input), fields(email = %input.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<RegisteredResponse>), AuthError> {
    let id = state.register.register(input).await?;
    Ok((StatusCode::CREATED, Json(RegisteredResponse { id })))
}

#[instrument(skip(state))]
pub async fn oauth2_authorize(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Json<AuthorizationRequest>, AuthError> {
    Ok(Json(state.oauth2.authorization(&provider).await?))
}

#[instrument(skip(state, payload))]
pub async fn oauth2_register(
    State(state): State<AppState>,
    Json(payload): Json<OAuth2Request>,
) -> Result<(StatusCode, Json<RegisteredResponse>), AuthError> {
    let id = state
        .oauth2
        .register_callback(&payload.state, &payload.code)
        .await?;
    Ok((StatusCode::CREATED, Json(RegisteredResponse { id })))
}

#[instrument(skip(state, payload))]
pub async fn oauth2_sign_in(
    State(state): State<AppState>,
    Json(payload): Json<OAuth2Request>,
) -> Result<Json<TokenResponse>, AuthError> {
    let token = state
        .oauth2
        .sign_in_callback(&payload.state, &payload.code)
        .await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, AuthError> {
    match state.users.find_by_id(user_id).await? {
        Some(user) => Ok(Json(user.into())),
        None => {
            warn!(user_id, "token for missing user");
            Err(AuthError::NotAuthenticated)
        }
    }
}
