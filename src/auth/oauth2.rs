//! OAuth2 sign in and registration.
//!
//! A provider turns an authorization code into a remote identity; the
//! service maps that identity onto a local account.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        errors::AuthError,
        jwt::TokenService,
        oauth2_state::{OAuth2State, OAuth2StateRepository},
        repo::{RepoError, UniqueField, UserRepository},
        repo_types::NewUser,
        validation::is_valid_email,
    },
    config::GoogleConfig,
};

pub const PROVIDER_GOOGLE: &str = "google";

/// Identity reported by an external provider after a code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Identity {
    pub email: String,
    pub full_name: String,
    pub provider: String,
}

#[async_trait]
pub trait OAuth2Provider: Send + Sync {
    fn name(&self) -> &str;

    /// URL the user agent is sent to in order to obtain a code.
    fn authorize_url(&self, state: &str) -> String;

    async fn get_user(&self, code: &str) -> anyhow::Result<OAuth2Identity>;
}

/// Providers keyed by lower-cased name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn OAuth2Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn OAuth2Provider>) -> Self {
        self.providers
            .insert(provider.name().to_lowercase(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn OAuth2Provider>, AuthError> {
        self.providers
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| AuthError::InvalidOAuth2Provider(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Serialize)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

pub struct OAuth2Service {
    users: Arc<dyn UserRepository>,
    states: Arc<dyn OAuth2StateRepository>,
    providers: ProviderRegistry,
    tokens: TokenService,
}

impl OAuth2Service {
    pub fn new(
        users: Arc<dyn UserRepository>,
        states: Arc<dyn OAuth2StateRepository>,
        providers: ProviderRegistry,
        tokens: TokenService,
    ) -> Self {
        Self {
            users,
            states,
            providers,
            tokens,
        }
    }

    /// Builds the provider redirect with a fresh random `state`. The state is
    /// stored and must come back through one of the callback operations.
    pub async fn authorization(&self, provider: &str) -> Result<AuthorizationRequest, AuthError> {
        let provider = self.providers.get(provider)?;
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        self.states
            .save(OAuth2State::new(nonce.clone(), provider.name()))
            .await?;
        Ok(AuthorizationRequest {
            url: provider.authorize_url(&nonce),
            state: nonce,
        })
    }

    /// Consumes a stored state and returns the provider it was issued for.
    async fn redeem_state(&self, nonce: &str) -> Result<String, AuthError> {
        match self.states.take(nonce).await? {
            Some(state) => Ok(state.provider),
            None => {
                warn!("oauth2 callback with unknown or reused state");
                Err(AuthError::NotAuthenticated)
            }
        }
    }

    /// [`Self::register`] for a provider callback carrying `state`.
    #[instrument(skip(self, state, code))]
    pub async fn register_callback(&self, state: &str, code: &str) -> Result<i64, AuthError> {
        let provider = self.redeem_state(state).await?;
        self.register(&provider, code).await
    }

    /// [`Self::sign_in`] for a provider callback carrying `state`.
    #[instrument(skip(self, state, code))]
    pub async fn sign_in_callback(&self, state: &str, code: &str) -> Result<String, AuthError> {
        let provider = self.redeem_state(state).await?;
        self.sign_in(&provider, code).await
    }

    async fn exchange(&self, provider: &str, code: &str) -> Result<OAuth2Identity, AuthError> {
        let provider = self.providers.get(provider)?;
        provider.get_user(code).await.map_err(|e| {
            warn!(provider = provider.name(), error = %e, "oauth2 code exchange failed");
            AuthError::NotAuthenticated
        })
    }

    #[instrument(skip(self, code))]
    pub async fn register(&self, provider: &str, code: &str) -> Result<i64, AuthError> {
        let identity = self.exchange(provider, code).await?;
        if !is_valid_email(&identity.email) {
            warn!(provider = %identity.provider, "oauth2 identity without a usable email");
            return Err(AuthError::NotAuthenticated);
        }

        if self.users.find_by_email(&identity.email).await?.is_some() {
            warn!(email = %identity.email, "oauth2 register with existing email");
            return Err(AuthError::EmailExisted(identity.email));
        }

        let user = NewUser::oauth2_user(&identity.email, &identity.provider)
            .with_full_name(identity.full_name.clone());
        let id = match self.users.create(&user).await {
            Ok(id) => id,
            Err(RepoError::Duplicate(UniqueField::Email)) => {
                return Err(AuthError::EmailExisted(identity.email))
            }
            Err(e) => return Err(AuthError::unknown(e)),
        };

        info!(
            user_id = id,
            email = %identity.email,
            provider = %identity.provider,
            "oauth2 user registered"
        );
        Ok(id)
    }

    #[instrument(skip(self, code))]
    pub async fn sign_in(&self, provider: &str, code: &str) -> Result<String, AuthError> {
        let identity = self.exchange(provider, code).await?;

        let user = match self.users.find_by_email(&identity.email).await? {
            Some(u) => u,
            None => {
                warn!(email = %identity.email, "oauth2 sign in unknown email");
                return Err(AuthError::NotAuthenticated);
            }
        };

        let same_provider = user
            .provider
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(&identity.provider));
        if !same_provider {
            warn!(user_id = user.id, provider = %identity.provider, "oauth2 provider mismatch");
            return Err(AuthError::NotAuthenticated);
        }

        if !user.is_active {
            return Err(AuthError::NotActivated);
        }

        let token = self.tokens.generate_token(&user)?;
        info!(user_id = user.id, provider = %identity.provider, "oauth2 user signed in");
        Ok(token)
    }
}

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const GOOGLE_SCOPES: &str = concat!(
    "https://www.googleapis.com/auth/userinfo.email ",
    "https://www.googleapis.com/auth/userinfo.profile",
);

pub struct GoogleProvider {
    cfg: GoogleConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GoogleToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
}

impl GoogleUser {
    fn full_name(&self) -> String {
        match self.name.as_deref() {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!(
                "{} {}",
                self.given_name.as_deref().unwrap_or_default(),
                self.family_name.as_deref().unwrap_or_default()
            )
            .trim()
            .to_string(),
        }
    }
}

impl GoogleProvider {
    pub fn new(cfg: GoogleConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self { cfg, http }
    }
}

#[async_trait]
impl OAuth2Provider for GoogleProvider {
    fn name(&self) -> &str {
        PROVIDER_GOOGLE
    }

    fn authorize_url(&self, state: &str) -> String {
        let mut url = reqwest::Url::parse(GOOGLE_AUTH_URL).expect("static url");
        url.query_pairs_mut()
            .append_pair("client_id", &self.cfg.client_id)
            .append_pair("redirect_uri", &self.cfg.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", GOOGLE_SCOPES)
            .append_pair("access_type", "offline")
            .append_pair("state", state);
        url.to_string()
    }

    async fn get_user(&self, code: &str) -> anyhow::Result<OAuth2Identity> {
        let token: GoogleToken = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.cfg.client_id.as_str()),
                ("client_secret", self.cfg.client_secret.as_str()),
                ("redirect_uri", self.cfg.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("google token request")?
            .error_for_status()
            .context("google token exchange")?
            .json()
            .await
            .context("google token body")?;

        let user: GoogleUser = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("google userinfo request")?
            .error_for_status()
            .context("google userinfo")?
            .json()
            .await
            .context("google userinfo body")?;

        Ok(OAuth2Identity {
            full_name: user.full_name(),
            email: user.email,
            provider: PROVIDER_GOOGLE.to_string(),
        })
    }
}
