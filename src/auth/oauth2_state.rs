use std::collections::HashMap;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::repo::RepoError;

/// Nonce handed out with an authorization redirect, bound to the provider it
/// was minted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2State {
    pub nonce: String,
    pub provider: String,
    pub created_at: OffsetDateTime,
}

impl OAuth2State {
    pub fn new(nonce: String, provider: &str) -> Self {
        Self {
            nonce,
            provider: provider.to_lowercase(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[async_trait]
pub trait OAuth2StateRepository: Send + Sync {
    /// Fails when the nonce is already stored.
    async fn save(&self, state: OAuth2State) -> Result<(), RepoError>;

    /// Removes the state and returns it. A nonce can be taken at most once;
    /// expired entries are reported as missing.
    async fn take(&self, nonce: &str) -> Result<Option<OAuth2State>, RepoError>;
}

pub struct MemoryOAuth2StateRepository {
    states: RwLock<HashMap<String, OAuth2State>>,
    ttl: Duration,
}

impl Default for MemoryOAuth2StateRepository {
    fn default() -> Self {
        Self::with_ttl(Duration::minutes(10))
    }
}

impl MemoryOAuth2StateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn expired(&self, state: &OAuth2State, now: OffsetDateTime) -> bool {
        state.created_at + self.ttl <= now
    }
}

#[async_trait]
impl OAuth2StateRepository for MemoryOAuth2StateRepository {
    async fn save(&self, state: OAuth2State) -> Result<(), RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut states = self.states.write().await;
        states.retain(|_, s| !self.expired(s, now));
        if states.contains_key(&state.nonce) {
            return Err(anyhow::anyhow!("oauth2 state already existed").into());
        }
        debug!(provider = %state.provider, "oauth2 state stored");
        states.insert(state.nonce.clone(), state);
        Ok(())
    }

    async fn take(&self, nonce: &str) -> Result<Option<OAuth2State>, RepoError> {
        let state = self.states.write().await.remove(nonce);
        Ok(state.filter(|s| !self.expired(s, OffsetDateTime::now_utc())))
    }
}
