use std::{sync::Arc, time::Duration};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{
    auth::{claims::Claims, errors::AuthError, repo_types::User},
    config::{JwtConfig, MAX_TTL_MINUTES},
};

#[derive(Debug, Error)]
#[error("token signing failed")]
pub struct TokenSigningError(#[source] jsonwebtoken::errors::Error);

/// Source of "now" for issuing and checking tokens.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Issues and verifies HS256 bearer tokens. Holds nothing but the shared
/// secret and settings, so clones are cheap and freely shared.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
    leeway: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn with_clock(cfg: &JwtConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            ttl: Duration::from_secs(cfg.ttl_minutes.clamp(0, MAX_TTL_MINUTES) as u64 * 60),
            leeway: Duration::from_secs(cfg.leeway_seconds),
            clock,
        }
    }

    pub fn generate_token(&self, user: &User) -> Result<String, TokenSigningError> {
        let now = self.clock.now();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            user_id: user.id,
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenSigningError)?;
        debug!(user_id = user.id, "jwt signed");
        Ok(token)
    }

    /// Verifies signature, issuer and expiry. Any failure is reported as
    /// [`AuthError::NotAuthenticated`].
    pub fn parse_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked below against our own clock
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);
        validation.set_issuer(std::slice::from_ref(&self.issuer));

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| {
                warn!(error = %e, "jwt rejected");
                AuthError::NotAuthenticated
            })?
            .claims;

        let now = self.clock.now().unix_timestamp();
        if now >= claims.exp.saturating_add(self.leeway.as_secs() as i64) {
            warn!(user_id = claims.user_id, exp = claims.exp, now, "jwt expired");
            return Err(AuthError::NotAuthenticated);
        }
        debug!(user_id = claims.user_id, "jwt verified");
        Ok(claims)
    }
}
