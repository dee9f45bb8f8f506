use anyhow::Context;
use serde::Deserialize;

use crate::auth::validation::{RegistrationPolicy, UsernamePolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub ttl_minutes: i64,
    pub leeway_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

/// Outgoing mail relay. Activation emails are only logged when absent.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

/// Account inserted into the in-memory store at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Postgres when set, in-memory store otherwise.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub activate_url: String,
    pub registration: RegistrationPolicy,
    pub google: Option<GoogleConfig>,
    pub smtp: Option<SmtpConfig>,
    pub seed_admin: Option<SeedAdmin>,
    pub host: String,
    pub port: u16,
}

/// Ten years. Keeps `iat + ttl` far inside the representable time range.
pub const MAX_TTL_MINUTES: i64 = 10 * 365 * 24 * 60;
const MAX_LEEWAY_SECONDS: i64 = 24 * 60 * 60;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let parsed = |key: &str| -> anyhow::Result<Option<i64>> {
            var(key)
                .map(|v| v.parse::<i64>().with_context(|| format!("{key} must be an integer")))
                .transpose()
        };

        let bounded = |key: &str, default: i64, min: i64, max: i64| -> anyhow::Result<i64> {
            let value = parsed(key)?.unwrap_or(default);
            if !(min..=max).contains(&value) {
                anyhow::bail!("{key} must be between {min} and {max}, got {value}");
            }
            Ok(value)
        };

        let jwt = JwtConfig {
            secret: var("JWT_SECRET").context("JWT_SECRET is required")?,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "auth.service".into()),
            ttl_minutes: bounded("JWT_TTL_MINUTES", 24 * 60, 1, MAX_TTL_MINUTES)?,
            leeway_seconds: bounded("JWT_LEEWAY_SECONDS", 0, 0, MAX_LEEWAY_SECONDS)? as u64,
        };

        let mut registration = RegistrationPolicy::default();
        if let Some(policy) = var("USERNAME_POLICY") {
            registration.username = policy.parse::<UsernamePolicy>()?;
        }
        if let Some(max) = parsed("PASSWORD_MAX_LEN")? {
            registration.password_max_len = (max > 0).then_some(max as usize);
        }

        let google = match (
            var("GOOGLE_CLIENT_ID"),
            var("GOOGLE_CLIENT_SECRET"),
            var("GOOGLE_REDIRECT_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_url)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_url,
            }),
            _ => None,
        };

        let smtp = match (
            var("SMTP_HOST"),
            var("SMTP_USER"),
            var("SMTP_PASSWORD"),
            var("SMTP_FROM"),
        ) {
            (Some(host), Some(user), Some(password), Some(from)) => Some(SmtpConfig {
                host,
                port: bounded("SMTP_PORT", 587, 1, u16::MAX as i64)? as u16,
                user,
                password,
                from,
            }),
            _ => None,
        };

        let seed_admin = match (var("SEED_ADMIN_EMAIL"), var("SEED_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(SeedAdmin { email, password }),
            _ => None,
        };

        Ok(Self {
            database_url: var("DATABASE_URL").filter(|v| !v.is_empty()),
            jwt,
            activate_url: var("ACTIVATE_URL")
                .unwrap_or_else(|| "http://localhost:8080/activate".into()),
            registration,
            google,
            smtp,
            seed_admin,
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: bounded("APP_PORT", 8080, 1, u16::MAX as i64)? as u16,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_with_only_secret() {
        let cfg = load(&[("JWT_SECRET", "s")]).unwrap();
        assert_eq!(cfg.jwt.issuer, "auth.service");
        assert_eq!(cfg.jwt.ttl_minutes, 1440);
        assert_eq!(cfg.jwt.leeway_seconds, 0);
        assert!(cfg.database_url.is_none());
        assert!(cfg.google.is_none());
        assert!(cfg.seed_admin.is_none());
        assert!(cfg.smtp.is_none());
        assert_eq!(cfg.listen_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.registration.username, UsernamePolicy::Optional);
        assert_eq!(cfg.registration.password_max_len, Some(72));
    }

    #[test]
    fn secret_is_required() {
        assert!(load(&[]).is_err());
    }

    #[test]
    fn reads_overrides() {
        let cfg = load(&[
            ("JWT_SECRET", "s"),
            ("JWT_TTL_MINUTES", "60"),
            ("USERNAME_POLICY", "disabled"),
            ("PASSWORD_MAX_LEN", "0"),
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_REDIRECT_URL", "http://localhost/cb"),
            ("SEED_ADMIN_EMAIL", "admin@example.com"),
            ("SEED_ADMIN_PASSWORD", "admin1234"),
            ("DATABASE_URL", ""),
            ("APP_HOST", "127.0.0.1"),
            ("APP_PORT", "3000"),
        ])
        .unwrap();
        assert_eq!(cfg.listen_addr(), "127.0.0.1:3000");
        assert_eq!(cfg.jwt.ttl_minutes, 60);
        assert_eq!(cfg.registration.username, UsernamePolicy::Disabled);
        assert_eq!(cfg.registration.password_max_len, None);
        assert_eq!(cfg.google.unwrap().client_id, "id");
        assert_eq!(cfg.seed_admin.unwrap().email, "admin@example.com");
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn rejects_bad_numbers_and_policies() {
        assert!(load(&[("JWT_SECRET", "s"), ("JWT_TTL_MINUTES", "soon")]).is_err());
        assert!(load(&[("JWT_SECRET", "s"), ("USERNAME_POLICY", "maybe")]).is_err());
        assert!(load(&[("JWT_SECRET", "s"), ("APP_PORT", "70000")]).is_err());
    }

    #[test]
    fn ttl_and_leeway_are_bounded() {
        let ttl = |v: &str| load(&[("JWT_SECRET", "s"), ("JWT_TTL_MINUTES", v)]);

        let max = MAX_TTL_MINUTES.to_string();
        assert_eq!(ttl(&max).unwrap().jwt.ttl_minutes, MAX_TTL_MINUTES);
        assert!(ttl(&(MAX_TTL_MINUTES + 1).to_string()).is_err());
        assert!(ttl("9223372036854775807").is_err());
        assert!(ttl("0").is_err());
        assert!(load(&[("JWT_SECRET", "s"), ("JWT_LEEWAY_SECONDS", "-5")]).is_err());
    }

    #[test]
    fn smtp_needs_host_credentials_and_sender() {
        let smtp = [
            ("JWT_SECRET", "s"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "mailer"),
            ("SMTP_PASSWORD", "secret"),
            ("SMTP_FROM", "Auth <no-reply@example.com>"),
        ];
        let cfg = load(&smtp).unwrap().smtp.unwrap();
        assert_eq!(cfg.host, "smtp.example.com");
        assert_eq!(cfg.port, 587);
        assert_eq!(cfg.from, "Auth <no-reply@example.com>");

        let mut with_port = smtp.to_vec();
        with_port.push(("SMTP_PORT", "465"));
        assert_eq!(load(&with_port).unwrap().smtp.unwrap().port, 465);

        assert!(load(&smtp[..4]).unwrap().smtp.is_none());
    }
}
