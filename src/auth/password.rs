use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use thiserror::Error;
use tracing::{error, warn};

lazy_static! {
    /// Hash of a throwaway secret, verified against when there is no real
    /// hash to check so that every failed sign in costs one Argon2 run.
    static ref DUMMY_HASH: String = {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        hash_password(&secret).unwrap_or_default()
    };
}

#[cfg(test)]
thread_local! {
    pub(crate) static VERIFY_RUNS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashingError(String);

pub fn hash_password(plain: &str) -> Result<String, HashingError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            HashingError(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Returns `false` for a wrong password and for a stored hash that cannot be
/// parsed (OAuth2-only accounts store an empty one). Both cases still pay for
/// a full verification.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => argon2_verify(plain, &parsed),
        Err(e) => {
            warn!(error = %e, "argon2 parse hash error");
            dummy_verify(plain);
            false
        }
    }
}

/// Burns one verification for a caller that has no stored hash to check.
pub fn dummy_verify(plain: &str) {
    if let Ok(parsed) = PasswordHash::new(&DUMMY_HASH) {
        argon2_verify(plain, &parsed);
    }
}

fn argon2_verify(plain: &str, parsed: &PasswordHash<'_>) -> bool {
    #[cfg(test)]
    VERIFY_RUNS.with(|runs| runs.set(runs.get() + 1));
    Argon2::default()
        .verify_password(plain.as_bytes(), parsed)
        .is_ok()
}
