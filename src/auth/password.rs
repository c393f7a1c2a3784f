//! Password hashing and verification using Argon2id.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::config::PasswordConfig;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid hashing parameters: {0}")]
    Parameters(String),

    #[error("failed to hash password: {0}")]
    Hashing(String),
}

/// Slow, salted one-way password hashing.
pub trait CredentialStore: Send + Sync {
    /// Hash `password` into a self-describing (PHC) string.
    fn hash(&self, password: &str) -> Result<String, CredentialError>;

    /// True iff `password` reproduces `hashed`. Malformed hashes never match.
    fn verify(&self, password: &str, hashed: &str) -> bool;
}

/// Argon2id with a fixed work factor.
#[derive(Clone)]
pub struct Argon2Credentials {
    params: Params,
}

impl Argon2Credentials {
    pub fn new(config: &PasswordConfig) -> Result<Self, CredentialError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| CredentialError::Parameters(e.to_string()))?;
        Ok(Self { params })
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl CredentialStore for Argon2Credentials {
    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CredentialError::Hashing(e.to_string()))
    }

    fn verify(&self, password: &str, hashed: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hashed) else {
            return false;
        };
        // Cost parameters are read back from the PHC string.
        self.hasher()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
pub(crate) fn fast_credentials() -> Argon2Credentials {
    Argon2Credentials::new(&PasswordConfig {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    })
    .unwrap()
}
