//! Cache key derivation.
//!
//! Path-keyed entries use the request path verbatim. Credential-keyed entries
//! are prefixed with the route path and never contain the submitted secrets:
//! both fields pass through SHA-256, the password twice.

use serde::Deserialize;
use sha2::{Digest, Sha256};

/// How a route derives its cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// GET/HEAD responses keyed by request path.
    Path,
    /// POST responses keyed by a digest of the submitted username and password.
    Credentials,
}

/// The form fields a credential-keyed route is keyed on.
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub fn path_key(path: &str) -> String {
    path.to_string()
}

/// `hex(sha256(sha256(password))) ++ hex(sha256(username))`
pub fn credential_key(username: &str, password: &str) -> String {
    let password_digest = Sha256::digest(Sha256::digest(password.as_bytes()));
    let username_digest = Sha256::digest(username.as_bytes());
    format!("{}{}", hex::encode(password_digest), hex::encode(username_digest))
}

fn username_digest(username: &str) -> String {
    hex::encode(Sha256::digest(username.as_bytes()))
}

/// `<path>|<credential_key>`. Login and registration never share entries.
pub fn scoped_credential_key(path: &str, username: &str, password: &str) -> String {
    format!("{path}|{}", credential_key(username, password))
}

/// Parse an url-encoded body into the credential key for `path`, if it is a
/// form at all.
pub fn credential_key_from_form(path: &str, body: &[u8]) -> Option<String> {
    serde_urlencoded::from_bytes::<CredentialsForm>(body)
        .ok()
        .map(|form| scoped_credential_key(path, &form.username, &form.password))
}

/// Matches every credential-keyed entry of one user, on any route.
pub struct UserEntries {
    digest: String,
}

impl UserEntries {
    pub fn new(username: &str) -> Self {
        Self {
            digest: username_digest(username),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        key.split_once('|')
            .is_some_and(|(_, digest)| digest.len() == 128 && digest.ends_with(&self.digest))
    }
}
