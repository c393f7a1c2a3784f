//! Opaque session and CSRF token generation.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;

#[derive(Debug, thiserror::Error)]
#[error("random source unavailable: {0}")]
pub struct TokenError(#[from] rand::Error);

/// Issues unguessable URL-safe tokens from the OS CSPRNG.
#[derive(Debug, Clone, Copy)]
pub struct TokenIssuer {
    byte_length: usize,
}

impl TokenIssuer {
    pub fn new(byte_length: usize) -> Self {
        Self { byte_length }
    }

    /// Issue a token of the configured length.
    pub fn next(&self) -> Result<String, TokenError> {
        issue(self.byte_length)
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }
}

/// Draw `byte_length` random bytes and encode them as unpadded URL-safe base64.
pub fn issue(byte_length: usize) -> Result<String, TokenError> {
    let mut bytes = vec![0u8; byte_length];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
