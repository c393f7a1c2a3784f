//! Session authority: login, logout, registration and per-request authorization.
//!
//! A request moves `Anonymous → AuthenticatedRead → AuthenticatedWrite` as it
//! presents a valid session token and then a matching CSRF token. Nothing is
//! held between requests; the user row is the only session state.

use std::sync::Arc;

use crate::auth::cookies::SessionCookies;
use crate::auth::password::{CredentialError, CredentialStore};
use crate::auth::token::{TokenError, TokenIssuer};
use crate::store::{StoreError, User, UserStore};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid username or password")]
    AuthFailure,

    #[error("{0}")]
    BadRequest(&'static str),

    #[error("user already exists")]
    Conflict,

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Level of access a route demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Session token only.
    Read,
    /// Session token plus matching CSRF token.
    Write,
}

/// Token pair handed to the client after a successful login.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub session_token: String,
    pub csrf_token: String,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionTokens(..)")
    }
}

pub struct SessionAuthority {
    users: Arc<dyn UserStore>,
    credentials: Arc<dyn CredentialStore>,
    tokens: TokenIssuer,
}

impl SessionAuthority {
    pub fn new(
        users: Arc<dyn UserStore>,
        credentials: Arc<dyn CredentialStore>,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            users,
            credentials,
            tokens,
        }
    }

    /// Resolve the user owning `session_token`.
    ///
    /// Missing tokens, unknown tokens and store failures all deny.
    pub async fn authorize_read(&self, session_token: Option<&str>) -> Result<User, AuthError> {
        let token = session_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthorized)?;

        match self.users.get_by_session_token(token).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(AuthError::Unauthorized),
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed, denying request");
                Err(AuthError::Unauthorized)
            }
        }
    }

    /// [`authorize_read`](Self::authorize_read), then require the CSRF token
    /// bound to that user.
    pub async fn authorize_write(&self, cookies: &SessionCookies) -> Result<User, AuthError> {
        let user = self.authorize_read(cookies.session_token.as_deref()).await?;

        let presented = cookies
            .csrf_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthorized)?;
        let bound = user.csrf_token.as_deref().ok_or(AuthError::Unauthorized)?;

        if !constant_time_eq(presented, bound) {
            tracing::warn!(username = %user.username, "CSRF token mismatch");
            return Err(AuthError::Unauthorized);
        }
        Ok(user)
    }

    pub async fn authorize(&self, access: Access, cookies: &SessionCookies) -> Result<User, AuthError> {
        match access {
            Access::Read => self.authorize_read(cookies.session_token.as_deref()).await,
            Access::Write => self.authorize_write(cookies).await,
        }
    }

    /// Verify credentials and bind a fresh token pair to the user, replacing
    /// whatever session was live before.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionTokens, AuthError> {
        let Some(user) = self.users.get_by_username(username).await? else {
            tracing::warn!(%username, reason = "unknown_user", "Login rejected");
            return Err(AuthError::AuthFailure);
        };

        if !self.verify(password, &user.hashed_password).await? {
            tracing::warn!(%username, reason = "bad_password", "Login rejected");
            return Err(AuthError::AuthFailure);
        }

        let tokens = SessionTokens {
            session_token: self.tokens.next()?,
            csrf_token: self.tokens.next()?,
        };

        let bound = self
            .users
            .update_tokens_on_login(username, &tokens.session_token, &tokens.csrf_token)
            .await?;
        if !bound {
            tracing::warn!(%username, reason = "user_vanished", "Login rejected");
            return Err(AuthError::AuthFailure);
        }

        tracing::info!(%username, "Login succeeded");
        Ok(tokens)
    }

    /// Clear the session holding this exact token pair. Idempotent.
    pub async fn logout(&self, session_token: &str, csrf_token: &str) -> Result<(), AuthError> {
        self.users
            .clear_tokens_on_logout(session_token, csrf_token)
            .await?;
        Ok(())
    }

    /// Create a new account with no live session.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        password_repeat: &str,
    ) -> Result<User, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::BadRequest("username and password are required"));
        }
        if password != password_repeat {
            return Err(AuthError::BadRequest("passwords do not match"));
        }
        if self.users.get_by_username(username).await?.is_some() {
            return Err(AuthError::Conflict);
        }

        let hashed = self.hash(password).await?;
        match self.users.create(User::new(username, hashed)).await {
            Ok(user) => {
                tracing::info!(%username, "User registered");
                Ok(user)
            }
            Err(StoreError::Duplicate(_)) => Err(AuthError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn verify(&self, password: &str, hashed: &str) -> Result<bool, AuthError> {
        let credentials = self.credentials.clone();
        let (password, hashed) = (password.to_string(), hashed.to_string());
        Ok(tokio::task::spawn_blocking(move || credentials.verify(&password, &hashed)).await?)
    }

    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let credentials = self.credentials.clone();
        let password = password.to_string();
        Ok(tokio::task::spawn_blocking(move || credentials.hash(&password)).await??)
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
