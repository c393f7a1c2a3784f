//! Persistence contracts consumed by the gates.
//!
//! # Data Flow
//! ```text
//! SessionAuthority ──▶ UserStore     (user rows, token columns)
//! CacheGate        ──▶ CacheStore    (serialized responses + expiry)
//! RateLimiter      ──▶ CounterStore  (fixed-window counters)
//! ```
//!
//! # Design Decisions
//! - Every operation touches exactly one key and is atomic for that key
//! - Handles are built once at startup and injected as `Arc<dyn ...>`
//! - The engine behind each trait is opaque to the gates

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::{MemoryCacheStore, MemoryCounterStore, MemoryUserStore};

/// Error raised by any backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A registered account and the session currently bound to it.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub hashed_password: String,
    pub session_token: Option<String>,
    pub csrf_token: Option<String>,
}

impl User {
    /// A freshly registered user with no live session.
    pub fn new(username: impl Into<String>, hashed_password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            hashed_password: hashed_password.into(),
            session_token: None,
            csrf_token: None,
        }
    }

    pub fn has_session(&self) -> bool {
        self.session_token.is_some()
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("has_session", &self.has_session())
            .finish_non_exhaustive()
    }
}

/// User table keyed by username, with a secondary lookup by session token.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn get_by_session_token(&self, session_token: &str) -> Result<Option<User>, StoreError>;

    /// Insert a new user. Fails with [`StoreError::Duplicate`] if the username exists.
    async fn create(&self, user: User) -> Result<User, StoreError>;

    /// Bind a new token pair to `username`, replacing any previous pair.
    /// Returns `false` when no such user exists.
    async fn update_tokens_on_login(
        &self,
        username: &str,
        session_token: &str,
        csrf_token: &str,
    ) -> Result<bool, StoreError>;

    /// Clear the token pair on whichever user currently holds exactly this pair.
    /// Clearing a pair nobody holds is a successful no-op.
    async fn clear_tokens_on_logout(
        &self,
        session_token: &str,
        csrf_token: &str,
    ) -> Result<(), StoreError>;
}

/// A response as stored in the cache. `headers` holds only the replayable
/// ones, in their original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// A cache lookup hit together with its remaining lifetime.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub response: CachedResponse,
    pub remaining: Duration,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry. Expired entries read as a miss.
    async fn get(&self, key: &str) -> Result<Option<CacheHit>, StoreError>;

    async fn put(&self, key: &str, response: CachedResponse, ttl: Duration) -> Result<(), StoreError>;

    /// Drop every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;

    /// Drop every entry whose key satisfies `matches`, live or not.
    async fn remove_where(
        &self,
        matches: &(dyn for<'k> Fn(&'k str) -> bool + Send + Sync),
    ) -> Result<usize, StoreError>;
}

/// State of a fixed window after counting one more request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u32,
    pub resets_in: Duration,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one request against `key`, starting a fresh window first if the
    /// current one has elapsed.
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError>;

    async fn purge_expired(&self, window: Duration) -> Result<usize, StoreError>;
}

/// Store handles shared by every gate.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub cache: Arc<dyn CacheStore>,
    pub counters: Arc<dyn CounterStore>,
}

impl Stores {
    /// Volatile stores, namespaced with the configured table names.
    pub fn in_memory(cache_table: &str, rate_limit_table: &str) -> Self {
        Self {
            users: Arc::new(MemoryUserStore::new(None)),
            cache: Arc::new(MemoryCacheStore::new(cache_table)),
            counters: Arc::new(MemoryCounterStore::new(rate_limit_table)),
        }
    }
}
