//! In-process store implementations backed by `DashMap`.
//!
//! Per-key atomicity comes from DashMap's shard locks: every read-modify-write
//! happens under a single entry guard. When two maps are touched in one
//! operation the user row is always locked before the session index.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{
    CacheHit, CacheStore, CachedResponse, CounterStore, StoreError, User, UserStore, WindowCount,
};

/// User table held in memory, optionally snapshotted to a JSON file.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<DashMap<String, User>>,
    /// session token -> username. Entries may go stale; the row is authoritative.
    sessions: Arc<DashMap<String, String>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryUserStore {
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self {
            users: Arc::new(DashMap::new()),
            sessions: Arc::new(DashMap::new()),
            snapshot_path,
        }
    }

    /// Load the snapshot at `path` if it exists, otherwise start empty.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let rows: HashMap<String, User> = serde_json::from_reader(reader)?;
            for (username, user) in rows {
                if let Some(token) = &user.session_token {
                    store.sessions.insert(token.clone(), username.clone());
                }
                store.users.insert(username, user);
            }
            tracing::info!(users = store.users.len(), path = %path.display(), "Loaded user snapshot");
        }
        Ok(store)
    }

    /// Write the snapshot, if this store has a snapshot path.
    pub fn save_to_file(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let rows: HashMap<String, User> = self
            .users
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &rows)?;
        tracing::info!(users = rows.len(), path = %path.display(), "Saved user snapshot");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(username).map(|r| r.value().clone()))
    }

    async fn get_by_session_token(&self, session_token: &str) -> Result<Option<User>, StoreError> {
        // Release the index guard before touching the user table.
        let username = self.sessions.get(session_token).map(|r| r.value().clone());
        let Some(username) = username else {
            return Ok(None);
        };
        let user = self
            .users
            .get(&username)
            .map(|r| r.value().clone())
            .filter(|u| u.session_token.as_deref() == Some(session_token));
        Ok(user)
    }

    async fn create(&self, user: User) -> Result<User, StoreError> {
        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(user.username)),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }

    async fn update_tokens_on_login(
        &self,
        username: &str,
        session_token: &str,
        csrf_token: &str,
    ) -> Result<bool, StoreError> {
        let Some(mut row) = self.users.get_mut(username) else {
            return Ok(false);
        };
        let previous = row.session_token.replace(session_token.to_string());
        row.csrf_token = Some(csrf_token.to_string());

        if let Some(old) = previous {
            self.sessions.remove_if(&old, |_, owner| owner == username);
        }
        self.sessions
            .insert(session_token.to_string(), username.to_string());
        Ok(true)
    }

    async fn clear_tokens_on_logout(
        &self,
        session_token: &str,
        csrf_token: &str,
    ) -> Result<(), StoreError> {
        let username = self.sessions.get(session_token).map(|r| r.value().clone());
        let Some(username) = username else {
            return Ok(());
        };
        if let Some(mut row) = self.users.get_mut(&username) {
            let holds_pair = row.session_token.as_deref() == Some(session_token)
                && row.csrf_token.as_deref() == Some(csrf_token);
            if holds_pair {
                row.session_token = None;
                row.csrf_token = None;
                self.sessions.remove(session_token);
            }
        }
        Ok(())
    }
}

struct StoredEntry {
    response: CachedResponse,
    expires_at: Instant,
}

/// Response cache with passive TTL expiry.
#[derive(Clone)]
pub struct MemoryCacheStore {
    table: String,
    entries: Arc<DashMap<String, StoredEntry>>,
}

impl MemoryCacheStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            entries: Arc::new(DashMap::new()),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.table, key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheHit>, StoreError> {
        let now = Instant::now();
        let hit = self.entries.get(&self.namespaced(key)).and_then(|entry| {
            entry.expires_at.checked_duration_since(now).map(|remaining| CacheHit {
                response: entry.response.clone(),
                remaining,
            })
        });
        Ok(hit.filter(|h| !h.remaining.is_zero()))
    }

    async fn put(&self, key: &str, response: CachedResponse, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            self.namespaced(key),
            StoredEntry {
                response,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        Ok(before.saturating_sub(self.entries.len()))
    }

    async fn remove_where(
        &self,
        matches: &(dyn for<'k> Fn(&'k str) -> bool + Send + Sync),
    ) -> Result<usize, StoreError> {
        let prefix = format!("{}:", self.table);
        let before = self.entries.len();
        self.entries.retain(|key, _| {
            !key.strip_prefix(&prefix).is_some_and(|k| matches(k))
        });
        Ok(before.saturating_sub(self.entries.len()))
    }
}

struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window request counters.
#[derive(Clone)]
pub struct MemoryCounterStore {
    table: String,
    windows: Arc<DashMap<String, Window>>,
}

impl MemoryCounterStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            windows: Arc::new(DashMap::new()),
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(format!("{}:{}", self.table, key))
            .or_insert_with(|| Window { count: 0, started: now });

        if now.duration_since(entry.started) >= window {
            entry.count = 0;
            entry.started = now;
        }
        entry.count = entry.count.saturating_add(1);

        Ok(WindowCount {
            count: entry.count,
            resets_in: window.saturating_sub(now.duration_since(entry.started)),
        })
    }

    async fn purge_expired(&self, window: Duration) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < window);
        Ok(before.saturating_sub(self.windows.len()))
    }
}
