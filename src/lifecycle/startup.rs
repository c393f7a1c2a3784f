//! Startup orchestration: turn the storage section of the config into stores.

use std::sync::Arc;

use crate::config::{GatewayConfig, UserStorage};
use crate::store::{MemoryCacheStore, MemoryCounterStore, MemoryUserStore, StoreError, Stores};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("unsupported database url '{0}' (expected memory:// or file://<path>)")]
    UnsupportedDatabase(String),

    #[error("failed to open user store: {0}")]
    Store(#[from] StoreError),
}

/// Stores plus the concrete user table, kept so it can be saved on exit.
pub struct OpenedStores {
    pub stores: Stores,
    pub users: Arc<MemoryUserStore>,
}

impl OpenedStores {
    /// Persist the user table if it is snapshot-backed.
    pub fn save(&self) -> Result<(), StoreError> {
        self.users.save_to_file()
    }
}

pub fn open_stores(config: &GatewayConfig) -> Result<OpenedStores, StartupError> {
    let users = match config.storage.user_storage() {
        Some(UserStorage::Memory) => MemoryUserStore::new(None),
        Some(UserStorage::Snapshot(path)) => MemoryUserStore::load_from_file(path)?,
        None => {
            return Err(StartupError::UnsupportedDatabase(
                config.storage.database_url.clone(),
            ))
        }
    };
    let users = Arc::new(users);

    tracing::info!(
        database_url = %config.storage.database_url,
        cache_table = %config.cache.table,
        rate_limit_table = %config.rate_limit.table,
        "Stores opened"
    );

    Ok(OpenedStores {
        stores: Stores {
            users: users.clone(),
            cache: Arc::new(MemoryCacheStore::new(&config.cache.table)),
            counters: Arc::new(MemoryCounterStore::new(&config.rate_limit.table)),
        },
        users,
    })
}
