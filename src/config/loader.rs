//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variables that override the file.
pub const ENV_CACHE_TABLE: &str = "CACHE_TABLE";
pub const ENV_RATE_LIMITING_TABLE: &str = "RATE_LIMITING_TABLE";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides and validate.
///
/// With no path the built-in defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay table names and the store URL from the environment.
pub fn apply_env_overrides(config: &mut GatewayConfig, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(table) = lookup(ENV_CACHE_TABLE) {
        config.cache.table = table;
    }
    if let Some(table) = lookup(ENV_RATE_LIMITING_TABLE) {
        config.rate_limit.table = table;
    }
    if let Some(url) = lookup(ENV_DATABASE_URL) {
        config.storage.database_url = url;
    }
}
