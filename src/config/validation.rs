//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (TTLs > 0, token length, addresses parse)
//! - Check the origin allow-list is well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Minimum token length that still gives 128 bits of entropy.
const MIN_TOKEN_BYTES: usize = 16;

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if config.session.token_bytes < MIN_TOKEN_BYTES {
        errors.push(ValidationError::new(
            "session.token_bytes",
            format!("must be at least {MIN_TOKEN_BYTES}"),
        ));
    }
    if config.session.cookie_ttl_secs == 0 {
        errors.push(ValidationError::new("session.cookie_ttl_secs", "must be > 0"));
    }

    if config.password.iterations == 0 {
        errors.push(ValidationError::new("password.iterations", "must be > 0"));
    }
    if config.password.parallelism == 0 {
        errors.push(ValidationError::new("password.parallelism", "must be > 0"));
    } else if config.password.memory_kib < 8 * config.password.parallelism {
        errors.push(ValidationError::new(
            "password.memory_kib",
            "must be at least 8 KiB per lane",
        ));
    }

    if config.cache.enabled {
        if config.cache.get_ttl_secs == 0 {
            errors.push(ValidationError::new("cache.get_ttl_secs", "must be > 0"));
        }
        if config.cache.post_ttl_secs == 0 {
            errors.push(ValidationError::new("cache.post_ttl_secs", "must be > 0"));
        }
        if config.cache.table.is_empty() {
            errors.push(ValidationError::new("cache.table", "must not be empty"));
        }
    }

    // The sweeper serves both the cache and the rate-limit counters.
    if config.cache.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("cache.sweep_interval_secs", "must be > 0"));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::new("rate_limit.window_secs", "must be > 0"));
        }
        if config.rate_limit.max_per_window == 0 {
            errors.push(ValidationError::new("rate_limit.max_per_window", "must be > 0"));
        }
        if config.rate_limit.table.is_empty() {
            errors.push(ValidationError::new("rate_limit.table", "must not be empty"));
        }
    }

    for origin in &config.cors.allowed_origins {
        let well_formed = (origin.starts_with("https://") || origin.starts_with("http://"))
            && !origin.ends_with('/');
        if !well_formed {
            errors.push(ValidationError::new(
                "cors.allowed_origins",
                format!("'{origin}' must be scheme://host[:port] with no trailing slash"),
            ));
        }
    }

    if config.storage.user_storage().is_none() {
        errors.push(ValidationError::new(
            "storage.database_url",
            format!(
                "unsupported url '{}', expected memory:// or file://<path>",
                config.storage.database_url
            ),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.session.token_bytes = 4;
        config.rate_limit.max_per_window = 0;
        config.cors.allowed_origins = vec!["https://gityear.re/".into()];
        config.storage.database_url = "postgres://db".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "session.token_bytes",
                "rate_limit.max_per_window",
                "cors.allowed_origins",
                "storage.database_url",
            ]
        );
    }

    #[test]
    fn test_zero_sweep_interval_is_rejected_even_with_cache_disabled() {
        let mut config = GatewayConfig::default();
        config.cache.enabled = false;
        config.cache.sweep_interval_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "cache.sweep_interval_secs");
    }

    #[test]
    fn test_disabled_sections_are_not_checked() {
        let mut config = GatewayConfig::default();
        config.cache.enabled = false;
        config.cache.get_ttl_secs = 0;
        config.rate_limit.enabled = false;
        config.rate_limit.window_secs = 0;
        assert!(validate_config(&config).is_ok());
    }
}
