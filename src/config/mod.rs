//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (CACHE_TABLE / RATE_LIMITING_TABLE / DATABASE_URL overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all gates
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the origin allow-list never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CacheConfig, CorsConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    PasswordConfig, RateLimitConfig, SecurityConfig, SessionConfig, StorageConfig, TimeoutConfig,
    TlsConfig, UserStorage,
};
