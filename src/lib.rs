//! Request-gating gateway for the study document assistant.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;
pub mod store;

pub use config::schema::GatewayConfig;
pub use error::GateError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
