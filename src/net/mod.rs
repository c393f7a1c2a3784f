//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS handshake, when [listener.tls] is set)
//!     → Hand off to HTTP layer
//! ```

pub mod tls;

pub use tls::{load_tls_config, TlsError};
