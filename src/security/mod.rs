//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (after the cache gate):
//!     → rate_limit.rs (fixed window per client + route group)
//!     → origin.rs (Origin allow-list, preflight answers)
//!     → auth::session (session / CSRF tokens)
//!     → Pass to handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure, including store errors
//! - No trust in client input
//! - Allow-list and limits are injected configuration, fixed at startup

pub mod origin;
pub mod rate_limit;

pub use origin::{OriginDecision, OriginGate};
pub use rate_limit::{RateBudget, RateDecision, RateLimiter};
