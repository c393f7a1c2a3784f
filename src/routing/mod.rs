//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request (method, path)
//!     → router.rs (walk the route table in order)
//!     → matcher.rs (method + path pattern, capture :params)
//!     → Route { endpoint, gates }
//!     → http::pipeline runs the gates in declared order
//! ```
//!
//! # Design Decisions
//! - Routes are declarative data, validated once at startup
//! - Gates must follow the canonical order cache → rate limit → origin → session
//! - First match wins; unmatched requests go to the not-found endpoint

pub mod matcher;
pub mod router;

pub use matcher::{PathParams, PathPattern};
pub use router::{Endpoint, Gate, Route, RouteError, RouteTable};
