//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, single dispatching handler)
//!     → request.rs (request ID, tracing span, client key)
//!     → routing (match method + path to a Route)
//!     → pipeline.rs (run the route's gates in order)
//!     → handlers.rs (login / register / logout, or the Downstream)
//!     → Send to client
//! ```

pub mod handlers;
pub mod pipeline;
pub mod request;
pub mod server;

pub use handlers::{Downstream, EchoDownstream, HX_REDIRECT};
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer, ServerError};
