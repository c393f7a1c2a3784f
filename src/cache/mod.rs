//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! Request on a cached route:
//!     → keys.rs (path, or route + digest of submitted credentials)
//!     → gate.rs lookup
//!         hit  → replay stored response (X-Cache: hit)
//!         miss → run remaining gates + handler
//!              → gate.rs capture (X-Cache: miss)
//! ```
//!
//! # Design Decisions
//! - Passive TTL expiry only; a periodic sweep reclaims expired entries
//! - Path entries keep 2xx responses without cookies; credential entries also
//!   keep login failures and the cookies a login issues
//! - Credential entries of a user are dropped when that user logs out or registers
//! - HEAD is answered from the GET entry but never populates it

pub mod gate;
pub mod keys;

pub use gate::{CacheGate, PendingEntry, X_CACHE};
pub use keys::{credential_key, scoped_credential_key, CachePolicy};
