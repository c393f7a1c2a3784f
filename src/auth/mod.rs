//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! POST /login:
//!     password.rs (verify against stored hash)
//!     → token.rs (issue session + CSRF pair)
//!     → session.rs (bind pair to user row, last writer wins)
//!     → cookies.rs (Set-Cookie headers)
//!
//! Protected request:
//!     cookies.rs (read session_token / csrf_token)
//!     → session.rs (resolve user, compare CSRF in constant time)
//! ```
//!
//! # Design Decisions
//! - Fail closed: store errors during authorization deny the request
//! - Login never reveals whether the username exists
//! - Password hashing runs on the blocking pool

pub mod cookies;
pub mod password;
pub mod session;
pub mod token;

pub use cookies::{CookiePolicy, SessionCookies, CSRF_COOKIE, SESSION_COOKIE};
pub use password::{Argon2Credentials, CredentialError, CredentialStore};
pub use session::{Access, AuthError, SessionAuthority, SessionTokens};
pub use token::{TokenError, TokenIssuer};
