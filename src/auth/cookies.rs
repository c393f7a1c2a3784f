//! Session cookie parsing and `Set-Cookie` construction.

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};

pub const SESSION_COOKIE: &str = "session_token";
pub const CSRF_COOKIE: &str = "csrf_token";

/// Credentials presented by the client on one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    pub session_token: Option<String>,
    pub csrf_token: Option<String>,
}

impl SessionCookies {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            session_token: read_cookie(headers, SESSION_COOKIE),
            csrf_token: read_cookie(headers, CSRF_COOKIE),
        }
    }
}

/// Value of the first non-empty cookie called `name` across all `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v.trim_matches('"').to_string())
}

/// Options shared by every cookie this service sets.
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    pub ttl: Duration,
    pub secure: bool,
}

impl CookiePolicy {
    /// HttpOnly cookie carrying the session token.
    pub fn session(&self, token: &str) -> Option<HeaderValue> {
        self.build(SESSION_COOKIE, token, self.ttl, true)
    }

    /// Script-readable cookie carrying the CSRF token.
    pub fn csrf(&self, token: &str) -> Option<HeaderValue> {
        self.build(CSRF_COOKIE, token, self.ttl, false)
    }

    /// Expire both session cookies.
    pub fn cleared(&self) -> Vec<HeaderValue> {
        [
            self.build(SESSION_COOKIE, "", Duration::ZERO, true),
            self.build(CSRF_COOKIE, "", Duration::ZERO, false),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn build(&self, name: &str, value: &str, max_age: Duration, http_only: bool) -> Option<HeaderValue> {
        let mut cookie = format!(
            "{name}={value}; Path=/; Max-Age={}; SameSite=Lax",
            max_age.as_secs()
        );
        if http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).ok()
    }
}
