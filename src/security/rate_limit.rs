//! Fixed-window rate limiting per client and route group.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::RateLimitConfig;
use crate::error::GateError;
use crate::store::CounterStore;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Budget left in the current window after an allowed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    pub limit: u32,
    pub remaining: u32,
    pub resets_in: Duration,
}

impl RateBudget {
    /// Attach `X-RateLimit-*` headers to a response.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.resets_in.as_secs()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed(RateBudget),
    Limited { retry_after: Duration },
}

/// State for the rate limiter.
pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
    window: Duration,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(counters: Arc<dyn CounterStore>, config: &RateLimitConfig) -> Self {
        Self {
            counters,
            window: config.window(),
            enabled: config.enabled,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request from `client` against `group` and decide.
    ///
    /// Counter store failures deny the request.
    pub async fn allow(
        &self,
        group: &str,
        client: &str,
        max_per_window: u32,
    ) -> Result<RateDecision, GateError> {
        if !self.enabled {
            return Ok(RateDecision::Allowed(RateBudget {
                limit: max_per_window,
                remaining: max_per_window,
                resets_in: self.window,
            }));
        }

        let key = format!("{group}|{client}");
        let state = self.counters.increment(&key, self.window).await?;

        if state.count > max_per_window {
            Ok(RateDecision::Limited {
                retry_after: state.resets_in,
            })
        } else {
            Ok(RateDecision::Allowed(RateBudget {
                limit: max_per_window,
                remaining: max_per_window - state.count,
                resets_in: state.resets_in,
            }))
        }
    }

    /// Drop counters whose window has elapsed.
    pub async fn purge_expired(&self) -> usize {
        match self.counters.purge_expired(self.window).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Rate limit sweep failed");
                0
            }
        }
    }
}
