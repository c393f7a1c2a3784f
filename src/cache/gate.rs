//! Response cache gate.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::cache::keys::{credential_key_from_form, path_key, CachePolicy, UserEntries};
use crate::config::CacheConfig;
use crate::error::GateError;
use crate::observability::metrics;
use crate::store::{CacheHit, CacheStore, CachedResponse, StoreError};

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Headers kept with a stored response and restored on replay.
const REPLAYED_HEADERS: [HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::CONTENT_ENCODING,
    header::SET_COOKIE,
    HeaderName::from_static("hx-redirect"),
];

/// A key the handler's response should be stored under.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub key: String,
    pub policy: CachePolicy,
    pub ttl: Duration,
}

pub struct CacheGate {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    body_limit: usize,
}

impl CacheGate {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig, body_limit: usize) -> Self {
        Self {
            store,
            config,
            body_limit,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether a hit is served before the remaining gates run.
    pub fn short_circuits(&self) -> bool {
        self.config.short_circuit_gates
    }

    pub fn ttl(&self, policy: CachePolicy) -> Duration {
        match policy {
            CachePolicy::Path => self.config.get_ttl(),
            CachePolicy::Credentials => self.config.post_ttl(),
        }
    }

    /// Derive the cache key for `request`, if the request is cacheable under
    /// `policy`. Credential keys need the body, so the request is rebuilt
    /// from the buffered bytes and handed back.
    pub async fn key_for(
        &self,
        policy: CachePolicy,
        request: Request<Body>,
    ) -> Result<(Option<String>, Request<Body>), GateError> {
        match policy {
            CachePolicy::Path => {
                let cacheable = request.method() == Method::GET || request.method() == Method::HEAD;
                let key = cacheable.then(|| path_key(request.uri().path()));
                Ok((key, request))
            }
            CachePolicy::Credentials if request.method() == Method::POST => {
                let (parts, body) = request.into_parts();
                let bytes = to_bytes(body, self.body_limit)
                    .await
                    .map_err(|_| GateError::BadRequest("request body too large".into()))?;
                let key = credential_key_from_form(parts.uri.path(), &bytes);
                Ok((key, Request::from_parts(parts, Body::from(bytes))))
            }
            CachePolicy::Credentials => Ok((None, request)),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheHit>, StoreError> {
        let hit = self.store.get(key).await?;
        metrics::record_cache_lookup(if hit.is_some() { "hit" } else { "miss" });
        Ok(hit)
    }

    pub async fn put(&self, key: &str, response: CachedResponse, ttl: Duration) -> Result<(), StoreError> {
        self.store.put(key, response, ttl).await
    }

    /// Drop entries whose TTL has elapsed.
    pub async fn purge_expired(&self) -> usize {
        match self.store.purge_expired().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Cache sweep failed");
                0
            }
        }
    }

    /// Drop every credential-keyed entry of `username`. Called whenever the
    /// outcome of that user's login changes.
    pub async fn forget_user(&self, username: &str) -> usize {
        let entries = UserEntries::new(username);
        match self.store.remove_where(&|key: &str| entries.matches(key)).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to drop cached credential responses");
                0
            }
        }
    }

    /// Store the handler's response under `pending` and return it to the client.
    ///
    /// Path entries keep 2xx responses that set no cookies. Credential entries
    /// keep 2xx responses with their cookies, and 401s, so a repeated login
    /// replays without verifying the password again.
    pub async fn capture(&self, pending: PendingEntry, method: &Method, response: Response) -> Response {
        let status = response.status();
        let storable = match pending.policy {
            CachePolicy::Path => {
                status.is_success() && !response.headers().contains_key(header::SET_COOKIE)
            }
            CachePolicy::Credentials => status.is_success() || status == StatusCode::UNAUTHORIZED,
        };
        if !storable || method == Method::HEAD {
            return response;
        }

        let (mut parts, body) = response.into_parts();
        let bytes = match to_bytes(body, self.body_limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return GateError::Internal(format!("failed to buffer response: {e}")).into_response();
            }
        };

        let entry = CachedResponse {
            status: parts.status.as_u16(),
            headers: replayed_headers(&parts.headers),
            body: bytes.to_vec(),
        };

        match self.put(&pending.key, entry, pending.ttl).await {
            Ok(()) => {
                parts.headers.insert(X_CACHE, HeaderValue::from_static("miss"));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to store cached response");
                metrics::record_cache_lookup("store_error");
            }
        }
        Response::from_parts(parts, Body::from(bytes))
    }

    /// Rebuild a response from a cache hit.
    pub fn replay(&self, hit: CacheHit, policy: CachePolicy) -> Response {
        let CacheHit { response, remaining } = hit;
        let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);

        let mut out = (status, response.body).into_response();
        let headers = out.headers_mut();
        headers.remove(header::CONTENT_TYPE);
        for (name, value) in &response.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }

        let visibility = match policy {
            CachePolicy::Path => "public",
            CachePolicy::Credentials => "private",
        };
        if let Ok(value) = HeaderValue::from_str(&format!(
            "{visibility}, max-age={}",
            remaining.as_secs()
        )) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        headers.insert(X_CACHE, HeaderValue::from_static("hit"));
        out
    }
}

fn replayed_headers(headers: &axum::http::HeaderMap) -> Vec<(String, String)> {
    REPLAYED_HEADERS
        .iter()
        .flat_map(|name| {
            headers.get_all(name).iter().filter_map(move |value| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
        })
        .collect()
}
