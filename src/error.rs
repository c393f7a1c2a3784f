//! Request-terminating failures and their HTTP mapping.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::AuthError;
use crate::store::StoreError;

/// A failure raised by a gate or a core handler. Every variant ends the request.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid username or password")]
    AuthFailure,

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("origin not allowed")]
    OriginRejected,

    #[error("{0}")]
    BadRequest(String),

    #[error("user already exists")]
    Conflict,

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::Unauthorized | GateError::AuthFailure => StatusCode::UNAUTHORIZED,
            GateError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::OriginRejected => StatusCode::FORBIDDEN,
            GateError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GateError::Conflict => StatusCode::CONFLICT,
            GateError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::Unauthorized => "unauthorized",
            GateError::AuthFailure => "auth_failure",
            GateError::RateLimited { .. } => "rate_limited",
            GateError::OriginRejected => "origin_rejected",
            GateError::BadRequest(_) => "bad_request",
            GateError::Conflict => "conflict",
            GateError::Store(_) => "store_error",
            GateError::Internal(_) => "internal",
        }
    }

    fn public_message(&self) -> String {
        match self {
            // Backend details stay in the logs.
            GateError::Store(_) => "service temporarily unavailable".to_string(),
            GateError::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<AuthError> for GateError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized => GateError::Unauthorized,
            AuthError::AuthFailure => GateError::AuthFailure,
            AuthError::BadRequest(msg) => GateError::BadRequest(msg.to_string()),
            AuthError::Conflict => GateError::Conflict,
            AuthError::Store(e) => GateError::Store(e),
            other => GateError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match &self {
            GateError::Store(_) | GateError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
            }
            _ => {}
        }

        let mut response = (
            self.status(),
            Json(json!({ "message": self.public_message() })),
        )
            .into_response();

        if let GateError::RateLimited { retry_after } = &self {
            // Round up so clients never retry inside the window.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}
