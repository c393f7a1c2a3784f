//! Origin allow-list enforcement (CORS).
//!
//! Unlike a permissive CORS layer, a disallowed `Origin` is rejected outright
//! rather than merely left without `Access-Control-*` headers.

use std::collections::HashSet;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::CorsConfig;
use crate::error::GateError;

/// Outcome of the origin check for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginDecision {
    /// No `Origin` header; nothing to add to the response.
    SameOrigin,
    /// Allowed cross-origin request; echo the origin back.
    CrossOrigin(HeaderValue),
    /// Preflight from an allowed origin; answer it directly.
    Preflight(HeaderValue),
}

pub struct OriginGate {
    allowed: HashSet<String>,
}

impl OriginGate {
    pub fn new(config: &CorsConfig) -> Self {
        Self {
            allowed: config.allowed_origins.iter().cloned().collect(),
        }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.contains(origin)
    }

    /// Check the request's `Origin` against the allow-list.
    pub fn check(&self, request: &Request<Body>) -> Result<OriginDecision, GateError> {
        let Some(origin) = request.headers().get(header::ORIGIN) else {
            return Ok(OriginDecision::SameOrigin);
        };

        let allowed = origin.to_str().map(|o| self.is_allowed(o)).unwrap_or(false);
        if !allowed {
            return Err(GateError::OriginRejected);
        }

        let is_preflight = request.method() == Method::OPTIONS
            && request
                .headers()
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);
        if is_preflight {
            Ok(OriginDecision::Preflight(origin.clone()))
        } else {
            Ok(OriginDecision::CrossOrigin(origin.clone()))
        }
    }

    /// 204 answer to a preflight, advertising the route's methods.
    pub fn preflight_response(origin: HeaderValue, methods: &str, request_headers: &HeaderMap) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        if let Ok(methods) = HeaderValue::from_str(methods) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
        }
        if let Some(requested) = request_headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
        }
        Self::vary_on_origin(headers);
        response
    }

    /// Mark a response as readable by an allowed cross-origin caller.
    pub fn decorate(origin: HeaderValue, response: &mut Response) {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        Self::vary_on_origin(headers);
    }

    fn vary_on_origin(headers: &mut HeaderMap) {
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> OriginGate {
        OriginGate::new(&CorsConfig::default())
    }

    fn request(method: Method, origin: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri("/rules");
        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_foreign_origin_is_rejected() {
        let result = gate().check(&request(Method::POST, Some("https://evil.example")));
        assert!(matches!(result, Err(GateError::OriginRejected)));
    }

    #[test]
    fn test_missing_origin_passes() {
        assert_eq!(
            gate().check(&request(Method::POST, None)).unwrap(),
            OriginDecision::SameOrigin
        );
    }

    #[test]
    fn test_allowed_origin_is_echoed() {
        let decision = gate()
            .check(&request(Method::POST, Some("https://gityear.re")))
            .unwrap();
        assert_eq!(
            decision,
            OriginDecision::CrossOrigin(HeaderValue::from_static("https://gityear.re"))
        );
    }

    #[test]
    fn test_origin_match_is_exact() {
        for origin in ["https://gityear.re/", "http://gityear.re", "https://gityear.re.evil.example"] {
            assert!(gate().check(&request(Method::GET, Some(origin))).is_err(), "{origin}");
        }
    }

    #[test]
    fn test_preflight() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/rules")
            .header(header::ORIGIN, "https://gityear.re")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "hx-request")
            .body(Body::empty())
            .unwrap();

        let OriginDecision::Preflight(origin) = gate().check(&req).unwrap() else {
            panic!("expected preflight");
        };
        let response = OriginGate::preflight_response(origin, "DELETE", req.headers());
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "DELETE");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "hx-request");
        assert_eq!(response.headers()[header::VARY], "Origin");
    }
}
