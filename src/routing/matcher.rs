//! Route matching logic.
//!
//! # Responsibilities
//! - Match request method (GET also answers HEAD; OPTIONS reaches CORS routes)
//! - Match path patterns with `:name` segments or a trailing `*` prefix
//! - Extract path parameters for downstream handlers
//!
//! # Design Decisions
//! - Path matching is case-sensitive and segment-exact
//! - No regex to guarantee O(n) matching

use std::collections::HashMap;

use axum::http::Method;

/// Parameters captured from `:name` segments, inserted as a request extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(pub HashMap<String, String>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A path pattern such as `/rules/:id` or `/static/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
    prefix: bool,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        let (body, prefix) = match pattern.strip_suffix("/*") {
            Some(body) => (body, true),
            None => (pattern, false),
        };
        let segments = split(body)
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Self { segments, prefix }
    }

    /// Match `path`, returning captured parameters on success.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = split(path).collect();
        let length_ok = if self.prefix {
            parts.len() >= self.segments.len()
        } else {
            parts.len() == self.segments.len()
        };
        if !length_ok {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Some(PathParams(params))
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Whether a request with `actual` method is served by a route declared for
/// `declared`.
pub fn method_matches(declared: &Method, actual: &Method, answers_preflight: bool) -> bool {
    declared == actual
        || (declared == Method::GET && actual == Method::HEAD)
        || (answers_preflight && actual == Method::OPTIONS)
}
