//! Declarative route table: which gates guard which endpoint, and in what order.

use std::fmt;

use axum::http::Method;

use crate::auth::Access;
use crate::cache::CachePolicy;
use crate::routing::matcher::{method_matches, PathParams, PathPattern};

/// Everything the gateway can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Home,
    Static,
    SignIn,
    SignUp,
    Login,
    Register,
    Logout,
    Categories,
    Notes,
    UploadNote,
    DeleteNote,
    CreateRule,
    UpdateRule,
    DeleteRule,
    NotFound,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Home => "home",
            Endpoint::Static => "static",
            Endpoint::SignIn => "signin",
            Endpoint::SignUp => "signup",
            Endpoint::Login => "login",
            Endpoint::Register => "register",
            Endpoint::Logout => "logout",
            Endpoint::Categories => "categories",
            Endpoint::Notes => "notes",
            Endpoint::UploadNote => "upload_note",
            Endpoint::DeleteNote => "delete_note",
            Endpoint::CreateRule => "create_rule",
            Endpoint::UpdateRule => "update_rule",
            Endpoint::DeleteRule => "delete_rule",
            Endpoint::NotFound => "not_found",
        }
    }

    /// Access the endpoint cannot be served without.
    pub fn required_access(&self) -> Option<Access> {
        match self {
            Endpoint::Categories | Endpoint::Notes => Some(Access::Read),
            Endpoint::Logout
            | Endpoint::UploadNote
            | Endpoint::DeleteNote
            | Endpoint::CreateRule
            | Endpoint::UpdateRule
            | Endpoint::DeleteRule => Some(Access::Write),
            _ => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One stage of a route's gate chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Cache(CachePolicy),
    RateLimit { max_per_window: u32 },
    Origin { methods: &'static str },
    Session(Access),
}

impl Gate {
    /// Position in the canonical chain; a route's gates must strictly increase.
    fn rank(&self) -> u8 {
        match self {
            Gate::Cache(_) => 0,
            Gate::RateLimit { .. } => 1,
            Gate::Origin { .. } => 2,
            Gate::Session(_) => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Gate::Cache(_) => "cache",
            Gate::RateLimit { .. } => "rate_limit",
            Gate::Origin { .. } => "origin",
            Gate::Session(_) => "session",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub endpoint: Endpoint,
    pub method: Method,
    pub path: &'static str,
    pub pattern: PathPattern,
    pub gates: Vec<Gate>,
}

impl Route {
    pub fn new(method: Method, path: &'static str, endpoint: Endpoint, gates: Vec<Gate>) -> Self {
        Self {
            endpoint,
            method,
            path,
            pattern: PathPattern::new(path),
            gates,
        }
    }

    pub fn answers_preflight(&self) -> bool {
        self.gates.iter().any(|g| matches!(g, Gate::Origin { .. }))
    }

    /// Rate-limit counters are shared by every route of an endpoint.
    pub fn rate_group(&self) -> &'static str {
        self.endpoint.name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("{method} {path}: gate '{gate}' is out of order")]
    OutOfOrder {
        method: Method,
        path: &'static str,
        gate: &'static str,
    },

    #[error("{method} {path}: requires a {access:?} session gate")]
    MissingSession {
        method: Method,
        path: &'static str,
        access: Access,
    },

    #[error("{method} {path}: declared twice")]
    Duplicate { method: Method, path: &'static str },
}

/// Ordered route table. First match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Find the route serving `method` + `path`.
    pub fn match_request(&self, method: &Method, path: &str) -> Option<(&Route, PathParams)> {
        self.routes
            .iter()
            .filter(|r| method_matches(&r.method, method, r.answers_preflight()))
            .find_map(|r| r.pattern.matches(path).map(|params| (r, params)))
    }

    /// Find the route a CORS preflight for `path` asks about: the one serving
    /// `requested`, else the first CORS route on the path.
    pub fn match_preflight(&self, path: &str, requested: &Method) -> Option<(&Route, PathParams)> {
        let candidates = || {
            self.routes
                .iter()
                .filter(|r| r.answers_preflight())
                .filter_map(|r| r.pattern.matches(path).map(|params| (r, params)))
        };
        candidates()
            .find(|(r, _)| method_matches(&r.method, requested, false))
            .or_else(|| candidates().next())
    }

    /// Reject tables where a gate could be bypassed or reordered.
    pub fn validate(&self) -> Result<(), Vec<RouteError>> {
        let mut errors = Vec::new();

        for (i, route) in self.routes.iter().enumerate() {
            for pair in route.gates.windows(2) {
                if pair[0].rank() >= pair[1].rank() {
                    errors.push(RouteError::OutOfOrder {
                        method: route.method.clone(),
                        path: route.path,
                        gate: pair[1].name(),
                    });
                }
            }

            if let Some(access) = route.endpoint.required_access() {
                if !route.gates.contains(&Gate::Session(access)) {
                    errors.push(RouteError::MissingSession {
                        method: route.method.clone(),
                        path: route.path,
                        access,
                    });
                }
            }

            let duplicate = self.routes[..i]
                .iter()
                .any(|r| r.method == route.method && r.path == route.path);
            if duplicate {
                errors.push(RouteError::Duplicate {
                    method: route.method.clone(),
                    path: route.path,
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The document assistant's route surface.
    pub fn standard(max_per_window: u32) -> Self {
        use Endpoint::*;

        let limit = Gate::RateLimit { max_per_window };
        let cors = |methods| Gate::Origin { methods };
        let read = Gate::Session(Access::Read);
        let write = Gate::Session(Access::Write);
        let by_credentials = Gate::Cache(CachePolicy::Credentials);
        let by_path = Gate::Cache(CachePolicy::Path);

        Self::new(vec![
            Route::new(Method::POST, "/login", Login, vec![by_credentials, limit, cors("POST")]),
            Route::new(Method::POST, "/register", Register, vec![by_credentials, limit, cors("POST")]),
            Route::new(Method::POST, "/logout", Logout, vec![limit, cors("POST"), write]),
            Route::new(Method::GET, "/signin", SignIn, vec![by_path, cors("GET")]),
            Route::new(Method::GET, "/signup", SignUp, vec![by_path, cors("GET")]),
            Route::new(Method::GET, "/categories", Categories, vec![cors("GET"), read]),
            Route::new(Method::POST, "/rules", CreateRule, vec![limit, cors("POST"), write]),
            Route::new(Method::PATCH, "/rules", UpdateRule, vec![limit, cors("PATCH"), write]),
            Route::new(Method::DELETE, "/rules/:id", DeleteRule, vec![limit, cors("DELETE"), write]),
            Route::new(Method::GET, "/notes", Notes, vec![cors("GET"), read]),
            Route::new(Method::POST, "/notes", UploadNote, vec![limit, cors("POST"), write]),
            Route::new(Method::DELETE, "/notes/:id", DeleteNote, vec![limit, cors("DELETE"), write]),
            Route::new(Method::GET, "/", Home, vec![]),
            Route::new(Method::GET, "/static/*", Static, vec![]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_is_valid() {
        assert_eq!(RouteTable::standard(10).validate(), Ok(()));
    }

    #[test]
    fn test_match_by_method_and_path() {
        let table = RouteTable::standard(10);

        let (route, _) = table.match_request(&Method::PATCH, "/rules").unwrap();
        assert_eq!(route.endpoint, Endpoint::UpdateRule);

        let (route, params) = table.match_request(&Method::DELETE, "/notes/7").unwrap();
        assert_eq!(route.endpoint, Endpoint::DeleteNote);
        assert_eq!(params.get("id"), Some("7"));

        let (route, _) = table.match_request(&Method::HEAD, "/signin").unwrap();
        assert_eq!(route.endpoint, Endpoint::SignIn);

        assert!(table.match_request(&Method::GET, "/login").is_none());
        assert!(table.match_request(&Method::GET, "/nowhere").is_none());
    }

    #[test]
    fn test_preflight_only_reaches_cors_routes() {
        let table = RouteTable::standard(10);
        assert!(table.match_request(&Method::OPTIONS, "/rules/3").is_some());
        assert!(table.match_request(&Method::OPTIONS, "/").is_none());
    }

    #[test]
    fn test_preflight_picks_route_for_requested_method() {
        let table = RouteTable::standard(10);

        let (route, _) = table.match_preflight("/notes", &Method::POST).unwrap();
        assert_eq!(route.endpoint, Endpoint::UploadNote);
        let (route, _) = table.match_preflight("/rules", &Method::PATCH).unwrap();
        assert!(route.gates.contains(&Gate::Origin { methods: "PATCH" }));

        // Unknown methods fall back to the first CORS route on the path.
        let (route, _) = table.match_preflight("/notes", &Method::PUT).unwrap();
        assert_eq!(route.endpoint, Endpoint::Notes);
        assert!(table.match_preflight("/", &Method::GET).is_none());
    }

    #[test]
    fn test_mutating_routes_are_write_protected() {
        let table = RouteTable::standard(10);
        for route in table.routes() {
            let mutating = route.method != Method::GET;
            let anonymous = matches!(route.endpoint, Endpoint::Login | Endpoint::Register);
            if mutating && !anonymous {
                assert!(
                    route.gates.contains(&Gate::Session(Access::Write)),
                    "{} {}",
                    route.method,
                    route.path
                );
            }
        }
    }

    #[test]
    fn test_rejects_reordered_gates() {
        let table = RouteTable::new(vec![Route::new(
            Method::POST,
            "/login",
            Endpoint::Login,
            vec![
                Gate::Origin { methods: "POST" },
                Gate::RateLimit { max_per_window: 10 },
            ],
        )]);
        let errors = table.validate().unwrap_err();
        assert!(matches!(errors[0], RouteError::OutOfOrder { gate: "rate_limit", .. }));
    }

    #[test]
    fn test_rejects_unprotected_write_route() {
        let table = RouteTable::new(vec![
            Route::new(Method::DELETE, "/rules/:id", Endpoint::DeleteRule, vec![Gate::Session(Access::Read)]),
            Route::new(Method::DELETE, "/rules/:id", Endpoint::DeleteRule, vec![Gate::Session(Access::Write)]),
        ]);
        let errors = table.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], RouteError::MissingSession { access: Access::Write, .. }));
        assert!(matches!(errors[1], RouteError::Duplicate { .. }));
    }

    #[test]
    fn test_rejects_duplicate_gate() {
        let table = RouteTable::new(vec![Route::new(
            Method::GET,
            "/notes",
            Endpoint::Notes,
            vec![Gate::Session(Access::Read), Gate::Session(Access::Read)],
        )]);
        assert!(table.validate().is_err());
    }
}
