//! Gate chain execution.
//!
//! # Data Flow
//! ```text
//! matched Route
//!     → Cache      (hit: replay now, or hold until later gates pass)
//!     → RateLimit  (429 once the window budget is spent)
//!     → Origin     (403 for foreign origins, 204 for preflights)
//!     → Session    (401 without a valid session / CSRF pair)
//!     → handler    (miss: store a 2xx response under the cache key)
//! ```
//!
//! Gates run in the order the route declares them. The first rejection ends
//! the request; later gates and the handler never see it.

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::auth::SessionCookies;
use crate::cache::{CachePolicy, PendingEntry};
use crate::error::GateError;
use crate::http::handlers;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::{Gate, PathParams, Route};
use crate::security::{OriginDecision, OriginGate, RateBudget, RateDecision};
use crate::store::{CacheHit, User};

/// Result of running a route's gates.
enum Admission {
    /// A gate answered the request itself.
    Answered(Response),
    /// Every gate passed.
    Proceed {
        user: Option<User>,
        pending: Option<PendingEntry>,
        held: Option<(CacheHit, CachePolicy)>,
    },
}

/// Headers earned while passing gates, applied to whatever response goes out.
#[derive(Default)]
struct Decorations {
    budget: Option<RateBudget>,
    origin: Option<HeaderValue>,
}

impl Decorations {
    fn apply(self, response: &mut Response) {
        if let Some(budget) = self.budget {
            budget.apply(response.headers_mut());
        }
        if let Some(origin) = self.origin {
            OriginGate::decorate(origin, response);
        }
    }
}

/// Run `route`'s gates against `request` and, if admitted, its handler.
pub async fn run(
    state: &AppState,
    route: &Route,
    params: PathParams,
    client: &str,
    mut request: Request<Body>,
) -> Response {
    let method = request.method().clone();
    let mut decorations = Decorations::default();

    let mut response = match admit(state, route, client, &mut request, &mut decorations).await {
        Ok(Admission::Answered(response)) => response,
        Ok(Admission::Proceed {
            held: Some((hit, policy)),
            ..
        }) => state.cache.replay(hit, policy),
        Ok(Admission::Proceed { user, pending, .. }) => {
            request.extensions_mut().insert(params);
            let response = handlers::dispatch(state, route.endpoint, user, request).await;
            match pending {
                Some(pending) => state.cache.capture(pending, &method, response).await,
                None => response,
            }
        }
        Err((gate, err)) => {
            metrics::record_gate_rejection(gate);
            tracing::warn!(
                gate,
                reason = err.kind(),
                endpoint = %route.endpoint,
                client,
                "Request rejected"
            );
            err.into_response()
        }
    };

    decorations.apply(&mut response);
    response
}

async fn admit(
    state: &AppState,
    route: &Route,
    client: &str,
    request: &mut Request<Body>,
    decorations: &mut Decorations,
) -> Result<Admission, (&'static str, GateError)> {
    let mut user = None;
    let mut pending = None;
    let mut held = None;

    for gate in &route.gates {
        let reject = |err: GateError| (gate.name(), err);

        match *gate {
            Gate::Cache(policy) => {
                if !state.cache.enabled() {
                    continue;
                }
                let (key, rebuilt) = state
                    .cache
                    .key_for(policy, std::mem::take(request))
                    .await
                    .map_err(reject)?;
                *request = rebuilt;
                let Some(key) = key else { continue };

                match state.cache.get(&key).await.map_err(|e| reject(e.into()))? {
                    Some(hit) if state.cache.short_circuits() => {
                        return Ok(Admission::Answered(state.cache.replay(hit, policy)));
                    }
                    Some(hit) => held = Some((hit, policy)),
                    None => {
                        pending = Some(PendingEntry {
                            ttl: state.cache.ttl(policy),
                            key,
                            policy,
                        })
                    }
                }
            }
            Gate::RateLimit { max_per_window } => {
                let decision = state
                    .limiter
                    .allow(route.rate_group(), client, max_per_window)
                    .await
                    .map_err(reject)?;
                match decision {
                    RateDecision::Allowed(budget) => decorations.budget = Some(budget),
                    RateDecision::Limited { retry_after } => {
                        return Err(reject(GateError::RateLimited { retry_after }));
                    }
                }
            }
            Gate::Origin { methods } => {
                match state.origin.check(request).map_err(reject)? {
                    OriginDecision::SameOrigin => {}
                    OriginDecision::CrossOrigin(origin) => decorations.origin = Some(origin),
                    OriginDecision::Preflight(origin) => {
                        return Ok(Admission::Answered(OriginGate::preflight_response(
                            origin,
                            methods,
                            request.headers(),
                        )));
                    }
                }
                if request.method() == Method::OPTIONS {
                    return Ok(Admission::Answered(allow_response(methods)));
                }
            }
            Gate::Session(access) => {
                let cookies = SessionCookies::from_headers(request.headers());
                let authorized = state
                    .sessions
                    .authorize(access, &cookies)
                    .await
                    .map_err(|e| reject(e.into()))?;
                user = Some(authorized);
            }
        }
    }

    Ok(Admission::Proceed {
        user,
        pending,
        held,
    })
}

/// Plain `OPTIONS` (not a CORS preflight) lists the route's methods.
fn allow_response(methods: &'static str) -> Response {
    (
        StatusCode::NO_CONTENT,
        [(header::ALLOW, HeaderValue::from_static(methods))],
    )
        .into_response()
}
