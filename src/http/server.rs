//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared gate state from configuration and stores
//! - Create the Axum Router with a single dispatching handler
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Serve plain TCP or TLS with graceful shutdown
//! - Run background TTL sweeps for the cache and rate-limit stores

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::{Argon2Credentials, CookiePolicy, CredentialError, CredentialStore, SessionAuthority, TokenIssuer};
use crate::cache::CacheGate;
use crate::config::GatewayConfig;
use crate::http::handlers::{Downstream, EchoDownstream};
use crate::http::pipeline;
use crate::http::request::{client_key, propagate_request_id_layer, request_span, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::net::{load_tls_config, TlsError};
use crate::observability::metrics;
use crate::routing::{Endpoint, PathParams, RouteError, RouteTable};
use crate::security::{OriginGate, RateLimiter};
use crate::store::Stores;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid route table: {}", display_all(.0))]
    Routes(Vec<RouteError>),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn display_all(errors: &[RouteError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Application state injected into the dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub sessions: Arc<SessionAuthority>,
    pub cache: Arc<CacheGate>,
    pub limiter: Arc<RateLimiter>,
    pub origin: Arc<OriginGate>,
    pub cookies: CookiePolicy,
    pub downstream: Arc<dyn Downstream>,
    pub body_limit: usize,
}

impl AppState {
    /// Assemble the gates. Fails if the route table lets a gate be bypassed.
    pub fn new(
        config: &GatewayConfig,
        stores: &Stores,
        credentials: Arc<dyn CredentialStore>,
        downstream: Arc<dyn Downstream>,
    ) -> Result<Self, ServerError> {
        let routes = RouteTable::standard(config.rate_limit.max_per_window);
        routes.validate().map_err(ServerError::Routes)?;

        let body_limit = config.security.max_body_size;
        Ok(Self {
            routes: Arc::new(routes),
            sessions: Arc::new(SessionAuthority::new(
                stores.users.clone(),
                credentials,
                TokenIssuer::new(config.session.token_bytes),
            )),
            cache: Arc::new(CacheGate::new(
                stores.cache.clone(),
                config.cache.clone(),
                body_limit,
            )),
            limiter: Arc::new(RateLimiter::new(stores.counters.clone(), &config.rate_limit)),
            origin: Arc::new(OriginGate::new(&config.cors)),
            cookies: CookiePolicy {
                ttl: Duration::from_secs(config.session.cookie_ttl_secs),
                secure: config.session.secure_cookies,
            },
            downstream,
            body_limit,
        })
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a server with Argon2 credentials and the echo downstream.
    pub fn new(config: GatewayConfig, stores: Stores) -> Result<Self, ServerError> {
        let credentials = Arc::new(Argon2Credentials::new(&config.password)?);
        Self::with_parts(config, stores, credentials, Arc::new(EchoDownstream))
    }

    pub fn with_parts(
        config: GatewayConfig,
        stores: Stores,
        credentials: Arc<dyn CredentialStore>,
        downstream: Arc<dyn Downstream>,
    ) -> Result<Self, ServerError> {
        let state = AppState::new(&config, &stores, credentials, downstream)?;
        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            config,
            state,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(propagate_request_id_layer())
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        Router::new()
            .route("/", any(gateway_handler))
            .route("/{*path}", any(gateway_handler))
            .with_state(state)
            .layer(middleware)
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, then drain for at most the
    /// configured grace period.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);

        spawn_sweeper(
            self.state.clone(),
            Duration::from_secs(self.config.cache.sweep_interval_secs),
            &shutdown,
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        match &self.config.listener.tls {
            Some(tls) => {
                let rustls = load_tls_config(tls).await?;
                tracing::info!(address = %addr, "HTTPS server starting");

                let handle = axum_server::Handle::new();
                let mut signal = shutdown.subscribe();
                let trigger = handle.clone();
                tokio::spawn(async move {
                    let _ = signal.recv().await;
                    trigger.graceful_shutdown(Some(grace));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
            None => {
                tracing::info!(address = %addr, "HTTP server starting");

                let mut signal = shutdown.subscribe();
                let mut drained = shutdown.subscribe();
                let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = signal.recv().await;
                    tracing::info!("Draining connections");
                });
                let mut server = tokio::spawn(async move { serve.await });

                tokio::select! {
                    result = &mut server => return Ok(result??),
                    _ = drained.recv() => {}
                }
                match tokio::time::timeout(grace, &mut server).await {
                    Ok(result) => result??,
                    Err(_) => {
                        tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, closing open connections");
                        server.abort();
                    }
                }
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Periodically drop expired cache entries and rate-limit windows.
fn spawn_sweeper(state: AppState, every: Duration, shutdown: &Shutdown) {
    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cached = state.cache.purge_expired().await;
                    let windows = state.limiter.purge_expired().await;
                    tracing::debug!(cached, windows, "Expired entries swept");
                }
                _ = stop.recv() => break,
            }
        }
    });
}

/// Match the route and run its gate chain.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let client = client_key(&request);
    let routes = state.routes.clone();

    let matched = match preflight_method(&request) {
        Some(requested) => routes.match_preflight(request.uri().path(), &requested),
        None => routes.match_request(request.method(), request.uri().path()),
    };

    let (endpoint, response) = match matched {
        Some((route, params)) => (
            route.endpoint,
            pipeline::run(&state, route, params, &client, request).await,
        ),
        None => {
            tracing::debug!(path = %request.uri().path(), "No route matched");
            let mut request = request;
            request.extensions_mut().insert(PathParams::default());
            (
                Endpoint::NotFound,
                state.downstream.call(Endpoint::NotFound, None, request).await,
            )
        }
    };

    metrics::record_request(endpoint.name(), response.status().as_u16(), start);
    response
}

/// The method a CORS preflight asks about, if `request` is one.
fn preflight_method(request: &Request<Body>) -> Option<Method> {
    if request.method() != Method::OPTIONS {
        return None;
    }
    request
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_METHOD)
        .and_then(|v| Method::from_bytes(v.as_bytes()).ok())
}

#[cfg(test)]
pub(crate) fn test_state(config: GatewayConfig) -> AppState {
    let stores = Stores::in_memory(&config.cache.table, &config.rate_limit.table);
    AppState::new(
        &config,
        &stores,
        Arc::new(crate::auth::password::fast_credentials()),
        Arc::new(EchoDownstream),
    )
    .unwrap()
}
