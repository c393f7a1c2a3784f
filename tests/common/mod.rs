//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use study_gateway::config::GatewayConfig;
use study_gateway::http::HttpServer;
use study_gateway::lifecycle::Shutdown;
use study_gateway::store::Stores;
use tokio::net::TcpListener;

/// A gateway running on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub client: reqwest::Client,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Defaults with cheap password hashing so tests stay fast.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.password.memory_kib = 8;
    config.password.iterations = 1;
    config.password.parallelism = 1;
    config.timeouts.shutdown_grace_secs = 1;
    config
}

pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let stores = Stores::in_memory(&config.cache.table, &config.rate_limit.table);
    let server = HttpServer::new(config, stores).unwrap();
    spawn_server(server).await
}

pub async fn spawn_server(server: HttpServer) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestGateway {
        addr,
        shutdown,
        client,
    }
}

/// `name=value` pairs from every `Set-Cookie` header, attributes stripped.
pub fn cookie_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A logged-in user's cookies, ready to send back.
pub struct Session {
    pub session_token: String,
    pub csrf_token: String,
}

impl Session {
    pub fn cookie_header(&self) -> (reqwest::header::HeaderName, String) {
        (
            COOKIE,
            format!(
                "session_token={}; csrf_token={}",
                self.session_token, self.csrf_token
            ),
        )
    }

    pub fn session_only(&self) -> (reqwest::header::HeaderName, String) {
        (COOKIE, format!("session_token={}", self.session_token))
    }
}

pub async fn register(gateway: &TestGateway, username: &str, password: &str) -> reqwest::Response {
    gateway
        .client
        .post(gateway.url("/register"))
        .form(&[
            ("username", username),
            ("password", password),
            ("passwordRepeat", password),
        ])
        .send()
        .await
        .unwrap()
}

pub async fn login(gateway: &TestGateway, username: &str, password: &str) -> reqwest::Response {
    gateway
        .client
        .post(gateway.url("/login"))
        .form(&[("username", username), ("password", password)])
        .send()
        .await
        .unwrap()
}

/// Log in and pull the session pair out of `Set-Cookie`.
pub async fn login_session(gateway: &TestGateway, username: &str, password: &str) -> Session {
    let response = login(gateway, username, password).await;
    assert_eq!(response.status(), 200, "login failed");
    let pairs = cookie_pairs(response.headers());
    let find = |name: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap()
    };
    Session {
        session_token: find("session_token"),
        csrf_token: find("csrf_token"),
    }
}
