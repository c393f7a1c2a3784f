//! End-to-end gate behavior over real TCP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD,
    ORIGIN, RETRY_AFTER, SET_COOKIE,
};
use reqwest::StatusCode;
use study_gateway::auth::{Argon2Credentials, CredentialError, CredentialStore};
use study_gateway::http::{EchoDownstream, HttpServer};
use study_gateway::store::Stores;

mod common;

use common::{login, login_session, register, spawn_gateway, spawn_server, test_config};

#[tokio::test]
async fn test_login_grants_read_and_write() {
    let gateway = spawn_gateway(test_config()).await;
    assert_eq!(register(&gateway, "ada", "pw").await.status(), StatusCode::OK);

    let response = login(&gateway, "ada", "pw").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["hx-redirect"], "/categories");
    let set_cookies: Vec<_> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(set_cookies.iter().any(|c| c.starts_with("session_token=") && c.contains("Max-Age=86400")));

    let session = login_session(&gateway, "ada", "pw").await;
    let (name, value) = session.cookie_header();

    let read = gateway
        .client
        .get(gateway.url("/categories"))
        .header(name.clone(), value.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(read.status(), StatusCode::OK);
    let body: serde_json::Value = read.json().await.unwrap();
    assert_eq!(body["username"], "ada");

    let write = gateway
        .client
        .delete(gateway.url("/rules/4"))
        .header(name, value)
        .send()
        .await
        .unwrap();
    assert_eq!(write.status(), StatusCode::OK);
    let body: serde_json::Value = write.json().await.unwrap();
    assert_eq!(body["params"]["id"], "4");
}

#[tokio::test]
async fn test_write_requires_matching_csrf() {
    let gateway = spawn_gateway(test_config()).await;
    register(&gateway, "ada", "pw").await;
    let session = login_session(&gateway, "ada", "pw").await;

    let (name, value) = session.session_only();
    let missing = gateway
        .client
        .post(gateway.url("/notes"))
        .header(name.clone(), value)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let forged = gateway
        .client
        .post(gateway.url("/notes"))
        .header(
            name,
            format!("session_token={}; csrf_token=forged", session.session_token),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_after_registration_issues_cookies() {
    let gateway = spawn_gateway(test_config()).await;
    let registered = register(&gateway, "ada", "pw").await;
    assert_eq!(registered.headers()["x-cache"], "miss");

    let response = login(&gateway, "ada", "pw").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-cache"], "miss");
    assert_eq!(response.headers()["hx-redirect"], "/categories");
    assert_eq!(common::cookie_pairs(response.headers()).len(), 2);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "logged in");
}

#[tokio::test]
async fn test_repeated_login_replays_same_session() {
    let gateway = spawn_gateway(test_config()).await;
    register(&gateway, "ada", "pw").await;

    let first = login_session(&gateway, "ada", "pw").await;
    let replayed = login(&gateway, "ada", "pw").await;
    assert_eq!(replayed.headers()["x-cache"], "hit");
    assert!(replayed.headers()["cache-control"]
        .to_str()
        .unwrap()
        .starts_with("private"));

    let pairs = common::cookie_pairs(replayed.headers());
    assert!(pairs.contains(&("session_token".to_string(), first.session_token.clone())));
    assert!(pairs.contains(&("csrf_token".to_string(), first.csrf_token.clone())));
}

#[tokio::test]
async fn test_second_login_revokes_first_session() {
    let mut config = test_config();
    config.cache.enabled = false;
    let gateway = spawn_gateway(config).await;
    register(&gateway, "ada", "pw").await;

    let first = login_session(&gateway, "ada", "pw").await;
    let second = login_session(&gateway, "ada", "pw").await;
    assert_ne!(first.session_token, second.session_token);

    for (session, expected) in [(&first, StatusCode::UNAUTHORIZED), (&second, StatusCode::OK)] {
        let (name, value) = session.session_only();
        let response = gateway
            .client
            .get(gateway.url("/notes"))
            .header(name, value)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), expected);
    }
}

#[tokio::test]
async fn test_logout_ends_session() {
    let gateway = spawn_gateway(test_config()).await;
    register(&gateway, "ada", "pw").await;
    let session = login_session(&gateway, "ada", "pw").await;
    let (name, value) = session.cookie_header();

    let response = gateway
        .client
        .post(gateway.url("/logout"))
        .header(name.clone(), value.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["hx-redirect"], "/");
    assert!(response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .all(|v| v.to_str().unwrap().contains("Max-Age=0")));

    let after = gateway
        .client
        .get(gateway.url("/categories"))
        .header(name, value)
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);

    // The cached login is gone with the session it carried.
    let again = login(&gateway, "ada", "pw").await;
    assert_eq!(again.headers()["x-cache"], "miss");
    let fresh = common::cookie_pairs(again.headers());
    assert!(!fresh.contains(&("session_token".to_string(), session.session_token.clone())));
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let gateway = spawn_gateway(test_config()).await;
    register(&gateway, "ada", "pw").await;

    let unknown = login(&gateway, "nobody", "pw").await;
    let wrong = login(&gateway, "ada", "nope").await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert!(unknown.headers().get(SET_COOKIE).is_none());

    let unknown_body = unknown.text().await.unwrap();
    let wrong_body = wrong.text().await.unwrap();
    assert_eq!(unknown_body, wrong_body);
}

#[tokio::test]
async fn test_login_is_rate_limited() {
    let gateway = spawn_gateway(test_config()).await;

    // Distinct passwords so no attempt is answered from the cache.
    for i in 1..=10 {
        let response = login(&gateway, "nobody", &format!("pw{i}")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "attempt {i}");
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            (10 - i).to_string().as_str()
        );
    }

    let limited = login(&gateway, "nobody", "pw11").await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = limited.headers()[RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));

    // Other route groups keep their own budget.
    let other = register(&gateway, "ada", "pw").await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_origin_allow_list() {
    let gateway = spawn_gateway(test_config()).await;

    let foreign = gateway
        .client
        .post(gateway.url("/login"))
        .header(ORIGIN, "https://evil.example")
        .form(&[("username", "ada"), ("password", "pw")])
        .send()
        .await
        .unwrap();
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    let allowed = gateway
        .client
        .post(gateway.url("/login"))
        .header(ORIGIN, "https://gityear.re")
        .form(&[("username", "ada"), ("password", "pw")])
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(allowed.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://gityear.re");

    let preflight = gateway
        .client
        .request(reqwest::Method::OPTIONS, gateway.url("/rules/1"))
        .header(ORIGIN, "https://gityear.re")
        .header(ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), StatusCode::NO_CONTENT);
    assert_eq!(preflight.headers()[ACCESS_CONTROL_ALLOW_METHODS], "DELETE");

    let upload = gateway
        .client
        .request(reqwest::Method::OPTIONS, gateway.url("/notes"))
        .header(ORIGIN, "https://gityear.re")
        .header(ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(upload.status(), StatusCode::NO_CONTENT);
    assert_eq!(upload.headers()[ACCESS_CONTROL_ALLOW_METHODS], "POST");

    let ungated = gateway
        .client
        .get(gateway.url("/"))
        .header(ORIGIN, "https://evil.example")
        .send()
        .await
        .unwrap();
    assert_eq!(ungated.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_path_cache_serves_get_and_head() {
    let gateway = spawn_gateway(test_config()).await;

    let first = gateway.client.get(gateway.url("/signin")).send().await.unwrap();
    assert_eq!(first.headers()["x-cache"], "miss");

    let second = gateway.client.get(gateway.url("/signin")).send().await.unwrap();
    assert_eq!(second.headers()["x-cache"], "hit");
    assert!(second.headers()["cache-control"]
        .to_str()
        .unwrap()
        .starts_with("public"));

    let head = gateway.client.head(gateway.url("/signin")).send().await.unwrap();
    assert_eq!(head.status(), StatusCode::OK);
    assert_eq!(head.headers()["x-cache"], "hit");
}

#[derive(Clone, Default)]
struct CallCounts {
    hashes: Arc<AtomicUsize>,
    verifies: Arc<AtomicUsize>,
}

impl CallCounts {
    fn hashes(&self) -> usize {
        self.hashes.load(Ordering::SeqCst)
    }

    fn verifies(&self) -> usize {
        self.verifies.load(Ordering::SeqCst)
    }
}

struct CountingCredentials {
    inner: Argon2Credentials,
    counts: CallCounts,
}

impl CredentialStore for CountingCredentials {
    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        self.counts.hashes.fetch_add(1, Ordering::SeqCst);
        self.inner.hash(password)
    }

    fn verify(&self, password: &str, hashed: &str) -> bool {
        self.counts.verifies.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(password, hashed)
    }
}

async fn spawn_counting(config: study_gateway::GatewayConfig) -> (common::TestGateway, CallCounts) {
    let counts = CallCounts::default();
    let credentials = CountingCredentials {
        inner: Argon2Credentials::new(&config.password).unwrap(),
        counts: counts.clone(),
    };
    let stores = Stores::in_memory(&config.cache.table, &config.rate_limit.table);
    let server = HttpServer::with_parts(
        config,
        stores,
        Arc::new(credentials),
        Arc::new(EchoDownstream),
    )
    .unwrap();
    (spawn_server(server).await, counts)
}

#[tokio::test]
async fn test_cached_login_skips_verification_until_expiry() {
    let mut config = test_config();
    config.cache.post_ttl_secs = 1;
    let (gateway, counts) = spawn_counting(config).await;
    register(&gateway, "ada", "pw").await;

    let first = login(&gateway, "ada", "wrong").await;
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(first.headers()["x-cache"], "miss");
    let first_body = first.bytes().await.unwrap();

    let second = login(&gateway, "ada", "wrong").await;
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(second.headers()["x-cache"], "hit");
    assert_eq!(second.bytes().await.unwrap(), first_body);
    assert_eq!(counts.verifies(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let expired = login(&gateway, "ada", "wrong").await;
    assert_eq!(expired.headers()["x-cache"], "miss");
    assert_eq!(counts.verifies(), 2);
}

#[tokio::test]
async fn test_registration_clears_cached_login_failure() {
    let (gateway, counts) = spawn_counting(test_config()).await;

    let before = login(&gateway, "ada", "pw").await;
    assert_eq!(before.status(), StatusCode::UNAUTHORIZED);
    register(&gateway, "ada", "pw").await;

    let after = login(&gateway, "ada", "pw").await;
    assert_eq!(after.status(), StatusCode::OK);
    assert_eq!(after.headers()["x-cache"], "miss");
    // The rejection before registration never reached verification.
    assert_eq!(counts.verifies(), 1);
}

#[tokio::test]
async fn test_cached_registration_skips_hashing() {
    let (gateway, counts) = spawn_counting(test_config()).await;

    let first = register(&gateway, "ada", "pw").await;
    assert_eq!(first.headers()["x-cache"], "miss");
    let replayed = register(&gateway, "ada", "pw").await;
    assert_eq!(replayed.status(), StatusCode::OK);
    assert_eq!(replayed.headers()["x-cache"], "hit");
    assert_eq!(counts.hashes(), 1);

    // A different password is a different key and reaches the handler.
    let conflict = register(&gateway, "ada", "other").await;
    assert_eq!(conflict.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unmatched_route_is_not_found() {
    let gateway = spawn_gateway(test_config()).await;
    let response = gateway.client.get(gateway.url("/nowhere")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let gateway = spawn_gateway(test_config()).await;
    assert!(gateway.client.get(gateway.url("/")).send().await.is_ok());

    gateway.shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(gateway.client.get(gateway.url("/")).send().await.is_err());
}
