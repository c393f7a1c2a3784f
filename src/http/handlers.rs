//! Core handlers (login, register, logout) and the downstream seam.
//!
//! Every other endpoint is served by a [`Downstream`] implementation once the
//! route's gates have admitted the request.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{AuthError, SessionCookies};
use crate::cache::keys::CredentialsForm;
use crate::error::GateError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::{Endpoint, PathParams};
use crate::store::User;

pub const HX_REDIRECT: HeaderName = HeaderName::from_static("hx-redirect");

/// Handler for everything outside the authentication flow.
///
/// Path parameters are available as a [`PathParams`] request extension.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn call(&self, endpoint: Endpoint, user: Option<User>, request: Request<Body>) -> Response;
}

/// Downstream that describes what it was asked to serve.
pub struct EchoDownstream;

#[async_trait]
impl Downstream for EchoDownstream {
    async fn call(&self, endpoint: Endpoint, user: Option<User>, request: Request<Body>) -> Response {
        match endpoint {
            Endpoint::NotFound | Endpoint::Static => (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": "page does not exist" })),
            )
                .into_response(),
            _ => {
                let params = request
                    .extensions()
                    .get::<PathParams>()
                    .map(|p| p.0.clone())
                    .unwrap_or_default();
                Json(json!({
                    "endpoint": endpoint.name(),
                    "username": user.map(|u| u.username),
                    "params": params,
                }))
                .into_response()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RegisterForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default, rename = "passwordRepeat")]
    password_repeat: String,
}

/// Serve an admitted request.
pub async fn dispatch(
    state: &AppState,
    endpoint: Endpoint,
    user: Option<User>,
    request: Request<Body>,
) -> Response {
    let result = match endpoint {
        Endpoint::Login => login(state, request).await,
        Endpoint::Register => register(state, request).await,
        Endpoint::Logout => logout(state, user, request).await,
        other => return state.downstream.call(other, user, request).await,
    };
    result.unwrap_or_else(|e| e.into_response())
}

async fn login(state: &AppState, request: Request<Body>) -> Result<Response, GateError> {
    let form: CredentialsForm = read_form(request, state.body_limit).await?;

    let tokens = match state.sessions.login(&form.username, &form.password).await {
        Ok(tokens) => {
            metrics::record_login("success");
            tokens
        }
        Err(e) => {
            metrics::record_login(match e {
                AuthError::AuthFailure => "rejected",
                _ => "error",
            });
            return Err(e.into());
        }
    };

    let mut response = Json(json!({ "message": "logged in" })).into_response();
    let headers = response.headers_mut();
    let cookies = [
        state.cookies.session(&tokens.session_token),
        state.cookies.csrf(&tokens.csrf_token),
    ];
    for cookie in cookies.into_iter().flatten() {
        headers.append(header::SET_COOKIE, cookie);
    }
    headers.insert(HX_REDIRECT, HeaderValue::from_static("/categories"));
    Ok(response)
}

async fn register(state: &AppState, request: Request<Body>) -> Result<Response, GateError> {
    let form: RegisterForm = read_form(request, state.body_limit).await?;
    state
        .sessions
        .register(&form.username, &form.password, &form.password_repeat)
        .await?;
    // Earlier failed logins for this name are no longer the answer.
    state.cache.forget_user(&form.username).await;
    Ok(Json(json!({ "message": "account created" })).into_response())
}

async fn logout(state: &AppState, user: Option<User>, request: Request<Body>) -> Result<Response, GateError> {
    let cookies = SessionCookies::from_headers(request.headers());
    state
        .sessions
        .logout(
            cookies.session_token.as_deref().unwrap_or_default(),
            cookies.csrf_token.as_deref().unwrap_or_default(),
        )
        .await?;
    // A cached login would hand back the tokens just cleared.
    if let Some(user) = user {
        state.cache.forget_user(&user.username).await;
    }

    let mut response = Json(json!({ "message": "logged out" })).into_response();
    let headers = response.headers_mut();
    for cookie in state.cookies.cleared() {
        headers.append(header::SET_COOKIE, cookie);
    }
    headers.insert(HX_REDIRECT, HeaderValue::from_static("/"));
    Ok(response)
}

async fn read_form<T: DeserializeOwned>(request: Request<Body>, limit: usize) -> Result<T, GateError> {
    let bytes = to_bytes(request.into_body(), limit)
        .await
        .map_err(|_| GateError::BadRequest("request body too large".into()))?;
    serde_urlencoded::from_bytes(&bytes).map_err(|_| GateError::BadRequest("malformed form body".into()))
}
