//! Shared fixtures: an in-memory app with a stub identity provider.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use manju_api::{AppState, config::ApiConfig};
use manju_core::models::auth::ProviderProfile;
use manju_core::oauth::{IdentityProvider, OAuthError, ProviderTokens};
use manju_core::store::MemoryStore;
use tower::ServiceExt;

pub const FRONTEND: &str = "http://frontend.test";

/// Provider whose authorization code doubles as the email local part.
/// `fail` simulates an upstream outage; `noemail` yields an empty email.
pub struct StubProvider;

#[async_trait]
impl IdentityProvider for StubProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn authorization_url(&self, state: &str) -> String {
        format!("https://idp.test/auth?state={state}")
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens, OAuthError> {
        if code == "fail" {
            return Err(OAuthError::Upstream("connect timeout".into()));
        }
        Ok(ProviderTokens {
            access_token: code.to_string(),
            refresh_token: Some(format!("1//{code}")),
            ..Default::default()
        })
    }

    async fn fetch_profile(&self, tokens: &ProviderTokens) -> Result<ProviderProfile, OAuthError> {
        let email = match tokens.access_token.as_str() {
            "noemail" => String::new(),
            local => format!("{local}@example.com"),
        };
        Ok(ProviderProfile {
            email,
            name: Some(tokens.access_token.to_uppercase()),
            ..Default::default()
        })
    }
}

pub fn config() -> ApiConfig {
    ApiConfig::from_lookup(|name| match name {
        "ENCRYPTION_KEY" => Some("ab".repeat(32)),
        "CLIENT_ID" => Some("test-client-id".into()),
        "CLIENT_SECRET" => Some("test-client-secret".into()),
        "FRONTEND_URL" => Some(FRONTEND.into()),
        _ => None,
    })
    .expect("test config")
}

pub fn app() -> (Router, Arc<MemoryStore>) {
    app_with(config())
}

pub fn app_with(config: ApiConfig) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(config, store.clone()).with_provider(Arc::new(StubProvider));
    (manju_api::router(state), store)
}

pub async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.expect("request")
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    request("GET", uri, cookie, None)
}

pub fn request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    json: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match json {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn json_body(resp: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse JSON")
}

/// Every `Set-Cookie` header for `name`, raw.
pub fn set_cookies(resp: &Response<Body>, name: &str) -> Vec<String> {
    let prefix = format!("{name}=");
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| v.starts_with(&prefix))
        .map(str::to_string)
        .collect()
}

/// Value of the last `Set-Cookie` for `name`.
pub fn cookie_value(resp: &Response<Body>, name: &str) -> Option<String> {
    set_cookies(resp, name).last().map(|raw| {
        raw.split(';')
            .next()
            .unwrap_or_default()
            .trim_start_matches(&format!("{name}="))
            .to_string()
    })
}

/// Start a login and return the issued state.
pub async fn begin_login(app: &Router) -> String {
    let resp = send(app, get("/auth/login/google", None)).await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    cookie_value(&resp, "oauthstate").expect("state cookie")
}

/// Full login as `<local>@example.com`. Returns a `Cookie` header value.
pub async fn login(app: &Router, local: &str) -> String {
    let state = begin_login(app).await;
    let resp = send(
        app,
        get(
            &format!("/auth/callback/google?state={state}&code={local}"),
            Some(&format!("oauthstate={state}")),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    let session = cookie_value(&resp, "manju_session").expect("session cookie");
    format!("manju_session={session}")
}

/// Caller's user id from `/auth/me`.
pub async fn user_id(app: &Router, cookie: &str) -> String {
    let resp = send(app, get("/auth/me", Some(cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    json_body(resp).await["id"]
        .as_str()
        .expect("id")
        .to_string()
}
