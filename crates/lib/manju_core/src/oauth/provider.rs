//! Identity provider client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use super::OAuthError;
use crate::models::auth::ProviderProfile;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const GOOGLE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// Bound on each outbound provider call.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// OAuth client registration plus provider endpoints.
#[derive(Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    pub timeout: Duration,
}

impl OAuthClientConfig {
    /// Google endpoints and scopes for the given client registration.
    pub fn google(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: redirect_url.into(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            scopes: GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_url", &self.redirect_url)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("userinfo_url", &self.userinfo_url)
            .field("scopes", &self.scopes)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Token endpoint response.
#[derive(Clone, Default, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for ProviderTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderTokens")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

/// An OAuth2 authorization-code identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Path segment naming this provider (`/auth/login/{name}`).
    fn name(&self) -> &str;

    /// Where to send the user agent to start a login.
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens, OAuthError>;

    async fn fetch_profile(&self, tokens: &ProviderTokens) -> Result<ProviderProfile, OAuthError>;
}

/// Google OAuth2 over `reqwest`. Every call is bounded by the configured
/// timeout; a timeout surfaces as [`OAuthError::Upstream`].
pub struct GoogleProvider {
    config: OAuthClientConfig,
    auth_url: Url,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: OAuthClientConfig) -> Result<Self, OAuthError> {
        let auth_url = Url::parse(&config.auth_url)
            .map_err(|e| OAuthError::Config(format!("auth_url: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OAuthError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            config,
            auth_url,
            http,
        })
    }
}

async fn upstream_body(resp: reqwest::Response, what: &str) -> OAuthError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    error!(%status, body = %body, "{what} rejected by identity provider");
    OAuthError::Upstream(format!("{what} HTTP {status}"))
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline");
        url.into()
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens, OAuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];

        let resp = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "token exchange failed");
                OAuthError::Upstream(format!("token exchange failed: {e}"))
            })?;

        if !resp.status().is_success() {
            return Err(upstream_body(resp, "token exchange").await);
        }

        let tokens = resp
            .json::<ProviderTokens>()
            .await
            .map_err(|e| OAuthError::Upstream(format!("token response parse error: {e}")))?;
        debug!(?tokens, "authorization code exchanged");
        Ok(tokens)
    }

    async fn fetch_profile(&self, tokens: &ProviderTokens) -> Result<ProviderProfile, OAuthError> {
        let resp = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "profile fetch failed");
                OAuthError::Upstream(format!("profile fetch failed: {e}"))
            })?;

        if !resp.status().is_success() {
            return Err(upstream_body(resp, "profile fetch").await);
        }

        resp.json::<ProviderProfile>()
            .await
            .map_err(|e| OAuthError::Upstream(format!("profile response parse error: {e}")))
    }
}
