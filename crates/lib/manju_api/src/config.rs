//! API server configuration.

use std::time::Duration as StdDuration;

use axum_extra::extract::cookie::SameSite;
use manju_core::auth::sessions::{DEFAULT_SESSION_TTL_DAYS, MAX_SESSION_TTL_DAYS};
use manju_core::oauth::OAuthClientConfig;
use manju_core::vault::EncryptionKey;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/manju";
const DEFAULT_REDIRECT_URL: &str = "http://localhost:8080/auth/callback/google";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const DEFAULT_KEY_PROVIDER: &str = "openai";
const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 20;

/// Configuration errors. Each names the offending variable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Configuration for the API server. `Debug` never prints key material or
/// the OAuth client secret.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Key for vaulted API keys and stored refresh tokens.
    pub encryption_key: EncryptionKey,
    /// Google OAuth client registration.
    pub oauth: OAuthClientConfig,
    /// Post-login redirect target and the only CORS origin.
    pub frontend_url: String,
    pub cookie_secure: bool,
    /// `SameSite` for the session cookie.
    pub cookie_same_site: SameSite,
    /// Provider tag for keys submitted without one.
    pub default_key_provider: String,
    pub session_ttl: chrono::Duration,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_same_site(value: &str) -> Result<SameSite, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" => Ok(SameSite::None),
        other => Err(ConfigError::Invalid {
            var: "COOKIE_SAME_SITE",
            reason: format!("expected lax, strict or none, got {other:?}"),
        }),
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a positive integer, got {value:?}"),
        }),
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                  | Default                                       |
    /// |---------------------------|-----------------------------------------------|
    /// | `ENCRYPTION_KEY`          | required (64 hex chars or base64 of 32 bytes) |
    /// | `CLIENT_ID`               | required                                      |
    /// | `CLIENT_SECRET`           | required                                      |
    /// | `REDIRECT_URI` / `OAUTH_REDIRECT_URL` | `http://localhost:8080/auth/callback/google` |
    /// | `FRONTEND_URL`            | `http://localhost:5173`                       |
    /// | `BIND_ADDR`               | `127.0.0.1:8080`                              |
    /// | `DATABASE_URL`            | `postgres://localhost:5432/manju`             |
    /// | `COOKIE_SECURE`           | `true`                                        |
    /// | `COOKIE_SAME_SITE`        | `lax`                                         |
    /// | `DEFAULT_KEY_PROVIDER`    | `openai`                                      |
    /// | `SESSION_TTL_DAYS`        | `7` (at most 3650)                            |
    /// | `OAUTH_HTTP_TIMEOUT_SECS` | `20`                                          |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| non_empty(lookup(name));

        let encryption_key = get("ENCRYPTION_KEY")
            .ok_or(ConfigError::Missing("ENCRYPTION_KEY"))
            .and_then(|raw| {
                EncryptionKey::parse(&raw).map_err(|e| ConfigError::Invalid {
                    var: "ENCRYPTION_KEY",
                    reason: e.to_string(),
                })
            })?;
        let client_id = get("CLIENT_ID").ok_or(ConfigError::Missing("CLIENT_ID"))?;
        let client_secret = get("CLIENT_SECRET").ok_or(ConfigError::Missing("CLIENT_SECRET"))?;
        let redirect_url = get("REDIRECT_URI")
            .or_else(|| get("OAUTH_REDIRECT_URL"))
            .unwrap_or_else(|| DEFAULT_REDIRECT_URL.into());

        let timeout_secs = match get("OAUTH_HTTP_TIMEOUT_SECS") {
            Some(v) => parse_positive("OAUTH_HTTP_TIMEOUT_SECS", &v)?,
            None => DEFAULT_OAUTH_TIMEOUT_SECS,
        };
        let ttl_days = match get("SESSION_TTL_DAYS") {
            Some(v) => parse_positive("SESSION_TTL_DAYS", &v)?,
            None => DEFAULT_SESSION_TTL_DAYS as u64,
        };
        let session_ttl = i64::try_from(ttl_days)
            .ok()
            .filter(|days| *days <= MAX_SESSION_TTL_DAYS)
            .and_then(chrono::Duration::try_days)
            .ok_or_else(|| ConfigError::Invalid {
                var: "SESSION_TTL_DAYS",
                reason: format!("must be at most {MAX_SESSION_TTL_DAYS} days, got {ttl_days}"),
            })?;

        let cookie_secure = match get("COOKIE_SECURE") {
            Some(v) => parse_bool("COOKIE_SECURE", &v)?,
            None => true,
        };
        let cookie_same_site = match get("COOKIE_SAME_SITE") {
            Some(v) => parse_same_site(&v)?,
            None => SameSite::Lax,
        };
        if cookie_same_site == SameSite::None && !cookie_secure {
            return Err(ConfigError::Invalid {
                var: "COOKIE_SAME_SITE",
                reason: "none requires COOKIE_SECURE=true".into(),
            });
        }

        let frontend_url = get("FRONTEND_URL")
            .unwrap_or_else(|| DEFAULT_FRONTEND_URL.into())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            pg_connection_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            encryption_key,
            oauth: OAuthClientConfig::google(client_id, client_secret, redirect_url)
                .with_timeout(StdDuration::from_secs(timeout_secs)),
            frontend_url,
            cookie_secure,
            cookie_same_site,
            default_key_provider: get("DEFAULT_KEY_PROVIDER")
                .unwrap_or_else(|| DEFAULT_KEY_PROVIDER.into()),
            session_ttl,
        })
    }

    /// Client id with all but the first and last four characters hidden.
    pub fn masked_client_id(&self) -> String {
        let chars: Vec<char> = self.oauth.client_id.chars().collect();
        if chars.len() <= 8 {
            return "****".into();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}
