//! # manju_api
//!
//! HTTP API library for Manju: OAuth login, session-cookie auth and the
//! per-user API key vault.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, put};
use manju_core::auth::{IdentityDirectory, SessionStore};
use manju_core::oauth::{GoogleProvider, IdentityProvider, OAuthError, OAuthFlow};
use manju_core::store::{CredentialRepo, IdentityRepo, SessionRepo};
use manju_core::vault::{CredentialCipher, CredentialVault};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::config::ApiConfig;
use crate::handlers::{api_keys, auth, health};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: ApiConfig,
    pub identities: IdentityDirectory,
    pub sessions: SessionStore,
    pub vault: CredentialVault,
    pub oauth: OAuthFlow,
}

impl AppState {
    /// Wire the services over one store. No identity provider is registered
    /// yet; see [`with_google`](Self::with_google).
    pub fn new<S>(config: ApiConfig, store: Arc<S>) -> Self
    where
        S: IdentityRepo + SessionRepo + CredentialRepo + 'static,
    {
        let cipher = CredentialCipher::new(&config.encryption_key);
        let identities = IdentityDirectory::new(store.clone());
        let sessions = SessionStore::new(store.clone(), cipher.clone(), config.session_ttl);
        let vault = CredentialVault::new(store, cipher, config.default_key_provider.clone());
        let oauth = OAuthFlow::new(identities.clone(), sessions.clone());
        Self {
            config,
            identities,
            sessions,
            vault,
            oauth,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.oauth = self.oauth.with_provider(provider);
        self
    }

    /// Register Google from `config.oauth`.
    pub fn with_google(self) -> Result<Self, OAuthError> {
        let google = GoogleProvider::new(self.config.oauth.clone())?;
        Ok(self.with_provider(Arc::new(google)))
    }
}

/// Run embedded database migrations.
///
/// Delegates to `manju_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    manju_core::migrate::migrate(pool).await
}

/// CORS for the frontend origin, with credentials.
fn cors(config: &ApiConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION]);
    match HeaderValue::from_str(&config.frontend_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            warn!(frontend_url = %config.frontend_url, "frontend URL is not a valid origin; CORS disabled");
            layer
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = cors(&state.config);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/api/health", get(health::health_handler))
        .route("/auth/login/{provider}", get(auth::login_handler))
        .route("/auth/callback/{provider}", get(auth::callback_handler))
        .route(
            "/auth/logout",
            get(auth::logout_handler).post(auth::logout_handler),
        );

    // Protected routes (require a live session)
    let protected = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/users/{id}/api-keys",
            get(api_keys::list_api_keys_handler).post(api_keys::create_api_key_handler),
        )
        .route(
            "/users/{id}/api-keys/default",
            get(api_keys::get_default_api_key_handler),
        )
        .route(
            "/users/{id}/api-keys/{key_id}",
            axum::routing::delete(api_keys::delete_api_key_handler),
        )
        .route(
            "/users/{id}/api-keys/{key_id}/default",
            put(api_keys::set_default_api_key_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
