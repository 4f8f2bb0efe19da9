//! Login state machine: start, callback, identity resolution, session issue.
//!
//! Every step fails closed. Nothing is persisted until the provider has
//! returned a profile, so an aborted callback leaves no identity or session.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::OAuthError;
use super::provider::IdentityProvider;
use super::state::{generate_state, states_match};
use crate::auth::{AuthError, IdentityDirectory, SessionStore};
use crate::models::auth::{Identity, Session};

/// Query parameters the provider sends to the callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// A started login: store `state` in the state cookie, redirect to
/// `redirect_url`.
#[derive(Debug, Clone)]
pub struct LoginStart {
    pub state: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub identity: Identity,
    pub session: Session,
    /// Whether this login created the identity.
    pub created: bool,
}

#[derive(Clone)]
pub struct OAuthFlow {
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
    identities: IdentityDirectory,
    sessions: SessionStore,
}

impl OAuthFlow {
    pub fn new(identities: IdentityDirectory, sessions: SessionStore) -> Self {
        Self {
            providers: HashMap::new(),
            identities,
            sessions,
        }
    }

    /// Register a provider under its [`IdentityProvider::name`].
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn IdentityProvider>, OAuthError> {
        self.providers
            .get(name)
            .ok_or_else(|| OAuthError::UnknownProvider(name.to_string()))
    }

    pub fn begin(&self, provider: &str) -> Result<LoginStart, OAuthError> {
        let provider = self.provider(provider)?;
        let state = generate_state();
        let redirect_url = provider.authorization_url(&state);
        info!(provider = provider.name(), "login started");
        Ok(LoginStart {
            state,
            redirect_url,
        })
    }

    /// Finish a login. `cookie_state` is the value of the state cookie, if
    /// the browser sent one.
    pub async fn complete(
        &self,
        provider: &str,
        cookie_state: Option<&str>,
        params: CallbackParams,
    ) -> Result<LoginOutcome, OAuthError> {
        let provider = self.provider(provider)?;

        if !states_match(cookie_state, params.state.as_deref()) {
            warn!(
                provider = provider.name(),
                has_cookie = cookie_state.is_some(),
                has_param = params.state.is_some(),
                "OAuth state mismatch"
            );
            return Err(OAuthError::InvalidState);
        }

        if let Some(error) = params.error.filter(|e| !e.is_empty()) {
            let detail = match params.error_description {
                Some(desc) if !desc.is_empty() => format!("{error}: {desc}"),
                _ => error,
            };
            warn!(provider = provider.name(), error = %detail, "provider refused login");
            return Err(OAuthError::ProviderDenied(detail));
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or(OAuthError::MissingCode)?;

        let tokens = provider.exchange_code(&code).await?;
        let profile = provider.fetch_profile(&tokens).await?;

        let (identity, created) = self.identities.resolve(&profile).await?;
        if !identity.is_active() {
            warn!(user_id = %identity.id, status = identity.status.as_str(), "login refused for non-active identity");
            return Err(AuthError::Forbidden("account is not active".into()).into());
        }

        let session = self
            .sessions
            .create(identity.id, tokens.refresh_token.as_deref(), None)
            .await?;

        info!(
            provider = provider.name(),
            user_id = %identity.id,
            created,
            "login completed"
        );
        Ok(LoginOutcome {
            identity,
            session,
            created,
        })
    }
}
