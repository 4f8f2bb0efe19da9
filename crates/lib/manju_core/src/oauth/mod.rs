//! OAuth2 authorization-code login.
//!
//! [`flow::OAuthFlow`] drives login start and callback completion against an
//! [`provider::IdentityProvider`], then resolves the local identity and
//! issues a session.

pub mod flow;
pub mod provider;
pub mod state;

use thiserror::Error;

use crate::auth::AuthError;

pub use flow::{CallbackParams, LoginOutcome, LoginStart, OAuthFlow};
pub use provider::{GoogleProvider, IdentityProvider, OAuthClientConfig, ProviderTokens};

/// OAuth flow errors.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid OAuth state")]
    InvalidState,

    #[error("identity provider returned an error: {0}")]
    ProviderDenied(String),

    #[error("missing authorization code")]
    MissingCode,

    #[error("unknown identity provider: {0}")]
    UnknownProvider(String),

    #[error("identity provider request failed: {0}")]
    Upstream(String),

    #[error("OAuth configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}
