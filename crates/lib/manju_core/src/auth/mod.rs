//! Sessions and the identity directory.
//!
//! Shared by the OAuth flow controller (which issues sessions) and the API
//! guard (which validates them on every request).

pub mod identities;
pub mod sessions;

use thiserror::Error;

use crate::store::StoreError;
use crate::vault::CipherError;

pub use identities::IdentityDirectory;
pub use sessions::SessionStore;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
