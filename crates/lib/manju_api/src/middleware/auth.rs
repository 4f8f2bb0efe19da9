//! Authentication middleware: session cookie lookup.
//!
//! Only the session cookie is consulted; `Authorization` headers are ignored.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use manju_core::models::auth::Identity;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::SESSION_COOKIE;

/// The caller, stored in request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub identity: Identity,
    /// Opaque session id from the cookie; needed to log out.
    pub session_id: String,
}

impl AuthenticatedUser {
    pub fn id(&self) -> Uuid {
        self.identity.id
    }

    /// Fail with 403 unless `user_id` is the caller.
    pub fn ensure_is(&self, user_id: Uuid) -> Result<(), AppError> {
        if self.identity.id != user_id {
            warn!(caller = %self.identity.id, target = %user_id, "cross-user access refused");
            return Err(AppError::Forbidden("access to another user's resources".into()));
        }
        Ok(())
    }
}

/// Axum middleware: resolves the session cookie to a live session and an
/// active identity, then injects [`AuthenticatedUser`] into request
/// extensions. Never calls `next` on failure.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session_id = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("no session".into()))?;

    let session = state.sessions.validate(&session_id).await?;

    let identity = match state.identities.find(session.user_id).await {
        Ok(identity) => identity,
        Err(manju_core::auth::AuthError::NotFound(_)) => {
            debug!(user_id = %session.user_id, "session owner no longer exists");
            return Err(AppError::Unauthorized("invalid session".into()));
        }
        Err(e) => return Err(e.into()),
    };
    if !identity.is_active() {
        return Err(AppError::Forbidden("account is not active".into()));
    }

    request.extensions_mut().insert(AuthenticatedUser {
        identity,
        session_id,
    });

    Ok(next.run(request).await)
}
