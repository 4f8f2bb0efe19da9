//! OAuth login, current-user and logout handlers.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum::{Extension, Json};
use axum_extra::extract::CookieJar;
use manju_core::oauth::CallbackParams;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::services::cookies::{
    SESSION_COOKIE, STATE_COOKIE, clear_session_cookie, clear_state_cookie, session_cookie,
    state_cookie,
};

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// `GET /auth/login/{provider}`: set the state cookie and redirect (307)
/// to the provider.
pub async fn login_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    let start = state.oauth.begin(&provider)?;
    let jar = jar.add(state_cookie(&start.state, &state.config));
    Ok((jar, Redirect::temporary(&start.redirect_url)))
}

/// `GET /auth/callback/{provider}`: validate state, finish the login, set
/// the session cookie and redirect (307) to the frontend.
///
/// Failures answer directly with an error status; the state cookie cannot
/// be trusted to bridge back to the frontend at that point.
pub async fn callback_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    params: Result<Query<CallbackParams>, QueryRejection>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    let Query(params) = params.map_err(|e| AppError::Validation(e.body_text()))?;
    let cookie_state = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    let outcome = state
        .oauth
        .complete(&provider, cookie_state.as_deref(), params)
        .await?;

    let jar = jar
        .add(clear_state_cookie(&state.config))
        .add(session_cookie(&outcome.session.id, &state.config));
    Ok((jar, Redirect::temporary(&state.config.frontend_url)))
}

/// `GET /auth/me`
pub async fn me_handler(Extension(user): Extension<AuthenticatedUser>) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.identity.id,
        email: user.identity.email,
        name: user.identity.name,
    })
}

/// `GET|POST /auth/logout`: always 200. Store failures are logged, not
/// reported.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        match state.sessions.delete(cookie.value()).await {
            Ok(()) => debug!("session ended by logout"),
            Err(e) => warn!(error = %e, "logout could not delete session"),
        }
    }

    let jar = jar.add(clear_session_cookie(&state.config));
    (
        jar,
        Json(MessageResponse {
            message: "Logged out successfully".into(),
        }),
    )
}
