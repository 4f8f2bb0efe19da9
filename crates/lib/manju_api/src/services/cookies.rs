//! Cookie service: build and clear the session and OAuth state cookies.

use axum_extra::extract::cookie::{Cookie, SameSite};
use manju_core::oauth::state::STATE_TTL_SECS;
use time::Duration;

use crate::config::ApiConfig;

/// Cookie name for the opaque session id.
pub const SESSION_COOKIE: &str = "manju_session";
/// Cookie name for the OAuth transaction state.
pub const STATE_COOKIE: &str = "oauthstate";

/// HttpOnly session cookie valid for the session TTL.
pub fn session_cookie(session_id: &str, config: &ApiConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(config.cookie_same_site)
        .path("/")
        .max_age(Duration::seconds(config.session_ttl.num_seconds()))
        .build()
}

/// Expired session cookie.
pub fn clear_session_cookie(config: &ApiConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(config.cookie_same_site)
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// Short-lived state cookie. Always `Lax` so the browser sends it on the
/// top-level redirect back from the provider.
pub fn state_cookie(state: &str, config: &ApiConfig) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE, state.to_string()))
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::seconds(STATE_TTL_SECS))
        .build()
}

pub fn clear_state_cookie(config: &ApiConfig) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE, ""))
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}
