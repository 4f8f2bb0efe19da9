//! # manju_core
//!
//! Core domain logic for Manju: the credential vault, server-side sessions,
//! the identity directory and OAuth login. No HTTP server code lives here.

pub mod auth;
pub mod migrate;
pub mod models;
pub mod oauth;
pub mod store;
pub mod vault;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
