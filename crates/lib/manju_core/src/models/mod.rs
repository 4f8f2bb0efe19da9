//! Domain models shared by the store, vault and OAuth layers.

pub mod auth;
pub mod vault;
