//! Persistence seam for identities, sessions and vaulted credentials.
//!
//! Every service in this crate talks to storage through these traits.
//! [`PgStore`] is the production backend; [`MemoryStore`] backs tests and
//! local development. Neither holds in-process locks across calls: all
//! exclusion is the backend's (row locks in PostgreSQL, entry locks in the
//! in-memory maps).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{Identity, NewIdentity, SessionRecord};
use crate::models::vault::{CredentialRecord, NewCredential};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[async_trait]
pub trait IdentityRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    /// Insert unless an identity with the same email (case-insensitive)
    /// exists. Returns the stored identity and whether it was created here.
    async fn insert_or_fetch(&self, new: NewIdentity) -> Result<(Identity, bool), StoreError>;
}

#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn insert(&self, record: SessionRecord) -> Result<(), StoreError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Returns rows affected.
    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64, StoreError>;

    /// Delete sessions whose `expires_at` is at or before `now`, or whose
    /// `created_at` is at or before `created_before` when no expiry is set.
    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait CredentialRepo: Send + Sync {
    /// Newest first.
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<CredentialRecord>, StoreError>;

    /// Store a credential. It becomes the default iff the identity holds no
    /// credentials at insertion time; the check and insert are one atomic unit.
    async fn insert(&self, new: NewCredential) -> Result<CredentialRecord, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>, StoreError>;

    async fn find_default(&self, user_id: Uuid) -> Result<Option<CredentialRecord>, StoreError>;

    /// Delete scoped by owner and id. Returns rows affected (0 for a
    /// credential that is missing or belongs to someone else).
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<u64, StoreError>;

    /// Atomically clear every default of `user_id` and mark `id`. Returns
    /// `false`, changing nothing, when `id` is not one of the user's keys.
    async fn set_default(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError>;
}
