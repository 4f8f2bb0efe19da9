//! PostgreSQL store.
//!
//! Vault writes that depend on the identity's other keys (first-key default,
//! default flip) run in one transaction holding the owner's `users` row lock,
//! so writers for the same identity are serialised. The partial unique index
//! `user_api_keys_one_default` rejects a second default if that is bypassed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::{CredentialRepo, IdentityRepo, SessionRepo, StoreError};
use crate::models::auth::{Identity, NewIdentity, ProviderProfile, SessionRecord};
use crate::models::vault::{CredentialRecord, NewCredential};

const USER_COLUMNS: &str = "id, email, name, info, status, created_at, updated_at";
const KEY_COLUMNS: &str = "id, user_id, label, provider, encrypted_key, is_default, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    info: Option<Json<ProviderProfile>>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for Identity {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Identity {
            id: row.id,
            email: row.email,
            name: row.name,
            profile: row.info.map(|Json(p)| p),
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    token_hash: String,
    user_id: Uuid,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        SessionRecord {
            token_hash: row.token_hash,
            user_id: row.user_id,
            refresh_token_enc: row.refresh_token,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct KeyRow {
    id: Uuid,
    user_id: Uuid,
    label: String,
    provider: String,
    encrypted_key: String,
    is_default: bool,
    created_at: DateTime<Utc>,
}

impl From<KeyRow> for CredentialRecord {
    fn from(row: KeyRow) -> Self {
        CredentialRecord {
            id: row.id,
            user_id: row.user_id,
            label: row.label,
            provider: row.provider,
            encrypted_key: row.encrypted_key,
            is_default: row.is_default,
            created_at: row.created_at,
        }
    }
}

/// Lock the owner's row for the rest of the transaction.
async fn lock_owner(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<(), StoreError> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .map(|_| ())
        .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
}

#[async_trait]
impl IdentityRepo for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Identity::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Identity::try_from).transpose()
    }

    async fn insert_or_fetch(&self, new: NewIdentity) -> Result<(Identity, bool), StoreError> {
        // A conflict on the lower(email) index means a concurrent or earlier
        // login already created the row.
        let inserted = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, name, info, status) VALUES ($1, $2, $3, $4) \
             ON CONFLICT DO NOTHING \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(new.email.trim())
        .bind(&new.name)
        .bind(Json(&new.profile))
        .bind(new.status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((Identity::try_from(row)?, true));
        }

        let existing = self
            .find_by_email(&new.email)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", new.email)))?;
        Ok((existing, false))
    }
}

#[async_trait]
impl SessionRepo for PgStore {
    async fn insert(&self, record: SessionRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, refresh_token, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&record.token_hash)
        .bind(record.user_id)
        .bind(&record.refresh_token_enc)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT token_hash, user_id, refresh_token, expires_at, created_at \
             FROM sessions WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionRecord::from))
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM sessions \
             WHERE (expires_at IS NOT NULL AND expires_at <= $1) \
                OR (expires_at IS NULL AND created_at <= $2)",
        )
        .bind(now)
        .bind(created_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CredentialRepo for PgStore {
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<CredentialRecord>, StoreError> {
        let rows = sqlx::query_as::<_, KeyRow>(&format!(
            "SELECT {KEY_COLUMNS} FROM user_api_keys \
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CredentialRecord::from).collect())
    }

    async fn insert(&self, new: NewCredential) -> Result<CredentialRecord, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, new.user_id).await?;

        let has_keys = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM user_api_keys WHERE user_id = $1)",
        )
        .bind(new.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, KeyRow>(&format!(
            "INSERT INTO user_api_keys (id, user_id, label, provider, encrypted_key, is_default) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {KEY_COLUMNS}"
        ))
        .bind(new.id)
        .bind(new.user_id)
        .bind(&new.label)
        .bind(&new.provider)
        .bind(&new.encrypted_key)
        .bind(!has_keys)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>, StoreError> {
        let row = sqlx::query_as::<_, KeyRow>(&format!(
            "SELECT {KEY_COLUMNS} FROM user_api_keys WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CredentialRecord::from))
    }

    async fn find_default(&self, user_id: Uuid) -> Result<Option<CredentialRecord>, StoreError> {
        let row = sqlx::query_as::<_, KeyRow>(&format!(
            "SELECT {KEY_COLUMNS} FROM user_api_keys WHERE user_id = $1 AND is_default"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CredentialRecord::from))
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM user_api_keys WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_default(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, user_id).await?;

        let owned = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM user_api_keys WHERE id = $1 AND user_id = $2)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        if !owned {
            // Dropping the transaction rolls back and releases the lock.
            return Ok(false);
        }

        sqlx::query("UPDATE user_api_keys SET is_default = false WHERE user_id = $1 AND is_default")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE user_api_keys SET is_default = true WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
