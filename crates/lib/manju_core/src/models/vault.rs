//! Credential vault models.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Vaulted API key row as stored. `encrypted_key` is cipher output only.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub provider: String,
    pub encrypted_key: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for storing a new key. The default flag is decided by the store.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub provider: String,
    pub encrypted_key: String,
}

/// Credential as returned to its owner: masked, never the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub provider: String,
    pub masked_key: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn from_record(record: CredentialRecord, masked_key: String) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            label: record.label,
            provider: record.provider,
            masked_key,
            is_default: record.is_default,
            created_at: record.created_at,
        }
    }
}
