//! Per-identity vault of third-party API keys.
//!
//! Secrets are encrypted with [`CredentialCipher`] before they reach the
//! store and are only ever returned masked. The plaintext leaves this module
//! through [`CredentialVault::get_decrypted`], for server-side callers that
//! must present the key to an outbound request.

pub mod cipher;

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::vault::{Credential, CredentialRecord, NewCredential};
use crate::store::{CredentialRepo, StoreError};

pub use cipher::{CipherError, CredentialCipher, EncryptionKey, MASK_SENTINEL, mask};

/// Label given to keys submitted without one.
pub const DEFAULT_LABEL: &str = "Default Key";

/// Vault errors.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for VaultError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => VaultError::NotFound(what),
            other => VaultError::Store(other),
        }
    }
}

/// A key submission. Blank label/provider fall back to defaults.
#[derive(Debug, Clone, Default)]
pub struct AddCredential {
    pub label: Option<String>,
    pub provider: Option<String>,
    pub secret: String,
}

#[derive(Clone)]
pub struct CredentialVault {
    repo: Arc<dyn CredentialRepo>,
    cipher: CredentialCipher,
    default_provider: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CredentialVault {
    pub fn new(
        repo: Arc<dyn CredentialRepo>,
        cipher: CredentialCipher,
        default_provider: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            cipher,
            default_provider: default_provider.into(),
        }
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Mask a stored key. A key that fails to decrypt shows as the sentinel
    /// so one corrupt row does not hide the rest.
    fn masked(&self, record: &CredentialRecord) -> String {
        match self.cipher.decrypt(&record.encrypted_key) {
            Ok(plaintext) => mask(&plaintext),
            Err(e) => {
                error!(
                    credential_id = %record.id,
                    user_id = %record.user_id,
                    error = %e,
                    "stored API key failed to decrypt"
                );
                MASK_SENTINEL.to_string()
            }
        }
    }

    /// All keys of `user_id`, newest first, masked.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Credential>, VaultError> {
        let records = self.repo.list_by_user(user_id).await?;
        Ok(records
            .into_iter()
            .map(|record| {
                let masked = self.masked(&record);
                Credential::from_record(record, masked)
            })
            .collect())
    }

    /// Encrypt and store a key. The identity's first key becomes its default.
    pub async fn add(&self, user_id: Uuid, req: AddCredential) -> Result<Credential, VaultError> {
        let secret = req.secret.trim();
        if secret.is_empty() {
            return Err(VaultError::Validation("api_key is required".into()));
        }

        let label = non_blank(req.label).unwrap_or_else(|| DEFAULT_LABEL.to_string());
        let provider = non_blank(req.provider).unwrap_or_else(|| self.default_provider.clone());
        let encrypted_key = self.cipher.encrypt(secret)?;

        let record = self
            .repo
            .insert(NewCredential {
                id: Uuid::now_v7(),
                user_id,
                label,
                provider,
                encrypted_key,
            })
            .await?;

        info!(
            %user_id,
            credential_id = %record.id,
            provider = %record.provider,
            is_default = record.is_default,
            "API key added"
        );
        Ok(Credential::from_record(record, mask(secret)))
    }

    /// Delete scoped by owner. Unknown or foreign ids are a no-op; returns
    /// rows affected. No other key is promoted to default.
    pub async fn delete(&self, user_id: Uuid, credential_id: Uuid) -> Result<u64, VaultError> {
        let removed = self.repo.delete(user_id, credential_id).await?;
        info!(%user_id, %credential_id, removed, "API key delete");
        Ok(removed)
    }

    pub async fn set_default(&self, user_id: Uuid, credential_id: Uuid) -> Result<(), VaultError> {
        if !self.repo.set_default(user_id, credential_id).await? {
            return Err(VaultError::NotFound(format!("API key {credential_id}")));
        }
        info!(%user_id, %credential_id, "default API key changed");
        Ok(())
    }

    pub async fn get_default(&self, user_id: Uuid) -> Result<Credential, VaultError> {
        let record = self
            .repo
            .find_default(user_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("default API key".into()))?;
        let masked = self.masked(&record);
        Ok(Credential::from_record(record, masked))
    }

    /// Plaintext of a stored key. Server-side use only; never return this
    /// across the request boundary.
    pub async fn get_decrypted(&self, credential_id: Uuid) -> Result<String, VaultError> {
        let record = self
            .repo
            .find_by_id(credential_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("API key {credential_id}")))?;
        self.cipher.decrypt(&record.encrypted_key).map_err(|e| {
            error!(%credential_id, error = %e, "API key failed to decrypt");
            VaultError::Cipher(e)
        })
    }
}
