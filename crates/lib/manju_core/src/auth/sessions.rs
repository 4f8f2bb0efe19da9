//! Server-side session store.
//!
//! The cookie carries an opaque id; the store keeps only its SHA-256 digest.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{Session, SessionRecord};
use crate::store::SessionRepo;
use crate::vault::CredentialCipher;

/// Random bytes in a session id.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Default validity window.
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// Shortest period between reaper sweeps.
pub const MIN_REAPER_PERIOD: std::time::Duration = std::time::Duration::from_millis(1);

/// Longest validity window a store accepts; larger TTLs are clamped.
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;

/// Generate an opaque session id (URL-safe base64, no padding).
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest of a session id, as stored.
pub fn hash_session_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepo>,
    cipher: CredentialCipher,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepo>, cipher: CredentialCipher, ttl: Duration) -> Self {
        let ttl = ttl.min(Duration::days(MAX_SESSION_TTL_DAYS));
        Self { repo, cipher, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a session. Without an explicit `expires_at` the session expires
    /// one TTL from now.
    pub async fn create(
        &self,
        user_id: Uuid,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Session, AuthError> {
        let id = generate_session_token();
        let created_at = Utc::now();
        let expires_at = match expires_at {
            Some(at) => at,
            None => created_at
                .checked_add_signed(self.ttl)
                .ok_or_else(|| AuthError::Internal("session expiry out of range".into()))?,
        };
        let refresh_token = refresh_token.filter(|t| !t.is_empty());
        let refresh_token_enc = refresh_token
            .map(|t| self.cipher.encrypt(t))
            .transpose()?;

        self.repo
            .insert(SessionRecord {
                token_hash: hash_session_token(&id),
                user_id,
                refresh_token_enc,
                expires_at: Some(expires_at),
                created_at,
            })
            .await?;

        debug!(%user_id, %expires_at, "session created");
        Ok(Session {
            id,
            user_id,
            refresh_token: refresh_token.map(str::to_string),
            expires_at: Some(expires_at),
            created_at,
        })
    }

    /// Look up a session by its opaque id. Expiry is not checked here.
    pub async fn get(&self, session_id: &str) -> Result<Session, AuthError> {
        if session_id.is_empty() {
            return Err(AuthError::NotFound("session".into()));
        }
        let record = self
            .repo
            .find_by_hash(&hash_session_token(session_id))
            .await?
            .ok_or_else(|| AuthError::NotFound("session".into()))?;

        let refresh_token = match record.refresh_token_enc.as_deref() {
            None | Some("") => None,
            Some(enc) => match self.cipher.decrypt(enc) {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!(user_id = %record.user_id, error = %e, "session refresh token failed to decrypt");
                    None
                }
            },
        };

        Ok(Session {
            id: session_id.to_string(),
            user_id: record.user_id,
            refresh_token,
            expires_at: record.expires_at,
            created_at: record.created_at,
        })
    }

    /// Fetch a session and fail unless it is still live. An expired session
    /// is deleted on the way out.
    pub async fn validate(&self, session_id: &str) -> Result<Session, AuthError> {
        let session = match self.get(session_id).await {
            Ok(session) => session,
            Err(AuthError::NotFound(_)) => {
                return Err(AuthError::Unauthorized("invalid session".into()));
            }
            Err(e) => return Err(e),
        };

        if session.is_expired(Utc::now(), self.ttl) {
            if let Err(e) = self.delete(session_id).await {
                warn!(user_id = %session.user_id, error = %e, "failed to delete expired session");
            }
            return Err(AuthError::Unauthorized("session expired".into()));
        }
        Ok(session)
    }

    /// Idempotent.
    pub async fn delete(&self, session_id: &str) -> Result<(), AuthError> {
        if session_id.is_empty() {
            return Ok(());
        }
        let removed = self
            .repo
            .delete_by_hash(&hash_session_token(session_id))
            .await?;
        debug!(removed, "session deleted");
        Ok(())
    }

    /// Delete every expired session. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        let now = Utc::now();
        let created_before = now
            .checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.repo.delete_expired(now, created_before).await?;
        if removed > 0 {
            info!(removed, "purged expired sessions");
        }
        Ok(removed)
    }

    /// Run [`purge_expired`](Self::purge_expired) every `every` until
    /// `cancel` fires. A zero period is raised to [`MIN_REAPER_PERIOD`].
    pub fn spawn_reaper(&self, every: std::time::Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let sessions = self.clone();
        let every = every.max(MIN_REAPER_PERIOD);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = sessions.purge_expired().await {
                            error!(error = %e, "session purge failed");
                        }
                    }
                }
            }
            debug!("session reaper stopped");
        })
    }
}
