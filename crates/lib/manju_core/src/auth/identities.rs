//! Identity directory: lookup-or-create keyed by email.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{Identity, IdentityStatus, NewIdentity, ProviderProfile};
use crate::store::IdentityRepo;

#[derive(Clone)]
pub struct IdentityDirectory {
    repo: Arc<dyn IdentityRepo>,
}

impl IdentityDirectory {
    pub fn new(repo: Arc<dyn IdentityRepo>) -> Self {
        Self { repo }
    }

    pub async fn find(&self, id: Uuid) -> Result<Identity, AuthError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("user {id}")))
    }

    /// Find the identity owning the profile's email, creating an active one
    /// on first sight. Returns the identity and whether it was created.
    ///
    /// Concurrent first logins for one email converge on a single identity;
    /// the store's unique email index decides the winner.
    pub async fn resolve(&self, profile: &ProviderProfile) -> Result<(Identity, bool), AuthError> {
        let email = profile.email.trim();
        if email.is_empty() {
            return Err(AuthError::ValidationError(
                "identity provider returned no email".into(),
            ));
        }

        if let Some(existing) = self.repo.find_by_email(email).await? {
            return Ok((existing, false));
        }

        let (identity, created) = self
            .repo
            .insert_or_fetch(NewIdentity {
                email: email.to_string(),
                name: profile.display_name(),
                profile: profile.clone(),
                status: IdentityStatus::Active,
            })
            .await?;

        if created {
            info!(user_id = %identity.id, "identity created on first login");
        }
        Ok((identity, created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn profile(email: &str) -> ProviderProfile {
        ProviderProfile {
            email: email.to_string(),
            name: Some("Ada Lovelace".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_resolve_creates_active_identity() {
        let dir = IdentityDirectory::new(Arc::new(MemoryStore::new()));
        let (identity, created) = dir.resolve(&profile("ada@example.com")).await.unwrap();
        assert!(created);
        assert!(identity.is_active());
        assert_eq!(identity.name, "Ada Lovelace");
        assert_eq!(identity.profile.unwrap().email, "ada@example.com");
    }

    #[tokio::test]
    async fn resolve_reuses_identity_case_insensitively() {
        let dir = IdentityDirectory::new(Arc::new(MemoryStore::new()));
        let (first, _) = dir.resolve(&profile("ada@example.com")).await.unwrap();
        let (second, created) = dir.resolve(&profile("ADA@Example.com")).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(dir.find(first.id).await.unwrap().email, "ada@example.com");
    }

    #[tokio::test]
    async fn empty_email_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let dir = IdentityDirectory::new(store.clone());
        let err = dir.resolve(&profile("  ")).await.unwrap_err();
        assert!(matches!(err, AuthError::ValidationError(_)));
        assert_eq!(store.identity_count(), 0);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let dir = IdentityDirectory::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            dir.find(Uuid::new_v4()).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_logins_converge() {
        let store = Arc::new(MemoryStore::new());
        let dir = IdentityDirectory::new(store.clone());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let dir = dir.clone();
                tokio::spawn(async move { dir.resolve(&profile("race@example.com")).await })
            })
            .collect();

        let mut ids = Vec::new();
        let mut created = 0;
        for handle in handles {
            let (identity, was_created) = handle.await.unwrap().unwrap();
            ids.push(identity.id);
            created += usize::from(was_created);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(created, 1);
        assert_eq!(store.identity_count(), 1);
    }
}
