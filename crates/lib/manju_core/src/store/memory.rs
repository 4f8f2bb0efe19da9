//! In-memory store backed by `DashMap`.
//!
//! Per-identity atomicity comes from holding the identity's map entry for
//! the whole read-modify-write. Data does not survive a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::{CredentialRepo, IdentityRepo, SessionRepo, StoreError};
use crate::models::auth::{Identity, IdentityStatus, NewIdentity, SessionRecord};
use crate::models::vault::{CredentialRecord, NewCredential};

#[derive(Default)]
pub struct MemoryStore {
    identities: DashMap<Uuid, Identity>,
    /// Lowercased email → identity id.
    emails: DashMap<String, Uuid>,
    /// Token hash → session.
    sessions: DashMap<String, SessionRecord>,
    /// Owner → credentials in insertion order.
    credentials: DashMap<Uuid, Vec<CredentialRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change an identity's lifecycle status. Returns false if unknown.
    pub fn set_status(&self, id: Uuid, status: IdentityStatus) -> bool {
        match self.identities.get_mut(&id) {
            Some(mut identity) => {
                identity.status = status;
                identity.updated_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl IdentityRepo for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.identities.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let Some(id) = self.emails.get(&email_key(email)).map(|r| *r.value()) else {
            return Ok(None);
        };
        IdentityRepo::find_by_id(self, id).await
    }

    async fn insert_or_fetch(&self, new: NewIdentity) -> Result<(Identity, bool), StoreError> {
        match self.emails.entry(email_key(&new.email)) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                let identity = self
                    .identities
                    .get(&id)
                    .map(|r| r.value().clone())
                    .ok_or_else(|| StoreError::Corrupt(format!("email index points at {id}")))?;
                Ok((identity, false))
            }
            Entry::Vacant(entry) => {
                let identity = Identity {
                    id: Uuid::new_v4(),
                    email: new.email,
                    name: new.name,
                    profile: Some(new.profile),
                    status: new.status,
                    created_at: Utc::now(),
                    updated_at: None,
                };
                self.identities.insert(identity.id, identity.clone());
                entry.insert(identity.id);
                Ok((identity, true))
            }
        }
    }
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn insert(&self, record: SessionRecord) -> Result<(), StoreError> {
        self.sessions.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.sessions.get(token_hash).map(|r| r.value().clone()))
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64, StoreError> {
        Ok(self.sessions.remove(token_hash).map_or(0, |_| 1))
    }

    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut removed = 0u64;
        self.sessions.retain(|_, record| {
            let keep = match record.expires_at {
                Some(expires_at) => expires_at > now,
                None => record.created_at > created_before,
            };
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[async_trait]
impl CredentialRepo for MemoryStore {
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<CredentialRecord>, StoreError> {
        Ok(self
            .credentials
            .get(&user_id)
            .map(|keys| keys.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, new: NewCredential) -> Result<CredentialRecord, StoreError> {
        if !self.identities.contains_key(&new.user_id) {
            return Err(StoreError::NotFound(format!("user {}", new.user_id)));
        }
        let mut keys = self.credentials.entry(new.user_id).or_default();
        let record = CredentialRecord {
            id: new.id,
            user_id: new.user_id,
            label: new.label,
            provider: new.provider,
            encrypted_key: new.encrypted_key,
            is_default: keys.is_empty(),
            created_at: Utc::now(),
        };
        keys.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self
            .credentials
            .iter()
            .find_map(|keys| keys.value().iter().find(|k| k.id == id).cloned()))
    }

    async fn find_default(&self, user_id: Uuid) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self
            .credentials
            .get(&user_id)
            .and_then(|keys| keys.iter().find(|k| k.is_default).cloned()))
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<u64, StoreError> {
        let Some(mut keys) = self.credentials.get_mut(&user_id) else {
            return Ok(0);
        };
        let before = keys.len();
        keys.retain(|k| k.id != id);
        Ok((before - keys.len()) as u64)
    }

    async fn set_default(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let Some(mut keys) = self.credentials.get_mut(&user_id) else {
            return Ok(false);
        };
        if !keys.iter().any(|k| k.id == id) {
            return Ok(false);
        }
        for key in keys.iter_mut() {
            key.is_default = key.id == id;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::models::auth::ProviderProfile;

    fn new_identity(email: &str) -> NewIdentity {
        NewIdentity {
            email: email.to_string(),
            name: "Test".to_string(),
            profile: ProviderProfile {
                email: email.to_string(),
                ..Default::default()
            },
            status: IdentityStatus::Active,
        }
    }

    fn new_credential(user_id: Uuid, label: &str) -> NewCredential {
        NewCredential {
            id: Uuid::now_v7(),
            user_id,
            label: label.to_string(),
            provider: "openai".to_string(),
            encrypted_key: "00".to_string(),
        }
    }

    async fn user(store: &MemoryStore) -> Uuid {
        store
            .insert_or_fetch(new_identity("owner@example.com"))
            .await
            .unwrap()
            .0
            .id
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let store = MemoryStore::new();
        let (created, was_created) = store
            .insert_or_fetch(new_identity("Ada@Example.com"))
            .await
            .unwrap();
        assert!(was_created);

        let (again, was_created) = store
            .insert_or_fetch(new_identity("ada@example.COM"))
            .await
            .unwrap();
        assert!(!was_created);
        assert_eq!(created.id, again.id);

        let found = store.find_by_email("ADA@EXAMPLE.COM").await.unwrap();
        assert_eq!(found.map(|i| i.id), Some(created.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_logins_create_one_identity() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .insert_or_fetch(new_identity("race@example.com"))
                    .await
                    .unwrap()
            }));
        }
        let mut created = 0;
        let mut ids = Vec::new();
        for h in handles {
            let (identity, was_created) = h.await.unwrap();
            if was_created {
                created += 1;
            }
            ids.push(identity.id);
        }
        assert_eq!(created, 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.identity_count(), 1);
    }

    #[tokio::test]
    async fn first_credential_is_default_only() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;
        let first = CredentialRepo::insert(&store, new_credential(user_id, "a"))
            .await
            .unwrap();
        let second = CredentialRepo::insert(&store, new_credential(user_id, "b"))
            .await
            .unwrap();
        assert!(first.is_default);
        assert!(!second.is_default);

        let listed = store.list_by_user(user_id).await.unwrap();
        assert_eq!(listed[0].id, second.id, "newest first");
    }

    #[tokio::test]
    async fn insert_for_unknown_user_fails() {
        let store = MemoryStore::new();
        let err = CredentialRepo::insert(&store, new_credential(Uuid::new_v4(), "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_scoped_by_owner() {
        let store = MemoryStore::new();
        let owner = user(&store).await;
        let (other, _) = store
            .insert_or_fetch(new_identity("other@example.com"))
            .await
            .unwrap();
        let key = CredentialRepo::insert(&store, new_credential(owner, "a"))
            .await
            .unwrap();

        assert_eq!(store.delete(other.id, key.id).await.unwrap(), 0);
        assert!(CredentialRepo::find_by_id(&store, key.id).await.unwrap().is_some());
        assert_eq!(store.delete(owner, key.id).await.unwrap(), 1);
        assert_eq!(store.delete(owner, key.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_default_on_foreign_key_changes_nothing() {
        let store = MemoryStore::new();
        let owner = user(&store).await;
        let (other, _) = store
            .insert_or_fetch(new_identity("other@example.com"))
            .await
            .unwrap();
        let mine = CredentialRepo::insert(&store, new_credential(owner, "a"))
            .await
            .unwrap();
        let theirs = CredentialRepo::insert(&store, new_credential(other.id, "b"))
            .await
            .unwrap();

        assert!(!store.set_default(owner, theirs.id).await.unwrap());
        let default = store.find_default(owner).await.unwrap().unwrap();
        assert_eq!(default.id, mine.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_set_default_leaves_exactly_one() {
        let store = Arc::new(MemoryStore::new());
        let owner = user(&store).await;
        let mut ids = Vec::new();
        for i in 0..6 {
            let key = CredentialRepo::insert(&*store, new_credential(owner, &format!("k{i}")))
                .await
                .unwrap();
            ids.push(key.id);
        }

        for _ in 0..20 {
            let mut handles = Vec::new();
            for id in &ids {
                let store = Arc::clone(&store);
                let id = *id;
                handles.push(tokio::spawn(
                    async move { store.set_default(owner, id).await },
                ));
            }
            for h in handles {
                assert!(h.await.unwrap().unwrap());
            }
            let defaults = store
                .list_by_user(owner)
                .await
                .unwrap()
                .into_iter()
                .filter(|k| k.is_default)
                .count();
            assert_eq!(defaults, 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_inserts_make_one_default() {
        let store = Arc::new(MemoryStore::new());
        let owner = user(&store).await;
        let mut handles = Vec::new();
        for i in 0..12 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                CredentialRepo::insert(&*store, new_credential(owner, &format!("k{i}"))).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let keys = store.list_by_user(owner).await.unwrap();
        assert_eq!(keys.len(), 12);
        assert_eq!(keys.iter().filter(|k| k.is_default).count(), 1);
    }

    #[tokio::test]
    async fn delete_expired_sessions() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let record = |hash: &str, expires_at, created_at| SessionRecord {
            token_hash: hash.to_string(),
            user_id: Uuid::new_v4(),
            refresh_token_enc: None,
            expires_at,
            created_at,
        };
        SessionRepo::insert(&store, record("live", Some(now + Duration::hours(1)), now))
            .await
            .unwrap();
        SessionRepo::insert(&store, record("dead", Some(now - Duration::hours(1)), now))
            .await
            .unwrap();
        SessionRepo::insert(&store, record("old", None, now - Duration::days(9)))
            .await
            .unwrap();
        SessionRepo::insert(&store, record("young", None, now - Duration::days(1)))
            .await
            .unwrap();

        let removed = store
            .delete_expired(now, now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.find_by_hash("live").await.unwrap().is_some());
        assert!(store.find_by_hash("young").await.unwrap().is_some());
        assert!(store.find_by_hash("dead").await.unwrap().is_none());
    }
}
