// Persistence interface for stores and audit entries

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{AuditLogEntry, NewAuditEntry, Store, StoreStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("An active store named '{name}' already exists")]
    Conflict { name: String },

    #[error("Store {id} does not exist")]
    Missing { id: Uuid },

    #[error("Stored row is corrupt: {reason}")]
    Corrupt { reason: String },

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Row storage consumed by the orchestrator and the request layer
///
/// `update` persists the orchestrator-owned fields (`name`, `status`, `url`);
/// everything else is immutable after `insert`.
#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn insert(&self, store: &Store) -> Result<(), RepositoryError>;

    async fn update(&self, store: &Store) -> Result<(), RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Store>, RepositoryError>;

    /// Lookup restricted to stores that are not `DELETED`
    async fn find_active_by_name(&self, name: &str) -> Result<Option<Store>, RepositoryError>;

    async fn list(&self, include_deleted: bool) -> Result<Vec<Store>, RepositoryError>;

    /// Persist `store` and its audit entry together; neither is written if either fails
    async fn commit_transition(&self, store: &Store, entry: NewAuditEntry) -> Result<AuditLogEntry, RepositoryError>;

    /// Append-only; persisted before returning
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, RepositoryError>;

    /// Newest first, insertion order breaking timestamp ties
    async fn audit_trail(&self, store_id: Uuid) -> Result<Vec<AuditLogEntry>, RepositoryError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    stores: HashMap<Uuid, Store>,
    audit: Vec<AuditLogEntry>,
    next_audit_id: i64,
}

/// Process-local repository for tests and single-process embedding
#[derive(Debug, Default)]
pub struct InMemoryStoreRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryStoreRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryState {
    fn push_audit(&mut self, entry: NewAuditEntry) -> AuditLogEntry {
        self.next_audit_id += 1;
        let stored = AuditLogEntry {
            id: self.next_audit_id,
            store_id: entry.store_id,
            event: entry.event,
            details: entry.details,
            timestamp: entry.timestamp,
        };
        self.audit.push(stored.clone());
        stored
    }

    fn write_store(&mut self, store: &Store) -> Result<(), RepositoryError> {
        if name_taken(self, store) {
            return Err(RepositoryError::Conflict {
                name: store.name.clone(),
            });
        }
        let existing = self
            .stores
            .get_mut(&store.id)
            .ok_or(RepositoryError::Missing { id: store.id })?;
        existing.name = store.name.clone();
        existing.status = store.status;
        existing.url = store.url.clone();
        Ok(())
    }
}

fn name_taken(state: &MemoryState, store: &Store) -> bool {
    store.status != StoreStatus::Deleted
        && state
            .stores
            .values()
            .any(|other| other.id != store.id && !other.is_deleted() && other.name == store.name)
}

#[async_trait]
impl StoreRepository for InMemoryStoreRepository {
    async fn insert(&self, store: &Store) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if name_taken(&state, store) {
            return Err(RepositoryError::Conflict {
                name: store.name.clone(),
            });
        }
        state.stores.insert(store.id, store.clone());
        Ok(())
    }

    async fn update(&self, store: &Store) -> Result<(), RepositoryError> {
        self.state.write().await.write_store(store)
    }

    async fn commit_transition(&self, store: &Store, entry: NewAuditEntry) -> Result<AuditLogEntry, RepositoryError> {
        let mut state = self.state.write().await;
        state.write_store(store)?;
        Ok(state.push_audit(entry))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Store>, RepositoryError> {
        Ok(self.state.read().await.stores.get(&id).cloned())
    }

    async fn find_active_by_name(&self, name: &str) -> Result<Option<Store>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .stores
            .values()
            .find(|store| !store.is_deleted() && store.name == name)
            .cloned())
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<Store>, RepositoryError> {
        let mut stores: Vec<Store> = self
            .state
            .read()
            .await
            .stores
            .values()
            .filter(|store| include_deleted || !store.is_deleted())
            .cloned()
            .collect();
        stores.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(stores)
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, RepositoryError> {
        Ok(self.state.write().await.push_audit(entry))
    }

    async fn audit_trail(&self, store_id: Uuid) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        let mut entries: Vec<AuditLogEntry> = self
            .state
            .read()
            .await
            .audit
            .iter()
            .filter(|entry| entry.store_id == store_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::StoreEngine;
    use chrono::Utc;

    fn audit(store_id: Uuid, event: &str) -> NewAuditEntry {
        NewAuditEntry {
            store_id,
            event: event.to_string(),
            details: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_active_name_conflict() {
        let repo = InMemoryStoreRepository::new();
        repo.insert(&Store::new("acme", StoreEngine::Woocommerce, "admin", "pw"))
            .await
            .unwrap();

        let err = repo
            .insert(&Store::new("acme", StoreEngine::Woocommerce, "admin", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_deleted_stores_hidden_from_active_lookup() {
        let repo = InMemoryStoreRepository::new();
        let mut store = Store::new("acme", StoreEngine::Woocommerce, "admin", "pw");
        repo.insert(&store).await.unwrap();

        store.status = StoreStatus::Deleted;
        repo.update(&store).await.unwrap();

        assert!(repo.find_active_by_name("acme").await.unwrap().is_none());
        assert!(repo.list(false).await.unwrap().is_empty());
        assert_eq!(repo.list(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_touches_only_owned_fields() {
        let repo = InMemoryStoreRepository::new();
        let store = Store::new("acme", StoreEngine::Woocommerce, "admin", "pw");
        repo.insert(&store).await.unwrap();

        let mut changed = store.clone();
        changed.status = StoreStatus::Ready;
        changed.url = Some("http://acme.test".to_string());
        changed.admin_password = "rotated".to_string();
        repo.update(&changed).await.unwrap();

        let loaded = repo.get(store.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StoreStatus::Ready);
        assert_eq!(loaded.url.as_deref(), Some("http://acme.test"));
        assert_eq!(loaded.admin_password, "pw");
    }

    #[tokio::test]
    async fn test_rejected_transition_commit_writes_no_audit_entry() {
        let repo = InMemoryStoreRepository::new();
        let missing = Store::new("ghost", StoreEngine::Woocommerce, "admin", "pw");

        let err = repo
            .commit_transition(&missing, audit(missing.id, "Provisioning Started"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Missing { .. }));
        assert!(repo.audit_trail(missing.id).await.unwrap().is_empty());

        let mut store = Store::new("acme", StoreEngine::Woocommerce, "admin", "pw");
        repo.insert(&store).await.unwrap();
        store.status = StoreStatus::Provisioning;
        let entry = repo
            .commit_transition(&store, audit(store.id, "Provisioning Started"))
            .await
            .unwrap();
        assert_eq!(entry.event, "Provisioning Started");
        assert_eq!(repo.get(store.id).await.unwrap().unwrap().status, StoreStatus::Provisioning);
    }

    #[tokio::test]
    async fn test_audit_trail_newest_first_with_insertion_tiebreak() {
        let repo = InMemoryStoreRepository::new();
        let store_id = Uuid::new_v4();
        let at = Utc::now();

        for event in ["first", "second", "third"] {
            let mut entry = audit(store_id, event);
            entry.timestamp = at;
            repo.append_audit(entry).await.unwrap();
        }
        repo.append_audit(audit(Uuid::new_v4(), "other store")).await.unwrap();

        let events: Vec<String> = repo
            .audit_trail(store_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert_eq!(events, vec!["third", "second", "first"]);
    }
}
