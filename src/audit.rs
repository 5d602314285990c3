//! Audit recorder
//!
//! Appends an immutable `(event, details)` record for a store and persists it
//! right away, so the trail shows what was attempted even when the enclosing
//! workflow later fails.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::store::{AuditLogEntry, NewAuditEntry, RepositoryError, Store, StoreRepository};

/// Open key/value details attached to an audit event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditDetails {
    fields: Map<String, Value>,
}

impl AuditDetails {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field; a value that cannot be serialized is kept as its `Debug` text
    pub fn with<V>(mut self, key: impl Into<String>, value: V) -> Self
    where
        V: Serialize + Debug,
    {
        let value = serde_json::to_value(&value).unwrap_or_else(|_| Value::String(format!("{value:?}")));
        self.fields.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Display string persisted with the entry
    pub fn render(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_else(|_| format!("{:?}", self.fields))
    }
}

/// Render optional details; absent details become an empty string
pub fn render_details(details: Option<&AuditDetails>) -> String {
    details.map(AuditDetails::render).unwrap_or_default()
}

#[derive(Clone)]
pub struct AuditRecorder {
    repository: Arc<dyn StoreRepository>,
}

impl AuditRecorder {
    pub fn new(repository: Arc<dyn StoreRepository>) -> Self {
        Self { repository }
    }

    pub async fn record(
        &self,
        store_id: Uuid,
        event: &str,
        details: Option<AuditDetails>,
    ) -> Result<AuditLogEntry, RepositoryError> {
        self.append(store_id, event, render_details(details.as_ref())).await
    }

    /// Persist a store state change together with its audit entry
    pub async fn record_transition(
        &self,
        store: &Store,
        event: &str,
        details: Option<AuditDetails>,
    ) -> Result<AuditLogEntry, RepositoryError> {
        info!(store_id = %store.id, event = event, status = %store.status, "Audit");
        self.repository
            .commit_transition(store, new_entry(store.id, event, render_details(details.as_ref())))
            .await
    }

    async fn append(&self, store_id: Uuid, event: &str, details: String) -> Result<AuditLogEntry, RepositoryError> {
        // Details may carry installer output; only the label goes to the log.
        info!(store_id = %store_id, event = event, "Audit");
        self.repository.append_audit(new_entry(store_id, event, details)).await
    }
}

fn new_entry(store_id: Uuid, event: &str, details: String) -> NewAuditEntry {
    NewAuditEntry {
        store_id,
        event: event.to_string(),
        details,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStoreRepository;
    use serde::ser::Error as _;
    use std::collections::HashMap;

    #[derive(Debug)]
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("cannot serialize"))
        }
    }

    #[test]
    fn test_absent_details_render_empty() {
        assert_eq!(render_details(None), "");
    }

    #[test]
    fn test_details_render_as_json() {
        let details = AuditDetails::new().with("release", "store-acme").with("attempt", 2);
        assert_eq!(details.render(), r#"{"attempt":2,"release":"store-acme"}"#);
    }

    #[test]
    fn test_unserializable_value_degrades_to_debug() {
        let details = AuditDetails::new().with("payload", Unserializable);
        assert_eq!(details.get("payload"), Some(&Value::String("Unserializable".to_string())));
    }

    #[test]
    fn test_non_string_map_keys_degrade_to_debug() {
        let mut weird: HashMap<(u8, u8), &str> = HashMap::new();
        weird.insert((1, 2), "x");
        let details = AuditDetails::new().with("pairs", weird);
        assert!(details.render().contains("(1, 2)"));
    }

    #[tokio::test]
    async fn test_record_persists_immediately() {
        let repo = Arc::new(InMemoryStoreRepository::new());
        let recorder = AuditRecorder::new(repo.clone());
        let store_id = Uuid::new_v4();

        recorder.record(store_id, "Provisioning Started", None).await.unwrap();
        recorder
            .record(store_id, "Installing Chart", Some(AuditDetails::new().with("release", "store-acme")))
            .await
            .unwrap();

        let trail = repo.audit_trail(store_id).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].event, "Installing Chart");
        assert_eq!(trail[0].details, r#"{"release":"store-acme"}"#);
        assert_eq!(trail[1].details, "");
    }
}
