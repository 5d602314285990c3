//! Request-facing store operations
//!
//! What an HTTP handler would call: validate, write the store row, audit it,
//! and enqueue a job carrying only the store id. Errors here are synchronous
//! and reach the caller; nothing touches the cluster.

use rand::distr::{Alphanumeric, SampleString};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditDetails, AuditRecorder};
use crate::jobs::{Job, JobQueue, QueueError};
use crate::lifecycle::{LifecycleEvent, TransitionError};
use crate::store::{
    validate_store_name, AuditLogEntry, RepositoryError, Store, StoreEngine, StoreRepository, StoreStatus,
};

const GENERATED_PASSWORD_LEN: usize = 20;
const DEFAULT_ADMIN_USER: &str = "admin";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Store not found: {0}")]
    NotFound(Uuid),

    #[error("A store named '{0}' already exists")]
    NameConflict(String),

    #[error("Invalid store name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Engine '{0}' is not supported yet")]
    EngineNotSupported(StoreEngine),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Persistence error: {0}")]
    Repository(RepositoryError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict { name } => ServiceError::NameConflict(name),
            other => ServiceError::Repository(other),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateStoreRequest {
    pub name: String,
    pub engine: StoreEngine,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
}

/// Login handed to the creator once; never stored anywhere else in clear
#[derive(Clone)]
pub struct InitialCredentials {
    pub admin_user: String,
    pub admin_password: String,
}

impl fmt::Debug for InitialCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitialCredentials")
            .field("admin_user", &self.admin_user)
            .field("admin_password", &"******")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CreatedStore {
    pub store: Store,
    pub credentials: InitialCredentials,
}

#[derive(Clone)]
pub struct StoreService {
    repository: Arc<dyn StoreRepository>,
    queue: Arc<dyn JobQueue>,
    audit: AuditRecorder,
}

impl StoreService {
    pub fn new(repository: Arc<dyn StoreRepository>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            audit: AuditRecorder::new(repository.clone()),
            repository,
            queue,
        }
    }

    /// Accept a new store in `QUEUED` and enqueue its provisioning job
    pub async fn create_store(&self, request: CreateStoreRequest) -> Result<CreatedStore, ServiceError> {
        let name = request.name.trim().to_string();
        validate_store_name(&name).map_err(|reason| ServiceError::InvalidName {
            name: name.clone(),
            reason,
        })?;
        if !request.engine.is_supported() {
            return Err(ServiceError::EngineNotSupported(request.engine));
        }
        if self.repository.find_active_by_name(&name).await?.is_some() {
            return Err(ServiceError::NameConflict(name));
        }

        let admin_user = request
            .admin_user
            .filter(|user| !user.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ADMIN_USER.to_string());
        let admin_password = request
            .admin_password
            .filter(|password| !password.is_empty())
            .unwrap_or_else(generate_password);

        let store = Store::new(name, request.engine, admin_user.clone(), admin_password.clone());
        // The unique index still guards against a concurrent create with the same name.
        self.repository.insert(&store).await?;
        self.audit
            .record(
                store.id,
                "Store Created",
                Some(
                    AuditDetails::new()
                        .with("name", &store.name)
                        .with("engine", store.engine)
                        .with("admin_user", &store.admin_user),
                ),
            )
            .await?;
        self.queue.enqueue(Job::provision(store.id)).await?;

        info!(store_id = %store.id, name = %store.name, "Store queued for provisioning");
        Ok(CreatedStore {
            store,
            credentials: InitialCredentials {
                admin_user,
                admin_password,
            },
        })
    }

    /// Mark a store `DELETING` and enqueue its teardown
    pub async fn delete_store(&self, id: Uuid) -> Result<Store, ServiceError> {
        let mut store = self.active_store(id).await?;
        let event = LifecycleEvent::RequestDeletion;
        let label = event.audit_label();
        store.apply(event)?;
        self.audit.record_transition(&store, label, None).await?;
        self.queue.enqueue(Job::deprovision(store.id)).await?;

        info!(store_id = %store.id, name = %store.name, "Store queued for deletion");
        Ok(store)
    }

    /// Deleted stores are only returned when `include_deleted` is set
    pub async fn get_store(&self, id: Uuid, include_deleted: bool) -> Result<Store, ServiceError> {
        match self.repository.get(id).await? {
            Some(store) if include_deleted || store.status != StoreStatus::Deleted => Ok(store),
            _ => Err(ServiceError::NotFound(id)),
        }
    }

    pub async fn list_stores(&self, include_deleted: bool) -> Result<Vec<Store>, ServiceError> {
        Ok(self.repository.list(include_deleted).await?)
    }

    /// Full history, newest first; available for deleted stores too
    pub async fn audit_trail(&self, id: Uuid) -> Result<Vec<AuditLogEntry>, ServiceError> {
        if self.repository.get(id).await?.is_none() {
            return Err(ServiceError::NotFound(id));
        }
        Ok(self.repository.audit_trail(id).await?)
    }

    async fn active_store(&self, id: Uuid) -> Result<Store, ServiceError> {
        self.get_store(id, false).await
    }
}

fn generate_password() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), GENERATED_PASSWORD_LEN)
}
