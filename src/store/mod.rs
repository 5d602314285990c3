// Store records, their audit trail, and the persistence seam

pub mod naming;
pub mod repository;
#[cfg(feature = "database")]
pub mod sqlite;
pub mod types;

pub use naming::{tombstone_name, validate_store_name, ClusterNames};
pub use repository::{InMemoryStoreRepository, RepositoryError, StoreRepository};
#[cfg(feature = "database")]
pub use sqlite::SqliteStoreRepository;
pub use types::{AuditLogEntry, NewAuditEntry, Store, StoreEngine, StoreStatus};
