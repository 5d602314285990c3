// storefleet - job-driven lifecycle orchestration for tenant storefronts
// This exposes the core components for the binary, tests and integration

pub mod audit;
#[cfg(feature = "database")]
pub mod cli;
pub mod config;
#[cfg(feature = "database")]
pub mod database;
pub mod external;
pub mod jobs;
pub mod lifecycle;
pub mod service;
pub mod shutdown;
pub mod store;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use audit::{AuditDetails, AuditRecorder};
pub use config::{ConfigError, OrchestratorConfig};
#[cfg(feature = "database")]
pub use database::DatabaseManager;
pub use external::{
    resolve_cluster_access, CliClusterClient, ClusterAccess, ClusterClient, CommandArg, CommandError, CommandRunner,
    ExecTarget, Invocation, KubeAccessStrategy, ProcessCommandRunner, ReleaseSpec,
};
pub use jobs::{Delivery, DispatchStats, Dispatcher, InMemoryJobQueue, Job, JobKind, JobQueue, QueueError};
pub use lifecycle::{LifecycleEvent, Transition, TransitionError};
pub use service::{CreateStoreRequest, CreatedStore, InitialCredentials, ServiceError, StoreService};
pub use shutdown::shutdown_signal;
pub use store::{AuditLogEntry, InMemoryStoreRepository, RepositoryError, Store, StoreEngine, StoreRepository, StoreStatus};
pub use telemetry::{create_job_span, init_telemetry};
pub use workflows::{Orchestrator, RetryPolicy, StepError, WorkflowError, WorkflowOutcome, WorkflowSettings};
