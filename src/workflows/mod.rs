// Store workflows
//
// Provisioning and deprovisioning run as ordered, audited steps against the
// cluster. Step errors never escape a workflow: they become a terminal
// transition plus an audit entry carrying the error text.

pub mod deprovision;
pub mod provision;
pub mod retry;

#[cfg(test)]
pub mod mocks;


use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditDetails, AuditRecorder};
use crate::config::OrchestratorConfig;
use crate::external::{ClusterClient, CommandError, HELM_ROLLBACK_HEADROOM};
use crate::jobs::{Job, JobKind};
use crate::lifecycle::{LifecycleEvent, Transition, TransitionError};
use crate::store::{RepositoryError, Store, StoreRepository, StoreStatus};

pub use retry::{retry_fixed, RetryPolicy};

/// Failure of a single workflow step
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Persistence error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Deadline of {}s exceeded", .deadline.as_secs())]
    DeadlineExceeded { deadline: Duration },
}

impl StepError {
    /// Only external command failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Command(_))
    }
}

/// Errors that could not be turned into a terminal store state
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Persistence error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error("Could not record terminal state for store {store_id}: {source}")]
    Terminal {
        store_id: Uuid,
        #[source]
        source: StepError,
    },
}

/// How a workflow run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Completed { status: StoreStatus },
    Failed { error: String },
    /// The store was not in a state this workflow acts on
    Skipped { status: StoreStatus },
    StoreMissing,
}

/// Knobs the workflows read, resolved once from configuration
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub chart_path: PathBuf,
    pub values_overlay: PathBuf,
    pub domain_suffix: String,
    pub protocol: String,
    pub install_timeout: Duration,
    pub teardown_timeout: Duration,
    pub configure_retry: RetryPolicy,
    pub configure_command_timeout: Duration,
    pub container: String,
    pub workload_prefix: String,
    pub admin_email: String,
    pub output_capture_limit: usize,
}

impl WorkflowSettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let cluster = &config.cluster;
        let provisioning = &config.provisioning;
        Self {
            chart_path: cluster.chart_path.clone(),
            values_overlay: cluster.values_overlay(),
            domain_suffix: cluster.domain_suffix.clone(),
            protocol: cluster.protocol.clone(),
            install_timeout: cluster.install_timeout(),
            teardown_timeout: cluster.teardown_timeout(),
            configure_retry: RetryPolicy::from_config(provisioning),
            configure_command_timeout: provisioning.configure_command_timeout(),
            container: provisioning.container.clone(),
            workload_prefix: provisioning.workload_prefix.clone(),
            admin_email: provisioning.admin_email.clone(),
            output_capture_limit: provisioning.output_capture_limit,
        }
    }

    /// Longest a single job can run before every step has hit its timeout
    ///
    /// A queue claim must outlive this, or a healthy job is handed to a
    /// second worker while the first is still running it.
    pub fn worst_case_job_duration(&self) -> Duration {
        let install = self.install_timeout.saturating_add(HELM_ROLLBACK_HEADROOM);
        let policy = &self.configure_retry;
        let per_attempt = self
            .configure_command_timeout
            .saturating_mul(provision::STOREFRONT_SETUP_COMMANDS);
        let retry_loop = per_attempt
            .saturating_mul(policy.max_attempts)
            .saturating_add(policy.delay.saturating_mul(policy.max_attempts.saturating_sub(1)));
        let configure = policy.deadline.map_or(retry_loop, |deadline| deadline.min(retry_loop));
        let provisioning = install.saturating_add(configure);

        let deprovisioning = self
            .teardown_timeout
            .saturating_add(HELM_ROLLBACK_HEADROOM)
            .saturating_add(self.teardown_timeout);

        provisioning.max(deprovisioning)
    }
}

/// Runs store workflows against injected persistence and cluster handles
#[derive(Clone)]
pub struct Orchestrator {
    repository: Arc<dyn StoreRepository>,
    cluster: Arc<dyn ClusterClient>,
    audit: AuditRecorder,
    settings: WorkflowSettings,
}

impl Orchestrator {
    pub fn new(
        repository: Arc<dyn StoreRepository>,
        cluster: Arc<dyn ClusterClient>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            audit: AuditRecorder::new(repository.clone()),
            repository,
            cluster,
            settings,
        }
    }

    /// Route a job to its workflow
    pub async fn handle(&self, job: &Job) -> Result<WorkflowOutcome, WorkflowError> {
        match job.kind {
            JobKind::Provision => self.provision(job.store_id).await,
            JobKind::Deprovision => self.deprovision(job.store_id).await,
        }
    }

    /// Record a crashed job and fail the store where a failure edge exists
    pub async fn mark_crashed(&self, job: &Job, reason: &str) -> Result<(), WorkflowError> {
        let Some(mut store) = self.repository.get(job.store_id).await? else {
            warn!(store_id = %job.store_id, "Crashed job references a missing store");
            return Ok(());
        };

        self.audit
            .record(
                store.id,
                "Job Crashed",
                Some(AuditDetails::new().with("job", job.kind.as_str()).with("error", reason)),
            )
            .await?;

        if let Some(event) = store.failure_event() {
            self.transition(&mut store, event, Some(AuditDetails::new().with("error", reason)))
                .await?;
        }
        Ok(())
    }

    /// Apply `event` and persist the new state together with its audit entry
    ///
    /// `store` is only updated once both are saved.
    async fn transition(
        &self,
        store: &mut Store,
        event: LifecycleEvent,
        details: Option<AuditDetails>,
    ) -> Result<Transition, StepError> {
        let label = event.audit_label();
        let mut next = store.clone();
        let transition = next.apply(event)?;
        self.audit.record_transition(&next, label, details).await?;
        *store = next;

        info!(store_id = %store.id, from = %transition.from, to = %transition.to, "Store status changed");
        Ok(transition)
    }

    /// Convert a step error into the terminal failure state
    async fn fail(
        &self,
        store: &mut Store,
        event: LifecycleEvent,
        cause: StepError,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let message = cause.to_string();
        error!(store_id = %store.id, error = %message, "Workflow failed");

        let details = AuditDetails::new().with("error", &message);
        if let Err(source) = self.transition(store, event, Some(details)).await {
            error!(store_id = %store.id, error = %source, "Could not record workflow failure");
            return Err(WorkflowError::Terminal {
                store_id: store.id,
                source,
            });
        }
        Ok(WorkflowOutcome::Failed { error: message })
    }
}

/// Keep at most `limit` characters of command output
pub(crate) fn truncate_output(output: &str, limit: usize) -> String {
    output.chars().take(limit).collect()
}
