// Deprovisioning workflow: DELETING -> DELETED | FAILED

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{truncate_output, Orchestrator, StepError, WorkflowError, WorkflowOutcome};
use crate::audit::AuditDetails;
use crate::lifecycle::LifecycleEvent;
use crate::store::{tombstone_name, ClusterNames, Store, StoreStatus};

impl Orchestrator {
    /// Tear down a store's cluster resources, then soft-delete the record
    ///
    /// The name is only freed once both the release and the namespace are gone.
    pub async fn deprovision(&self, store_id: Uuid) -> Result<WorkflowOutcome, WorkflowError> {
        let Some(mut store) = self.repository.get(store_id).await? else {
            warn!(store_id = %store_id, "Deprovisioning job for unknown store ignored");
            return Ok(WorkflowOutcome::StoreMissing);
        };

        if store.status != StoreStatus::Deleting {
            info!(store_id = %store_id, status = %store.status, "Store not marked for deletion, skipping");
            self.audit
                .record(
                    store_id,
                    "Deletion Skipped",
                    Some(AuditDetails::new().with("status", store.status)),
                )
                .await?;
            return Ok(WorkflowOutcome::Skipped { status: store.status });
        }

        info!(store_id = %store_id, name = %store.name, "Deprovisioning store");
        self.audit.record(store_id, "Deletion Started", None).await?;

        let result = match self.teardown_steps(&store).await {
            Ok(()) => {
                let deleted_at = Utc::now();
                let details = AuditDetails::new().with("renamed_to", tombstone_name(&store.name, deleted_at));
                self.transition(&mut store, LifecycleEvent::DeletionSucceeded { deleted_at }, Some(details))
                    .await
                    .map(|_| ())
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                info!(store_id = %store_id, renamed_to = %store.name, "Store deleted");
                Ok(WorkflowOutcome::Completed { status: store.status })
            }
            Err(err) => self.fail(&mut store, LifecycleEvent::DeletionFailed, err).await,
        }
    }

    async fn teardown_steps(&self, store: &Store) -> Result<(), StepError> {
        let names = ClusterNames::derive(&store.name, &self.settings.domain_suffix);
        let timeout = self.settings.teardown_timeout;

        self.audit
            .record(
                store.id,
                "Uninstalling Chart",
                Some(AuditDetails::new().with("release", &names.release)),
            )
            .await?;
        let output = self
            .cluster
            .uninstall(&names.release, &names.namespace, timeout)
            .await?;
        self.audit
            .record(
                store.id,
                "Chart Uninstalled",
                Some(AuditDetails::new().with("output", truncate_output(&output, self.settings.output_capture_limit))),
            )
            .await?;

        self.audit
            .record(
                store.id,
                "Deleting Namespace",
                Some(AuditDetails::new().with("namespace", &names.namespace)),
            )
            .await?;
        self.cluster.delete_namespace(&names.namespace, timeout).await?;
        self.audit.record(store.id, "Namespace Deleted", None).await?;

        Ok(())
    }
}
