use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use super::AppContext;
use crate::external::{resolve_cluster_access, CliClusterClient, ProcessCommandRunner};
use crate::jobs::Dispatcher;
use crate::shutdown::shutdown_signal;
use crate::workflows::{Orchestrator, WorkflowSettings};

pub struct WorkerCommand;

impl WorkerCommand {
    pub async fn execute(&self, context: &AppContext) -> Result<()> {
        let config = &context.config;

        // Decided once; the workflows never probe for access themselves.
        let access = resolve_cluster_access(&config.cluster.access)?;
        info!(access = ?access, "Resolved cluster access");

        let cluster = Arc::new(CliClusterClient::new(
            Arc::new(ProcessCommandRunner),
            &config.cluster.helm_path,
            &config.cluster.kubectl_path,
            access,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            context.repository.clone(),
            cluster,
            WorkflowSettings::from_config(config),
        ));
        let dispatcher = Dispatcher::new(
            context.queue.clone(),
            orchestrator,
            config.worker.concurrency,
            config.worker.poll_interval(),
        );

        info!(worker_id = context.queue.worker_id(), "Worker started");
        let stats = dispatcher.run(shutdown_signal()).await;

        println!(
            "Worker stopped: {} dispatched, {} completed, {} failed, {} skipped, {} crashed",
            stats.dispatched, stats.completed, stats.failed, stats.skipped, stats.crashed
        );
        Ok(())
    }
}
