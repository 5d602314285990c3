// Job dispatch loop
//
// Pulls jobs off the queue and runs each in its own task, bounded by a
// semaphore. A job that errors or panics is recorded against its store and
// acknowledged; the loop itself keeps going.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn, Instrument};

use super::{Delivery, Job, JobQueue};
use crate::telemetry::create_job_span;
use crate::workflows::{Orchestrator, WorkflowOutcome};

/// Counters reported when the loop stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub crashed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobResult {
    Completed,
    Failed,
    Skipped,
    Crashed,
}

impl DispatchStats {
    fn record(&mut self, result: Result<JobResult, JoinError>) {
        match result {
            Ok(JobResult::Completed) => self.completed += 1,
            Ok(JobResult::Failed) => self.failed += 1,
            Ok(JobResult::Skipped) => self.skipped += 1,
            Ok(JobResult::Crashed) => self.crashed += 1,
            Err(e) => {
                error!("Job supervisor task failed: {}", e);
                self.crashed += 1;
            }
        }
    }
}

pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    orchestrator: Arc<Orchestrator>,
    concurrency: usize,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        orchestrator: Arc<Orchestrator>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            concurrency: concurrency.max(1),
            poll_interval,
        }
    }

    /// Dispatch jobs until `shutdown` resolves or the queue closes
    ///
    /// In-flight jobs are always drained before returning.
    pub async fn run<F>(&self, shutdown: F) -> DispatchStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight: JoinSet<JobResult> = JoinSet::new();
        let mut stats = DispatchStats::default();

        info!(concurrency = self.concurrency, "Dispatcher started");

        loop {
            while let Some(result) = in_flight.try_join_next() {
                stats.record(result);
            }

            let permit = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting jobs");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting jobs");
                    break;
                }
                next = self.queue.dequeue() => next,
            };

            match next {
                Ok(Some(delivery)) => {
                    stats.dispatched += 1;
                    in_flight.spawn(run_job(
                        self.queue.clone(),
                        self.orchestrator.clone(),
                        delivery,
                        permit,
                    ));
                }
                Ok(None) => {
                    info!("Job queue closed");
                    break;
                }
                Err(e) => {
                    drop(permit);
                    error!("Failed to read from job queue: {}", e);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(in_flight = in_flight.len(), "Waiting for in-flight jobs");
        }
        while let Some(result) = in_flight.join_next().await {
            stats.record(result);
        }

        info!(
            dispatched = stats.dispatched,
            completed = stats.completed,
            failed = stats.failed,
            skipped = stats.skipped,
            crashed = stats.crashed,
            "Dispatcher stopped"
        );
        stats
    }
}

async fn run_job(
    queue: Arc<dyn JobQueue>,
    orchestrator: Arc<Orchestrator>,
    delivery: Delivery,
    _permit: OwnedSemaphorePermit,
) -> JobResult {
    let span = create_job_span(&delivery.job, delivery.receipt);
    async move {
        let job = delivery.job;
        let worker = orchestrator.clone();
        // Separate task so a panic in the workflow surfaces as a JoinError here.
        let handle = tokio::spawn(async move { worker.handle(&job).await }.in_current_span());

        let result = match handle.await {
            Ok(Ok(outcome)) => {
                info!(outcome = ?outcome, "Job finished");
                match outcome {
                    WorkflowOutcome::Completed { .. } => JobResult::Completed,
                    WorkflowOutcome::Failed { .. } => JobResult::Failed,
                    WorkflowOutcome::Skipped { .. } | WorkflowOutcome::StoreMissing => JobResult::Skipped,
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Job aborted");
                record_crash(&orchestrator, &job, &e.to_string()).await;
                JobResult::Crashed
            }
            Err(e) => {
                let reason = crash_reason(e);
                error!(error = %reason, "Job crashed");
                record_crash(&orchestrator, &job, &reason).await;
                JobResult::Crashed
            }
        };

        if let Err(e) = queue.ack(delivery.receipt).await {
            warn!(error = %e, "Failed to acknowledge job; it may be delivered again");
        }
        result
    }
    .instrument(span)
    .await
}

async fn record_crash(orchestrator: &Orchestrator, job: &Job, reason: &str) {
    if let Err(e) = orchestrator.mark_crashed(job, reason).await {
        error!(error = %e, "Could not record crashed job against its store");
    }
}

fn crash_reason(err: JoinError) -> String {
    if err.is_panic() {
        format!("workflow panicked: {}", panic_message(err.into_panic()))
    } else {
        err.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
