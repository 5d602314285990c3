//! Job queue and dispatch
//!
//! A job names a store and the workflow to run for it, nothing more; the
//! worker always reloads fresh store state. Delivery is at-least-once, so
//! every workflow must tolerate seeing the same job twice.

pub mod dispatcher;
#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use dispatcher::{DispatchStats, Dispatcher};
#[cfg(feature = "database")]
pub use sqlite::SqliteJobQueue;

/// Which workflow a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Provision,
    Deprovision,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Provision => "provision",
            JobKind::Deprovision => "deprovision",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provision" => Ok(JobKind::Provision),
            "deprovision" => Ok(JobKind::Deprovision),
            other => Err(format!("unknown job kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub store_id: Uuid,
    pub kind: JobKind,
}

impl Job {
    pub fn provision(store_id: Uuid) -> Self {
        Self {
            store_id,
            kind: JobKind::Provision,
        }
    }

    pub fn deprovision(store_id: Uuid) -> Self {
        Self {
            store_id,
            kind: JobKind::Deprovision,
        }
    }
}

/// A claimed job plus the handle used to acknowledge it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub receipt: i64,
    pub job: Job,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job queue is closed")]
    Closed,

    #[error("Corrupt job record: {reason}")]
    Corrupt { reason: String },

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Transport for job descriptors
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;

    /// Wait for the next job; `None` once the queue is closed and drained
    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError>;

    /// Mark a delivered job as done so it is not handed out again
    async fn ack(&self, receipt: i64) -> Result<(), QueueError>;
}

/// Channel-backed queue for a single process
pub struct InMemoryJobQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>,
    next_receipt: AtomicI64,
    acked: AtomicU64,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            next_receipt: AtomicI64::new(1),
            acked: AtomicU64::new(0),
        }
    }

    /// Stop accepting jobs; already queued jobs are still delivered
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    /// Number of acks received so far
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let sender = self.sender.lock().map_err(|_| QueueError::Closed)?;
        match sender.as_ref() {
            Some(sender) => sender.send(job).map_err(|_| QueueError::Closed),
            None => Err(QueueError::Closed),
        }
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let mut receiver = self.receiver.lock().await;
        Ok(receiver.recv().await.map(|job| Delivery {
            receipt: self.next_receipt.fetch_add(1, Ordering::SeqCst),
            job,
        }))
    }

    async fn ack(&self, _receipt: i64) -> Result<(), QueueError> {
        // Delivered jobs already left the channel; there is nothing to release.
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
