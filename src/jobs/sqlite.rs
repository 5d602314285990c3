// SQLite-backed JobQueue shared by every worker pointed at the same database

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Delivery, Job, JobQueue, QueueError};
use crate::database::encode_timestamp;

pub struct SqliteJobQueue {
    pool: SqlitePool,
    worker_id: String,
    poll_interval: Duration,
    visibility_timeout: Duration,
}

impl SqliteJobQueue {
    pub fn new(pool: SqlitePool, poll_interval: Duration, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            worker_id: worker_identity(),
            poll_interval,
            visibility_timeout,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Hand claims older than the visibility timeout back to the pending pool
    pub async fn requeue_stale(&self) -> Result<u64, QueueError> {
        let visibility =
            chrono::Duration::from_std(self.visibility_timeout).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now()
            .checked_sub_signed(visibility)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let requeued = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', claimed_at = NULL, claimed_by = NULL
            WHERE state = 'claimed' AND claimed_at < ?1
            "#,
        )
        .bind(encode_timestamp(cutoff))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if requeued > 0 {
            info!(requeued, "Requeued jobs whose claim expired");
        }
        Ok(requeued)
    }

    /// Claim the oldest pending job, if any
    pub async fn try_claim(&self) -> Result<Option<Delivery>, QueueError> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'claimed', claimed_at = ?1, claimed_by = ?2
            WHERE id = (SELECT id FROM jobs WHERE state = 'pending' ORDER BY id LIMIT 1)
            RETURNING id, store_id, kind
            "#,
        )
        .bind(encode_timestamp(Utc::now()))
        .bind(&self.worker_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let receipt: i64 = row.try_get("id")?;
        let store_id: String = row.try_get("store_id")?;
        let kind: String = row.try_get("kind")?;
        let job = Job {
            store_id: Uuid::parse_str(&store_id).map_err(|e| QueueError::Corrupt {
                reason: format!("job {receipt}: bad store id '{store_id}': {e}"),
            })?,
            kind: kind.parse().map_err(|reason| QueueError::Corrupt {
                reason: format!("job {receipt}: {reason}"),
            })?,
        };

        debug!(receipt, store_id = %job.store_id, kind = %job.kind, "Claimed job");
        Ok(Some(Delivery { receipt, job }))
    }

    /// Jobs not yet acknowledged
    pub async fn outstanding(&self) -> Result<i64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// `hostname-pid`, recorded on every claim
fn worker_identity() -> String {
    let host = hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown-host".to_string());
    format!("{host}-{}", std::process::id())
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO jobs (store_id, kind, state, enqueued_at) VALUES (?1, ?2, 'pending', ?3)")
            .bind(job.store_id.to_string())
            .bind(job.kind.as_str())
            .bind(encode_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Polls until a job is claimable; never reports the queue as closed
    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        loop {
            self.requeue_stale().await?;
            if let Some(delivery) = self.try_claim().await? {
                return Ok(Some(delivery));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn ack(&self, receipt: i64) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(receipt)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
