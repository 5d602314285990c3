// Fixed-interval retry with an optional overall deadline

use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::debug;

use super::StepError;
use crate::config::ProvisioningConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one
    pub delay: Duration,
    /// Abandon the whole loop once this much time has passed
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &ProvisioningConfig) -> Self {
        Self {
            max_attempts: config.configure_attempts.max(1),
            delay: config.configure_delay(),
            deadline: config.configure_deadline(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
            deadline: None,
        }
    }
}

/// Run `action` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is used up
///
/// `action` receives the 1-based attempt number. Each attempt starts from
/// scratch; nothing is carried over from a failed one.
pub async fn retry_fixed<A, Fut, T>(policy: &RetryPolicy, mut action: A) -> Result<T, StepError>
where
    A: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StepError>>,
{
    let strategy = FixedInterval::new(policy.delay).take(policy.max_attempts.saturating_sub(1) as usize);
    let mut attempt = 0u32;

    let attempts = RetryIf::spawn(
        strategy,
        || {
            attempt += 1;
            debug!(attempt, max_attempts = policy.max_attempts, "Starting attempt");
            action(attempt)
        },
        StepError::is_retryable,
    );

    match policy.deadline {
        Some(deadline) => tokio::time::timeout(deadline, attempts)
            .await
            .map_err(|_| StepError::DeadlineExceeded { deadline })?,
        None => attempts.await,
    }
}
