use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::jobs::Job;

/// Initialize structured logging on stderr, keeping stdout for command output
///
/// `RUST_LOG` wins over the configured level when set. Safe to call more
/// than once; later calls leave the first subscriber in place.
pub fn init_telemetry(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = if config.json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(json = config.json_logs, level = %config.log_level, "Telemetry initialized");
    }
}

/// Span wrapping one job from dequeue to ack
pub fn create_job_span(job: &Job, receipt: i64) -> tracing::Span {
    tracing::info_span!(
        "store_job",
        job.kind = job.kind.as_str(),
        store.id = %job.store_id,
        job.receipt = receipt,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_init_twice_does_not_panic() {
        let config = ObservabilityConfig {
            log_level: "debug".to_string(),
            json_logs: true,
        };
        init_telemetry(&config);
        init_telemetry(&config);
    }

    #[test]
    fn test_job_span_is_named() {
        let span = create_job_span(&Job::provision(Uuid::new_v4()), 7);
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "store_job");
        }
    }
}
