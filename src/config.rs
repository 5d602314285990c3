use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::external::KubeAccessStrategy;
use crate::workflows::WorkflowSettings;

const DEFAULT_FILE: &str = "storefleet.toml";
const ENV_PREFIX: &str = "STOREFLEET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to read .env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Configuration file not found: {0}")]
    MissingFile(PathBuf),

    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("No usable cluster access: {reason}")]
    ClusterAccess { reason: String },
}

/// Main configuration structure for the orchestrator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    pub cluster: ClusterConfig,
    pub provisioning: ProvisioningConfig,
    pub worker: WorkerConfig,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// `helm` binary, resolved on PATH when not absolute
    pub helm_path: String,
    /// `kubectl` binary, resolved on PATH when not absolute
    pub kubectl_path: String,
    /// Access strategies tried in order; the first applicable one wins
    pub access: Vec<KubeAccessStrategy>,
    /// Chart installed for every store
    pub chart_path: PathBuf,
    /// Directory holding `values-<environment>.yaml` overlays
    pub values_dir: PathBuf,
    pub environment: String,
    /// Store hostnames are `<name>.<domain_suffix>`
    pub domain_suffix: String,
    pub protocol: String,
    pub install_timeout_seconds: u64,
    pub teardown_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvisioningConfig {
    /// Total attempts for in-container configuration, first one included
    pub configure_attempts: u32,
    pub configure_delay_seconds: u64,
    /// Timeout for each `kubectl exec` call
    pub configure_command_timeout_seconds: u64,
    /// Overall budget for the configuration step, retries included
    pub configure_deadline_seconds: Option<u64>,
    /// Container carrying the `wp` CLI
    pub container: String,
    /// Prepended to the release name to address the workload, e.g. `deploy/`
    pub workload_prefix: String,
    pub admin_email: String,
    /// Max characters of installer output kept in the completion audit
    pub output_capture_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Jobs run at the same time by one worker
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    /// Claimed jobs not acked within this window are handed out again
    pub visibility_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig {
                helm_path: "helm".to_string(),
                kubectl_path: "kubectl".to_string(),
                access: vec![KubeAccessStrategy::Kubeconfig { path: None }, KubeAccessStrategy::InCluster],
                chart_path: PathBuf::from("./charts/woocommerce"),
                values_dir: PathBuf::from("./charts/woocommerce"),
                environment: "local".to_string(),
                domain_suffix: "127.0.0.1.nip.io".to_string(),
                protocol: "http".to_string(),
                install_timeout_seconds: 300,
                teardown_timeout_seconds: 120,
            },
            provisioning: ProvisioningConfig {
                configure_attempts: 5,
                configure_delay_seconds: 5,
                configure_command_timeout_seconds: 60,
                configure_deadline_seconds: None,
                container: "wp-cli".to_string(),
                workload_prefix: "deploy/".to_string(),
                admin_email: "admin@example.com".to_string(),
                output_capture_limit: 500,
            },
            worker: WorkerConfig {
                concurrency: 4,
                poll_interval_ms: 1000,
                visibility_timeout_seconds: 1800,
            },
            database: DatabaseConfig {
                url: "sqlite://storefleet.db".to_string(),
                max_connections: 5,
                auto_migrate: true,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
        }
    }
}

impl ClusterConfig {
    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_seconds)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_seconds)
    }

    /// Overlay file for the configured environment
    pub fn values_overlay(&self) -> PathBuf {
        self.values_dir.join(format!("values-{}.yaml", self.environment))
    }
}

impl ProvisioningConfig {
    pub fn configure_delay(&self) -> Duration {
        Duration::from_secs(self.configure_delay_seconds)
    }

    pub fn configure_command_timeout(&self) -> Duration {
        Duration::from_secs(self.configure_command_timeout_seconds)
    }

    pub fn configure_deadline(&self) -> Option<Duration> {
        self.configure_deadline_seconds.map(Duration::from_secs)
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

impl OrchestratorConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `storefleet.toml` in the working directory, if present
    /// 3. An explicit file passed by the caller
    /// 4. Environment variables (`STOREFLEET__SECTION__KEY`)
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new(DEFAULT_FILE).exists() {
            builder = builder.add_source(File::with_name(DEFAULT_FILE));
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: OrchestratorConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the orchestrator cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "worker.concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.provisioning.configure_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "provisioning.configure_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cluster.environment.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "cluster.environment",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cluster.access.is_empty() {
            return Err(ConfigError::Invalid {
                field: "cluster.access",
                reason: "at least one access strategy is required".to_string(),
            });
        }
        let budget = WorkflowSettings::from_config(self).worst_case_job_duration();
        if self.worker.visibility_timeout() <= budget {
            return Err(ConfigError::Invalid {
                field: "worker.visibility_timeout_seconds",
                reason: format!(
                    "must exceed the worst-case job duration of {}s, or running jobs are redelivered",
                    budget.as_secs()
                ),
            });
        }
        Ok(())
    }

    /// Resolved configuration as TOML
    ///
    /// Nothing here is secret today; store credentials live only on store rows.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<(), ConfigError> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
