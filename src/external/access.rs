//! Cluster access resolution
//!
//! Access to the cluster is decided once at startup from an ordered list of
//! strategies. The first strategy whose preconditions hold wins; the result
//! is handed to the cluster client and never re-probed mid-workflow.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::ConfigError;

/// Mounted service-account token checked by the in-cluster strategy
pub const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// One way of reaching the cluster API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KubeAccessStrategy {
    /// Kubeconfig file; `None` means `$KUBECONFIG`, then `~/.kube/config`
    Kubeconfig {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Service account mounted into the worker pod
    InCluster,
}

/// The resolved access mode handed to `helm` and `kubectl`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterAccess {
    Kubeconfig(PathBuf),
    InCluster,
}

impl ClusterAccess {
    /// Flags prepended to every helm/kubectl invocation
    pub fn flags(&self) -> Vec<String> {
        match self {
            ClusterAccess::Kubeconfig(path) => {
                vec!["--kubeconfig".to_string(), path.display().to_string()]
            }
            ClusterAccess::InCluster => Vec::new(),
        }
    }
}

/// Resolve against the real process environment and filesystem
pub fn resolve_cluster_access(strategies: &[KubeAccessStrategy]) -> Result<ClusterAccess, ConfigError> {
    resolve_with(strategies, |key| std::env::var(key).ok(), |path| path.is_file())
}

/// Resolve with injectable environment and filesystem probes
pub fn resolve_with<E, F>(
    strategies: &[KubeAccessStrategy],
    env: E,
    exists: F,
) -> Result<ClusterAccess, ConfigError>
where
    E: Fn(&str) -> Option<String>,
    F: Fn(&Path) -> bool,
{
    if strategies.is_empty() {
        return Err(ConfigError::ClusterAccess {
            reason: "no cluster access strategies configured".to_string(),
        });
    }

    let mut rejected = Vec::new();
    for strategy in strategies {
        match strategy {
            KubeAccessStrategy::Kubeconfig { path } => {
                let candidate = path
                    .clone()
                    .or_else(|| env("KUBECONFIG").filter(|v| !v.is_empty()).map(PathBuf::from))
                    .or_else(|| env("HOME").map(|home| PathBuf::from(home).join(".kube").join("config")));

                match candidate {
                    Some(candidate) if exists(&candidate) => {
                        info!(kubeconfig = %candidate.display(), "Using kubeconfig cluster access");
                        return Ok(ClusterAccess::Kubeconfig(candidate));
                    }
                    Some(candidate) => {
                        debug!(kubeconfig = %candidate.display(), "Kubeconfig not present");
                        rejected.push(format!("kubeconfig {} not found", candidate.display()));
                    }
                    None => rejected.push("no kubeconfig path could be determined".to_string()),
                }
            }
            KubeAccessStrategy::InCluster => {
                let has_host = env("KUBERNETES_SERVICE_HOST").is_some_and(|v| !v.is_empty());
                if has_host && exists(Path::new(SERVICE_ACCOUNT_TOKEN)) {
                    info!("Using in-cluster service account access");
                    return Ok(ClusterAccess::InCluster);
                }
                rejected.push("not running inside a cluster".to_string());
            }
        }
    }

    Err(ConfigError::ClusterAccess {
        reason: rejected.join("; "),
    })
}
