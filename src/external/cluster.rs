//! Cluster tooling adapter
//!
//! [`ClusterClient`] is the capability injected into the workflows.
//! [`CliClusterClient`] implements it by shelling out to `helm` and
//! `kubectl` through a [`CommandRunner`].

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::access::ClusterAccess;
use super::command::{CommandArg, CommandError, CommandRunner, Invocation};

/// A `--set key=value` override passed to the chart installer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueOverride {
    pub key: String,
    pub value: String,
    pub secret: bool,
}

impl ValueOverride {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            secret: false,
        }
    }

    pub fn secret(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            secret: true,
        }
    }

    fn to_arg(&self) -> CommandArg {
        let pair = format!("{}={}", self.key, self.value);
        if self.secret {
            CommandArg::Secret(pair)
        } else {
            CommandArg::Plain(pair)
        }
    }
}

/// Everything the installer needs for one install-or-upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSpec {
    pub release: String,
    pub namespace: String,
    pub chart: PathBuf,
    pub values_overlay: PathBuf,
    pub overrides: Vec<ValueOverride>,
    /// Bound on the installer's own wait-for-ready
    pub timeout: Duration,
}

/// Named container inside a workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    pub namespace: String,
    /// Workload reference understood by `kubectl exec`, e.g. `deploy/store-acme`
    pub workload: String,
    pub container: String,
}

/// Cluster operations used by the provisioning workflows
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Idempotent apply; rolls back on failure and waits for readiness
    async fn install_or_upgrade(&self, spec: &ReleaseSpec) -> Result<String, CommandError>;

    /// Remove a release and wait for its resources to go away
    async fn uninstall(&self, release: &str, namespace: &str, timeout: Duration) -> Result<String, CommandError>;

    /// Delete a namespace and everything scoped to it
    async fn delete_namespace(&self, namespace: &str, timeout: Duration) -> Result<String, CommandError>;

    /// Run an argument vector inside a named container
    async fn exec(&self, target: &ExecTarget, argv: &[CommandArg], timeout: Duration) -> Result<String, CommandError>;
}

/// `helm` + `kubectl` implementation
pub struct CliClusterClient {
    runner: Arc<dyn CommandRunner>,
    helm: String,
    kubectl: String,
    access: ClusterAccess,
}

impl CliClusterClient {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        helm: impl Into<String>,
        kubectl: impl Into<String>,
        access: ClusterAccess,
    ) -> Self {
        Self {
            runner,
            helm: helm.into(),
            kubectl: kubectl.into(),
            access,
        }
    }

    fn helm(&self, timeout: Duration) -> Invocation {
        Invocation::new(&self.helm, timeout).args(self.access.flags())
    }

    fn kubectl(&self, timeout: Duration) -> Invocation {
        Invocation::new(&self.kubectl, timeout).args(self.access.flags())
    }
}

/// Go-style duration accepted by `helm --timeout`
fn helm_duration(duration: Duration) -> String {
    format!("{}s", duration.as_secs().max(1))
}

/// Extra time the `helm` process gets past its own `--timeout` to roll back
pub const HELM_ROLLBACK_HEADROOM: Duration = Duration::from_secs(60);

pub(crate) fn process_deadline(timeout: Duration) -> Duration {
    timeout.saturating_add(HELM_ROLLBACK_HEADROOM)
}

#[async_trait]
impl ClusterClient for CliClusterClient {
    async fn install_or_upgrade(&self, spec: &ReleaseSpec) -> Result<String, CommandError> {
        let mut invocation = self
            .helm(process_deadline(spec.timeout))
            .args(["upgrade", "--install"])
            .arg(spec.release.as_str())
            .arg(spec.chart.display().to_string())
            .args(["--namespace", spec.namespace.as_str(), "--create-namespace"])
            .arg("--values")
            .arg(spec.values_overlay.display().to_string());

        for value in &spec.overrides {
            invocation = invocation.arg("--set").arg(value.to_arg());
        }

        let invocation = invocation
            .args(["--atomic", "--wait", "--timeout"])
            .arg(helm_duration(spec.timeout));

        self.runner.run(&invocation).await
    }

    async fn uninstall(&self, release: &str, namespace: &str, timeout: Duration) -> Result<String, CommandError> {
        let invocation = self
            .helm(process_deadline(timeout))
            .arg("uninstall")
            .arg(release)
            .args(["--namespace", namespace, "--wait", "--ignore-not-found", "--timeout"])
            .arg(helm_duration(timeout));

        self.runner.run(&invocation).await
    }

    async fn delete_namespace(&self, namespace: &str, timeout: Duration) -> Result<String, CommandError> {
        let invocation = self
            .kubectl(timeout)
            .args(["delete", "namespace", namespace, "--ignore-not-found", "--wait=true"]);

        self.runner.run(&invocation).await
    }

    async fn exec(&self, target: &ExecTarget, argv: &[CommandArg], timeout: Duration) -> Result<String, CommandError> {
        let invocation = self
            .kubectl(timeout)
            .args(["exec", "--namespace", target.namespace.as_str()])
            .arg(target.workload.as_str())
            .args(["--container", target.container.as_str(), "--"])
            .args(argv.iter().cloned());

        self.runner.run(&invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::command::MockCommandRunner;

    fn rendered(invocation: &Invocation) -> Vec<String> {
        invocation.args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_process_deadline_saturates() {
        assert_eq!(process_deadline(Duration::from_secs(300)), Duration::from_secs(360));
        assert_eq!(process_deadline(Duration::MAX), Duration::MAX);
    }

    #[tokio::test]
    async fn test_install_or_upgrade_builds_atomic_helm_call() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv: &Invocation| {
                let args = rendered(inv);
                inv.program == "helm"
                    && args[..4] == ["--kubeconfig", "/kube/config", "upgrade", "--install"]
                    && args.contains(&"store-acme".to_string())
                    && args.contains(&"--atomic".to_string())
                    && args.contains(&"--wait".to_string())
                    && args.contains(&"300s".to_string())
                    && args.contains(&"ingress.host=acme.example.test".to_string())
                    && args.contains(&"******".to_string())
                    && !inv.display().contains("pw123")
            })
            .times(1)
            .returning(|_| Ok("Release \"store-acme\" has been upgraded".to_string()));

        let client = CliClusterClient::new(
            Arc::new(runner),
            "helm",
            "kubectl",
            ClusterAccess::Kubeconfig(PathBuf::from("/kube/config")),
        );

        let spec = ReleaseSpec {
            release: "store-acme".to_string(),
            namespace: "store-acme".to_string(),
            chart: PathBuf::from("./charts/woocommerce"),
            values_overlay: PathBuf::from("./charts/woocommerce/values-local.yaml"),
            overrides: vec![
                ValueOverride::new("ingress.host", "acme.example.test"),
                ValueOverride::secret("store.adminPassword", "pw123"),
            ],
            timeout: Duration::from_secs(300),
        };

        let output = client.install_or_upgrade(&spec).await.unwrap();
        assert!(output.contains("upgraded"));
    }

    #[tokio::test]
    async fn test_exec_targets_named_container() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv: &Invocation| {
                rendered(inv)
                    == [
                        "exec",
                        "--namespace",
                        "store-acme",
                        "deploy/store-acme",
                        "--container",
                        "wp-cli",
                        "--",
                        "wp",
                        "plugin",
                        "activate",
                        "woocommerce",
                    ]
            })
            .times(1)
            .returning(|_| Ok(String::new()));

        let client = CliClusterClient::new(Arc::new(runner), "helm", "kubectl", ClusterAccess::InCluster);
        let target = ExecTarget {
            namespace: "store-acme".to_string(),
            workload: "deploy/store-acme".to_string(),
            container: "wp-cli".to_string(),
        };
        let argv: Vec<CommandArg> = ["wp", "plugin", "activate", "woocommerce"]
            .into_iter()
            .map(CommandArg::from)
            .collect();

        client.exec(&target, &argv, Duration::from_secs(60)).await.unwrap();
    }

    #[tokio::test]
    async fn test_teardown_commands_tolerate_missing_resources() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv: &Invocation| inv.program == "helm" && rendered(inv).contains(&"--ignore-not-found".to_string()))
            .times(1)
            .returning(|_| Ok("release \"store-acme\" uninstalled".to_string()));
        runner
            .expect_run()
            .withf(|inv: &Invocation| inv.program == "kubectl" && rendered(inv).contains(&"--ignore-not-found".to_string()))
            .times(1)
            .returning(|_| Ok("namespace \"store-acme\" deleted".to_string()));

        let client = CliClusterClient::new(Arc::new(runner), "helm", "kubectl", ClusterAccess::InCluster);

        client.uninstall("store-acme", "store-acme", Duration::from_secs(120)).await.unwrap();
        client.delete_namespace("store-acme", Duration::from_secs(120)).await.unwrap();
    }

    #[tokio::test]
    async fn test_runner_errors_propagate_unchanged() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|inv| {
            Err(CommandError::Timeout {
                command: inv.display(),
                timeout: inv.timeout,
            })
        });

        let client = CliClusterClient::new(Arc::new(runner), "helm", "kubectl", ClusterAccess::InCluster);
        let err = client
            .delete_namespace("store-acme", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }
}
