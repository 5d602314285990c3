// In-memory cluster and repository doubles - record calls, fail on demand

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::external::{ClusterClient, CommandArg, CommandError, ExecTarget, ReleaseSpec};
use crate::store::{AuditLogEntry, InMemoryStoreRepository, NewAuditEntry, RepositoryError, Store, StoreRepository};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    Install { release: String, namespace: String },
    Uninstall { release: String },
    DeleteNamespace { namespace: String },
    /// Exec arguments as they would appear in a trace line
    Exec { workload: String, argv: Vec<String> },
}

#[derive(Debug, Default)]
struct FakeState {
    releases: BTreeSet<String>,
    namespaces: BTreeSet<String>,
    calls: Vec<ClusterCall>,
    installs: Vec<ReleaseSpec>,
    exec_failures_remaining: u32,
    hang_exec: bool,
    install_failure: Option<String>,
    uninstall_failure: Option<String>,
    namespace_failure: Option<String>,
    panic_on_install: BTreeSet<String>,
    exposed_args: HashMap<String, Vec<String>>,
}

/// Cluster double that behaves like an idempotent helm/kubectl pair
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

fn failed(command: &str, message: &str) -> CommandError {
    CommandError::ExecutionFailed {
        command: command.to_string(),
        exit_code: Some(1),
        message: message.to_string(),
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Fail the next `count` exec calls
    pub fn fail_exec_times(&self, count: u32) {
        self.state().exec_failures_remaining = count;
    }

    /// Every exec call blocks forever
    pub fn hang_exec(&self) {
        self.state().hang_exec = true;
    }

    pub fn fail_install(&self, message: &str) {
        self.state().install_failure = Some(message.to_string());
    }

    pub fn fail_uninstall(&self, message: &str) {
        self.state().uninstall_failure = Some(message.to_string());
    }

    pub fn fail_namespace_delete(&self, message: &str) {
        self.state().namespace_failure = Some(message.to_string());
    }

    pub fn panic_on_install(&self, release: &str) {
        self.state().panic_on_install.insert(release.to_string());
    }

    pub fn releases(&self) -> Vec<String> {
        self.state().releases.iter().cloned().collect()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.state().namespaces.iter().cloned().collect()
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.state().calls.clone()
    }

    pub fn installs(&self) -> Vec<ReleaseSpec> {
        self.state().installs.clone()
    }

    pub fn exec_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, ClusterCall::Exec { .. }))
            .count()
    }

    /// Unredacted argv of every exec call for a workload
    pub fn exposed_exec_args(&self, workload: &str) -> Vec<String> {
        self.state().exposed_args.get(workload).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn install_or_upgrade(&self, spec: &ReleaseSpec) -> Result<String, CommandError> {
        let mut state = self.state();
        state.calls.push(ClusterCall::Install {
            release: spec.release.clone(),
            namespace: spec.namespace.clone(),
        });
        state.installs.push(spec.clone());

        if state.panic_on_install.contains(&spec.release) {
            drop(state);
            panic!("chart renderer blew up for {}", spec.release);
        }
        if let Some(message) = &state.install_failure {
            return Err(failed("helm upgrade --install", message));
        }

        let upgraded = !state.releases.insert(spec.release.clone());
        state.namespaces.insert(spec.namespace.clone());
        Ok(if upgraded {
            format!("Release \"{}\" has been upgraded. Happy Helming!", spec.release)
        } else {
            format!("Release \"{}\" does not exist. Installing it now.\nSTATUS: deployed", spec.release)
        })
    }

    async fn uninstall(&self, release: &str, _namespace: &str, _timeout: Duration) -> Result<String, CommandError> {
        let mut state = self.state();
        state.calls.push(ClusterCall::Uninstall {
            release: release.to_string(),
        });
        if let Some(message) = &state.uninstall_failure {
            return Err(failed("helm uninstall", message));
        }
        state.releases.remove(release);
        Ok(format!("release \"{release}\" uninstalled"))
    }

    async fn delete_namespace(&self, namespace: &str, _timeout: Duration) -> Result<String, CommandError> {
        let mut state = self.state();
        state.calls.push(ClusterCall::DeleteNamespace {
            namespace: namespace.to_string(),
        });
        if let Some(message) = &state.namespace_failure {
            return Err(failed("kubectl delete namespace", message));
        }
        state.namespaces.remove(namespace);
        Ok(format!("namespace \"{namespace}\" deleted"))
    }

    async fn exec(&self, target: &ExecTarget, argv: &[CommandArg], timeout: Duration) -> Result<String, CommandError> {
        let hang = {
            let mut state = self.state();
            state.calls.push(ClusterCall::Exec {
                workload: target.workload.clone(),
                argv: argv.iter().map(|arg| arg.to_string()).collect(),
            });
            state
                .exposed_args
                .entry(target.workload.clone())
                .or_default()
                .extend(argv.iter().map(|arg| arg.expose().to_string()));

            if state.exec_failures_remaining > 0 {
                state.exec_failures_remaining -= 1;
                return Err(failed("kubectl exec", "error: pod is not running"));
            }
            state.hang_exec
        };

        if hang {
            tokio::time::sleep(timeout).await;
            return Err(CommandError::Timeout {
                command: "kubectl exec".to_string(),
                timeout,
            });
        }
        Ok("Success".to_string())
    }
}

/// Repository that refuses to write audit entries carrying one event label
///
/// Everything else goes to the wrapped in-memory repository.
pub struct AuditRejectingRepository {
    inner: Arc<InMemoryStoreRepository>,
    rejected_event: String,
}

impl AuditRejectingRepository {
    pub fn new(inner: Arc<InMemoryStoreRepository>, rejected_event: &str) -> Self {
        Self {
            inner,
            rejected_event: rejected_event.to_string(),
        }
    }

    fn check(&self, entry: &NewAuditEntry) -> Result<(), RepositoryError> {
        if entry.event == self.rejected_event {
            return Err(RepositoryError::Corrupt {
                reason: format!("audit log unavailable for '{}'", entry.event),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StoreRepository for AuditRejectingRepository {
    async fn insert(&self, store: &Store) -> Result<(), RepositoryError> {
        self.inner.insert(store).await
    }

    async fn update(&self, store: &Store) -> Result<(), RepositoryError> {
        self.inner.update(store).await
    }

    async fn commit_transition(&self, store: &Store, entry: NewAuditEntry) -> Result<AuditLogEntry, RepositoryError> {
        self.check(&entry)?;
        self.inner.commit_transition(store, entry).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Store>, RepositoryError> {
        self.inner.get(id).await
    }

    async fn find_active_by_name(&self, name: &str) -> Result<Option<Store>, RepositoryError> {
        self.inner.find_active_by_name(name).await
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<Store>, RepositoryError> {
        self.inner.list(include_deleted).await
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, RepositoryError> {
        self.check(&entry)?;
        self.inner.append_audit(entry).await
    }

    async fn audit_trail(&self, store_id: Uuid) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        self.inner.audit_trail(store_id).await
    }
}
