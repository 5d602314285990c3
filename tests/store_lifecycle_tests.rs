// End-to-end store lifecycle through the public API: service -> queue -> dispatcher -> workflows

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use storefleet::{
    ClusterClient, CommandArg, CommandError, CreateStoreRequest, Dispatcher, ExecTarget, InMemoryJobQueue,
    InMemoryStoreRepository, Job, JobQueue, Orchestrator, ReleaseSpec, RetryPolicy, StoreService, StoreStatus, WorkflowSettings,
};

/// Minimal idempotent cluster: tracks live releases, can fail teardown
#[derive(Default)]
struct LocalCluster {
    releases: Mutex<BTreeSet<String>>,
    install_calls: Mutex<u32>,
    fail_namespace_delete: Mutex<bool>,
}

fn failed(command: &str) -> CommandError {
    CommandError::ExecutionFailed {
        command: command.to_string(),
        exit_code: Some(1),
        message: format!("{command} failed"),
    }
}

#[async_trait]
impl ClusterClient for LocalCluster {
    async fn install_or_upgrade(&self, spec: &ReleaseSpec) -> Result<String, CommandError> {
        *self.install_calls.lock().unwrap() += 1;
        self.releases.lock().unwrap().insert(spec.release.clone());
        Ok("STATUS: deployed".to_string())
    }

    async fn uninstall(&self, release: &str, _namespace: &str, _timeout: Duration) -> Result<String, CommandError> {
        self.releases.lock().unwrap().remove(release);
        Ok(format!("release \"{release}\" uninstalled"))
    }

    async fn delete_namespace(&self, namespace: &str, _timeout: Duration) -> Result<String, CommandError> {
        if *self.fail_namespace_delete.lock().unwrap() {
            return Err(failed("kubectl delete namespace"));
        }
        Ok(format!("namespace \"{namespace}\" deleted"))
    }

    async fn exec(&self, _target: &ExecTarget, _argv: &[CommandArg], _timeout: Duration) -> Result<String, CommandError> {
        Ok("Success".to_string())
    }
}

struct Fleet {
    service: StoreService,
    queue: Arc<InMemoryJobQueue>,
    cluster: Arc<LocalCluster>,
    orchestrator: Arc<Orchestrator>,
    _values: TempDir,
}

impl Fleet {
    fn new() -> Self {
        let values = TempDir::new().unwrap();
        std::fs::write(values.path().join("values-test.yaml"), "ingress:\n  enabled: true\n").unwrap();

        let repo = Arc::new(InMemoryStoreRepository::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let cluster = Arc::new(LocalCluster::default());
        let settings = WorkflowSettings {
            chart_path: PathBuf::from("./charts/woocommerce"),
            values_overlay: values.path().join("values-test.yaml"),
            domain_suffix: "shops.test".to_string(),
            protocol: "https".to_string(),
            install_timeout: Duration::from_secs(300),
            teardown_timeout: Duration::from_secs(120),
            configure_retry: RetryPolicy {
                max_attempts: 5,
                delay: Duration::from_millis(1),
                deadline: None,
            },
            configure_command_timeout: Duration::from_secs(60),
            container: "wp-cli".to_string(),
            workload_prefix: "deploy/".to_string(),
            admin_email: "admin@example.com".to_string(),
            output_capture_limit: 500,
        };

        Self {
            service: StoreService::new(repo.clone(), queue.clone()),
            orchestrator: Arc::new(Orchestrator::new(repo, cluster.clone(), settings)),
            queue,
            cluster,
            _values: values,
        }
    }

    /// Run every job queued so far through a dispatcher, one at a time
    async fn drain(&self) {
        let batch = Arc::new(InMemoryJobQueue::new());
        while let Ok(next) = tokio::time::timeout(Duration::from_millis(50), self.queue.dequeue()).await {
            match next.unwrap() {
                Some(delivery) => batch.enqueue(delivery.job).await.unwrap(),
                None => break,
            }
        }
        batch.close();

        let dispatcher = Dispatcher::new(batch, self.orchestrator.clone(), 1, Duration::from_millis(10));
        dispatcher.run(std::future::pending::<()>()).await;
    }
}

fn request(name: &str) -> CreateStoreRequest {
    CreateStoreRequest {
        name: name.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_acme_lifecycle() {
    let fleet = Fleet::new();

    let created = fleet.service.create_store(request("acme")).await.unwrap();
    assert_eq!(created.store.status, StoreStatus::Queued);

    fleet.drain().await;
    let ready = fleet.service.get_store(created.store.id, false).await.unwrap();
    assert_eq!(ready.status, StoreStatus::Ready);
    assert_eq!(ready.url.as_deref(), Some("https://acme.shops.test"));
    assert_eq!(ready.admin_url().as_deref(), Some("https://acme.shops.test/wp-admin"));

    let events: Vec<String> = fleet
        .service
        .audit_trail(ready.id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.event)
        .collect();
    assert!(events.contains(&"Provisioning Started".to_string()));
    assert!(events.contains(&"Provisioning Complete".to_string()));

    let deleting = fleet.service.delete_store(ready.id).await.unwrap();
    assert_eq!(deleting.status, StoreStatus::Deleting);

    fleet.drain().await;
    let deleted = fleet.service.get_store(ready.id, true).await.unwrap();
    assert_eq!(deleted.status, StoreStatus::Deleted);
    assert!(deleted.url.is_none());
    assert!(Regex::new(r"^acme-deleted-\d+$").unwrap().is_match(&deleted.name));
    assert!(fleet.cluster.releases.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_name_reusable_after_deletion_with_history_kept() {
    let fleet = Fleet::new();

    let first = fleet.service.create_store(request("reuse")).await.unwrap();
    fleet.drain().await;
    fleet.service.delete_store(first.store.id).await.unwrap();
    fleet.drain().await;

    let second = fleet.service.create_store(request("reuse")).await.unwrap();
    assert_ne!(second.store.id, first.store.id);
    fleet.drain().await;
    assert_eq!(
        fleet.service.get_store(second.store.id, false).await.unwrap().status,
        StoreStatus::Ready
    );

    let old_trail = fleet.service.audit_trail(first.store.id).await.unwrap();
    assert_eq!(old_trail[0].event, "Deletion Complete");
    assert_eq!(fleet.service.list_stores(false).await.unwrap().len(), 1);
    assert_eq!(fleet.service.list_stores(true).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_second_active_store_with_same_name_conflicts() {
    let fleet = Fleet::new();
    fleet.service.create_store(request("dup")).await.unwrap();

    let err = fleet.service.create_store(request("dup")).await.unwrap_err();
    assert!(matches!(err, storefleet::ServiceError::NameConflict(_)));
}

#[tokio::test]
async fn test_failed_teardown_keeps_name_reserved() {
    let fleet = Fleet::new();
    let created = fleet.service.create_store(request("sticky")).await.unwrap();
    fleet.drain().await;

    *fleet.cluster.fail_namespace_delete.lock().unwrap() = true;
    fleet.service.delete_store(created.store.id).await.unwrap();
    fleet.drain().await;

    let failed = fleet.service.get_store(created.store.id, false).await.unwrap();
    assert_eq!(failed.status, StoreStatus::Failed);
    assert_eq!(failed.name, "sticky");
    assert!(fleet.service.create_store(request("sticky")).await.is_err());
}

#[tokio::test]
async fn test_duplicate_provision_job_installs_once() {
    let fleet = Fleet::new();
    let created = fleet.service.create_store(request("echo")).await.unwrap();
    fleet.queue.enqueue(Job::provision(created.store.id)).await.unwrap();

    fleet.drain().await;

    assert_eq!(*fleet.cluster.install_calls.lock().unwrap(), 1);
    let store = fleet.service.get_store(created.store.id, false).await.unwrap();
    assert_eq!(store.status, StoreStatus::Ready);
}
