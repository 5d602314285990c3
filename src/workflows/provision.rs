// Provisioning workflow: QUEUED -> PROVISIONING -> READY | FAILED

use tracing::{info, warn};
use uuid::Uuid;

use super::{retry_fixed, truncate_output, Orchestrator, StepError, WorkflowError, WorkflowOutcome};
use crate::audit::AuditDetails;
use crate::external::{CommandArg, ExecTarget, ReleaseSpec, ValueOverride};
use crate::lifecycle::LifecycleEvent;
use crate::store::{ClusterNames, Store, StoreStatus};

/// What a successful run hands to the READY transition
struct Provisioned {
    url: String,
    installer_output: String,
}

impl Orchestrator {
    /// Take a store from `QUEUED` (or a re-entered `PROVISIONING`) to a terminal state
    pub async fn provision(&self, store_id: Uuid) -> Result<WorkflowOutcome, WorkflowError> {
        let Some(mut store) = self.repository.get(store_id).await? else {
            warn!(store_id = %store_id, "Provisioning job for unknown store ignored");
            return Ok(WorkflowOutcome::StoreMissing);
        };

        if !matches!(store.status, StoreStatus::Queued | StoreStatus::Provisioning) {
            info!(store_id = %store_id, status = %store.status, "Store not awaiting provisioning, skipping");
            self.audit
                .record(
                    store_id,
                    "Provisioning Skipped",
                    Some(AuditDetails::new().with("status", store.status)),
                )
                .await?;
            return Ok(WorkflowOutcome::Skipped { status: store.status });
        }

        info!(store_id = %store_id, name = %store.name, "Provisioning store");
        self.transition(&mut store, LifecycleEvent::BeginProvisioning, None)
            .await?;

        let result = match self.provisioning_steps(&store).await {
            Ok(provisioned) => {
                let details = AuditDetails::new()
                    .with("url", &provisioned.url)
                    .with("installer_output", &provisioned.installer_output);
                self.transition(
                    &mut store,
                    LifecycleEvent::ProvisioningSucceeded { url: provisioned.url },
                    Some(details),
                )
                .await
                .map(|_| ())
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                info!(store_id = %store_id, url = store.url.as_deref().unwrap_or_default(), "Store ready");
                Ok(WorkflowOutcome::Completed { status: store.status })
            }
            Err(err) => {
                self.fail(&mut store, LifecycleEvent::ProvisioningFailed, err)
                    .await
            }
        }
    }

    async fn provisioning_steps(&self, store: &Store) -> Result<Provisioned, StepError> {
        if !store.engine.is_supported() {
            return Err(StepError::Configuration(format!(
                "engine '{}' is not supported",
                store.engine
            )));
        }

        let names = ClusterNames::derive(&store.name, &self.settings.domain_suffix);
        let url = names.url(&self.settings.protocol);

        let overlay = self.settings.values_overlay.clone();
        let overlay_present = tokio::fs::metadata(&overlay)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !overlay_present {
            return Err(StepError::Configuration(format!(
                "values overlay {} not found",
                overlay.display()
            )));
        }

        self.audit
            .record(
                store.id,
                "Installing Chart",
                Some(
                    AuditDetails::new()
                        .with("release", &names.release)
                        .with("namespace", &names.namespace)
                        .with("overlay", overlay.display().to_string()),
                ),
            )
            .await?;

        let spec = ReleaseSpec {
            release: names.release.clone(),
            namespace: names.namespace.clone(),
            chart: self.settings.chart_path.clone(),
            values_overlay: overlay,
            overrides: vec![
                ValueOverride::new("ingress.host", &names.hostname),
                ValueOverride::new("ingress.protocol", &self.settings.protocol),
                ValueOverride::new("wordpress.adminUser", &store.admin_user),
                ValueOverride::secret("wordpress.adminPassword", &store.admin_password),
                ValueOverride::new("wordpress.adminEmail", &self.settings.admin_email),
            ],
            timeout: self.settings.install_timeout,
        };
        let output = self.cluster.install_or_upgrade(&spec).await?;
        self.audit.record(store.id, "Chart Installed", None).await?;

        let attempts = self.configure_storefront(store, &names, &url).await?;
        self.audit
            .record(
                store.id,
                "Storefront Configured",
                Some(AuditDetails::new().with("attempts", attempts)),
            )
            .await?;

        Ok(Provisioned {
            url,
            installer_output: truncate_output(&output, self.settings.output_capture_limit),
        })
    }

    /// Run the in-container setup, restarting from the first command on any failure
    ///
    /// Returns the attempt number that succeeded.
    async fn configure_storefront(&self, store: &Store, names: &ClusterNames, url: &str) -> Result<u32, StepError> {
        let target = ExecTarget {
            namespace: names.namespace.clone(),
            workload: format!("{}{}", self.settings.workload_prefix, names.release),
            container: self.settings.container.clone(),
        };
        self.audit
            .record(
                store.id,
                "Configuring Storefront",
                Some(
                    AuditDetails::new()
                        .with("workload", &target.workload)
                        .with("container", &target.container),
                ),
            )
            .await?;

        let commands = storefront_commands(store, url, &self.settings.admin_email);
        let policy = &self.settings.configure_retry;
        let max_attempts = policy.max_attempts;
        let this = self;
        let target = &target;
        let commands = &commands;

        retry_fixed(policy, move |attempt| async move {
            match this.run_commands(target, commands).await {
                Ok(()) => Ok::<u32, StepError>(attempt),
                Err(err) => {
                    warn!(store_id = %store.id, attempt, max_attempts, error = %err, "Storefront configuration attempt failed");
                    this.audit
                        .record(
                            store.id,
                            "Configuration Attempt Failed",
                            Some(
                                AuditDetails::new()
                                    .with("attempt", attempt)
                                    .with("max_attempts", max_attempts)
                                    .with("error", err.to_string()),
                            ),
                        )
                        .await?;
                    Err(err)
                }
            }
        })
        .await
    }

    async fn run_commands(&self, target: &ExecTarget, commands: &[Vec<CommandArg>]) -> Result<(), StepError> {
        for argv in commands {
            self.cluster
                .exec(target, argv, self.settings.configure_command_timeout)
                .await?;
        }
        Ok(())
    }
}

/// Commands run inside the storefront container per configuration attempt
pub const STOREFRONT_SETUP_COMMANDS: u32 = 3;

/// `wp` invocations that turn a fresh install into a working storefront
fn storefront_commands(store: &Store, url: &str, admin_email: &str) -> Vec<Vec<CommandArg>> {
    vec![
        vec![
            "wp".into(),
            "core".into(),
            "install".into(),
            format!("--url={url}").into(),
            format!("--title={}", store.name).into(),
            format!("--admin_user={}", store.admin_user).into(),
            CommandArg::secret(format!("--admin_password={}", store.admin_password)),
            format!("--admin_email={admin_email}").into(),
            "--skip-email".into(),
        ],
        vec!["wp".into(), "plugin".into(), "activate".into(), "woocommerce".into()],
        vec!["wp".into(), "rewrite".into(), "structure".into(), "/%postname%/".into()],
    ]
}
