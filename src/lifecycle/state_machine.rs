use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{tombstone_name, Store, StoreStatus};

/// Events that move a store between lifecycle states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// A worker starts (or, after redelivery, restarts) provisioning
    BeginProvisioning,
    ProvisioningSucceeded {
        url: String,
    },
    ProvisioningFailed,
    /// The request layer accepted a delete
    RequestDeletion,
    /// Cluster resources are confirmed gone
    DeletionSucceeded {
        deleted_at: DateTime<Utc>,
    },
    DeletionFailed,
}

impl LifecycleEvent {
    /// Label of the audit entry paired with this transition
    pub fn audit_label(&self) -> &'static str {
        match self {
            LifecycleEvent::BeginProvisioning => "Provisioning Started",
            LifecycleEvent::ProvisioningSucceeded { .. } => "Provisioning Complete",
            LifecycleEvent::ProvisioningFailed => "Provisioning Failed",
            LifecycleEvent::RequestDeletion => "Deletion Requested",
            LifecycleEvent::DeletionSucceeded { .. } => "Deletion Complete",
            LifecycleEvent::DeletionFailed => "Deletion Failed",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::BeginProvisioning => "begin_provisioning",
            LifecycleEvent::ProvisioningSucceeded { .. } => "provisioning_succeeded",
            LifecycleEvent::ProvisioningFailed => "provisioning_failed",
            LifecycleEvent::RequestDeletion => "request_deletion",
            LifecycleEvent::DeletionSucceeded { .. } => "deletion_succeeded",
            LifecycleEvent::DeletionFailed => "deletion_failed",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition: cannot apply {event} to a store in {from}")]
    InvalidTransition { from: StoreStatus, event: &'static str },
}

/// Record of one applied transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: StoreStatus,
    pub to: StoreStatus,
    /// Set when `DeletionSucceeded` renamed the store
    pub renamed_to: Option<String>,
}

/// Target state for `event` applied in `from`, if that edge exists
pub fn next_status(from: StoreStatus, event: &LifecycleEvent) -> Result<StoreStatus, TransitionError> {
    use LifecycleEvent as E;
    use StoreStatus as S;

    let to = match (from, event) {
        (S::Queued | S::Provisioning, E::BeginProvisioning) => S::Provisioning,
        (S::Provisioning, E::ProvisioningSucceeded { .. }) => S::Ready,
        (S::Provisioning, E::ProvisioningFailed) => S::Failed,
        (S::Ready | S::Failed, E::RequestDeletion) => S::Deleting,
        (S::Deleting, E::DeletionSucceeded { .. }) => S::Deleted,
        (S::Deleting, E::DeletionFailed) => S::Failed,
        _ => {
            return Err(TransitionError::InvalidTransition {
                from,
                event: event.name(),
            })
        }
    };
    Ok(to)
}

impl Store {
    /// Apply a lifecycle event, updating `status` and the fields tied to it
    ///
    /// On error the store is left untouched.
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<Transition, TransitionError> {
        let from = self.status;
        let to = next_status(from, &event)?;
        let mut renamed_to = None;

        match event {
            LifecycleEvent::ProvisioningSucceeded { url } => self.url = Some(url),
            LifecycleEvent::BeginProvisioning | LifecycleEvent::ProvisioningFailed => self.url = None,
            LifecycleEvent::DeletionSucceeded { deleted_at } => {
                let name = tombstone_name(&self.name, deleted_at);
                self.name = name.clone();
                self.url = None;
                renamed_to = Some(name);
            }
            LifecycleEvent::RequestDeletion | LifecycleEvent::DeletionFailed => {}
        }

        self.status = to;
        tracing::debug!(store_id = %self.id, from = %from, to = %to, "Store transitioned");
        Ok(Transition { from, to, renamed_to })
    }

    /// Failure event available from the current state, if any
    pub fn failure_event(&self) -> Option<LifecycleEvent> {
        match self.status {
            StoreStatus::Provisioning => Some(LifecycleEvent::ProvisioningFailed),
            StoreStatus::Deleting => Some(LifecycleEvent::DeletionFailed),
            _ => None,
        }
    }
}
