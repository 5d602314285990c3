// Core types for stores and their audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreStatus {
    /// Accepted, waiting for a worker
    Queued,
    /// A provisioning attempt is running
    Provisioning,
    /// Installed, configured and reachable at `url`
    Ready,
    /// Provisioning or teardown did not complete; needs an operator
    Failed,
    /// Teardown accepted or running
    Deleting,
    /// Terminal soft-delete; the name has been freed
    Deleted,
}

impl StoreStatus {
    pub const ALL: [StoreStatus; 6] = [
        StoreStatus::Queued,
        StoreStatus::Provisioning,
        StoreStatus::Ready,
        StoreStatus::Failed,
        StoreStatus::Deleting,
        StoreStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStatus::Queued => "QUEUED",
            StoreStatus::Provisioning => "PROVISIONING",
            StoreStatus::Ready => "READY",
            StoreStatus::Failed => "FAILED",
            StoreStatus::Deleting => "DELETING",
            StoreStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown store status '{s}'"))
    }
}

/// Storefront technology to provision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreEngine {
    #[default]
    Woocommerce,
    /// Recognized but not provisionable yet
    Medusa,
}

impl StoreEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreEngine::Woocommerce => "woocommerce",
            StoreEngine::Medusa => "medusa",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, StoreEngine::Woocommerce)
    }
}

impl fmt::Display for StoreEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "woocommerce" => Ok(StoreEngine::Woocommerce),
            "medusa" => Ok(StoreEngine::Medusa),
            other => Err(format!("unknown store engine '{other}'")),
        }
    }
}

/// A tenant storefront
///
/// `status`, `url` and (on deletion) `name` change only through
/// [`Store::apply`](crate::lifecycle::LifecycleEvent).
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    pub status: StoreStatus,
    pub engine: StoreEngine,
    pub url: Option<String>,
    pub admin_user: String,
    #[serde(skip_serializing)]
    pub admin_password: String,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// A freshly accepted store; `QUEUED` is the only legal initial state
    pub fn new(
        name: impl Into<String>,
        engine: StoreEngine,
        admin_user: impl Into<String>,
        admin_password: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: StoreStatus::Queued,
            engine,
            url: None,
            admin_user: admin_user.into(),
            admin_password: admin_password.into(),
            created_at: Utc::now(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.status == StoreStatus::Deleted
    }

    /// Storefront dashboard login page, once the store has a url
    pub fn admin_url(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(|url| format!("{}/wp-admin", url.trim_end_matches('/')))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("engine", &self.engine)
            .field("url", &self.url)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &"******")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Immutable audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Insertion sequence, breaks timestamp ties
    pub id: i64,
    pub store_id: Uuid,
    pub event: String,
    /// Serialized details; empty when none were given
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

/// Audit record before the repository assigns its sequence number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub store_id: Uuid,
    pub event: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}
