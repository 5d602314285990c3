// Deterministic names derived from a store name

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Longest accepted store name; keeps `store-<name>` a valid namespace
pub const MAX_STORE_NAME_LEN: usize = 40;

const RELEASE_PREFIX: &str = "store-";

static STORE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("store name pattern"));

/// Cluster-side identity of one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNames {
    pub release: String,
    pub namespace: String,
    pub hostname: String,
}

impl ClusterNames {
    /// Same name in, same resources out; this is what makes install-or-upgrade idempotent
    pub fn derive(store_name: &str, domain_suffix: &str) -> Self {
        let release = format!("{RELEASE_PREFIX}{store_name}");
        Self {
            namespace: release.clone(),
            release,
            hostname: format!("{store_name}.{}", domain_suffix.trim_start_matches('.')),
        }
    }

    pub fn url(&self, protocol: &str) -> String {
        format!("{protocol}://{}", self.hostname)
    }
}

/// Reason a candidate store name is rejected
pub fn validate_store_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if name.len() > MAX_STORE_NAME_LEN {
        return Err(format!("name must be at most {MAX_STORE_NAME_LEN} characters"));
    }
    if !STORE_NAME.is_match(name) {
        return Err(
            "name may contain only lowercase letters, digits and '-', and must start and end with a letter or digit"
                .to_string(),
        );
    }
    Ok(())
}

/// Name given to a store when it reaches `DELETED`, freeing the original
pub fn tombstone_name(name: &str, deleted_at: DateTime<Utc>) -> String {
    format!("{name}-deleted-{}", deleted_at.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_derive_names() {
        let names = ClusterNames::derive("acme", "127.0.0.1.nip.io");
        assert_eq!(names.release, "store-acme");
        assert_eq!(names.namespace, "store-acme");
        assert_eq!(names.hostname, "acme.127.0.0.1.nip.io");
        assert_eq!(names.url("http"), "http://acme.127.0.0.1.nip.io");
    }

    #[test]
    fn test_tombstone_name() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(tombstone_name("acme", at), "acme-deleted-1714564800");
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_store_name("acme").is_ok());
        assert!(validate_store_name("acme-2").is_ok());
        assert!(validate_store_name("").is_err());
        assert!(validate_store_name("Acme").is_err());
        assert!(validate_store_name("-acme").is_err());
        assert!(validate_store_name("acme-").is_err());
        assert!(validate_store_name("acme_shop").is_err());
        assert!(validate_store_name(&"a".repeat(MAX_STORE_NAME_LEN + 1)).is_err());
    }

    proptest! {
        #[test]
        fn prop_valid_names_yield_valid_namespaces(name in "[a-z0-9]([a-z0-9-]{0,38}[a-z0-9])?") {
            prop_assert!(validate_store_name(&name).is_ok());
            let names = ClusterNames::derive(&name, "example.test");
            prop_assert!(names.namespace.len() <= 63);
            prop_assert_eq!(ClusterNames::derive(&name, "example.test"), names);
        }
    }
}
