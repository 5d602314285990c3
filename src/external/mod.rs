//! External tool abstractions
//!
//! Trait-based seams around the opaque command-line tooling (`helm`,
//! `kubectl`, in-container `wp`), so the workflows can be driven against
//! doubles in tests and against the real binaries in the worker.

pub mod access;
pub mod cluster;
pub mod command;

pub use access::{resolve_cluster_access, ClusterAccess, KubeAccessStrategy};
pub use cluster::{CliClusterClient, ClusterClient, ExecTarget, ReleaseSpec, ValueOverride, HELM_ROLLBACK_HEADROOM};
pub use command::{CommandArg, CommandError, CommandRunner, Invocation, ProcessCommandRunner};
