//! FleetOps CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for FleetOps controllers.

pub mod cluster;
pub mod machine_pool;
pub mod references;

pub use cluster::*;
pub use machine_pool::*;
pub use references::*;

/// Label stamped onto provider objects to record which cluster they belong to.
pub const CLUSTER_NAME_LABEL: &str = "fleetops.microscaler.io/cluster-name";

/// Annotation that pauses reconciliation of the object carrying it.
pub const PAUSED_ANNOTATION: &str = "fleetops.microscaler.io/paused";
