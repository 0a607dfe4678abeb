//! MachinePool CRD
//!
//! Declares a scalable group of homogeneous compute nodes belonging to a
//! Cluster. The pool delegates node bootstrap configuration and machine
//! provisioning to externally-managed provider objects named by references
//! in its spec, and surfaces their combined state through its status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::references::{ExternalReference, NodeReference};

/// Failure reason recorded when the pool references resources that are no
/// longer consistent (e.g. infrastructure deleted after becoming ready).
pub const FAILURE_REASON_INVALID_CONFIGURATION: &str = "InvalidConfiguration";

fn default_replicas() -> i32 {
    1
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "fleetops.microscaler.io",
    version = "v1alpha1",
    kind = "MachinePool",
    namespaced,
    status = "MachinePoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachinePoolSpec {
    /// Name of the owning Cluster, in the same namespace as the pool
    pub cluster_name: String,

    /// Desired number of machines in the pool
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Bootstrap configuration for machines in the pool
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Reference to the infrastructure provider object backing the pool
    pub infrastructure_ref: ExternalReference,

    /// Provider identifiers of the machines currently backing the pool,
    /// mirrored from the infrastructure provider
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_id_list: Vec<String>,
}

/// Bootstrap data source for the machines of a pool
///
/// Either a bootstrap provider reference or inline data / a pre-created
/// secret name must be supplied.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapConfig {
    /// Reference to a bootstrap provider object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_ref: Option<ExternalReference>,

    /// Inline bootstrap data, bypassing any bootstrap provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Name of the secret holding the bootstrap data; written back by the
    /// controller once a bootstrap provider reports ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_secret_name: Option<String>,
}

/// Observed state of a MachinePool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachinePoolStatus {
    /// Current lifecycle phase of the pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<MachinePoolPhase>,

    /// Whether bootstrap data is available for the pool
    #[serde(default)]
    pub bootstrap_ready: bool,

    /// Whether the infrastructure provider reports ready
    #[serde(default)]
    pub infrastructure_ready: bool,

    /// Most recently observed number of machines in the pool
    #[serde(default)]
    pub replicas: i32,

    /// Number of machines that are ready
    #[serde(default)]
    pub ready_replicas: i32,

    /// Number of machines available to serve workloads
    #[serde(default)]
    pub available_replicas: i32,

    /// Number of machines still expected but not yet available
    #[serde(default)]
    pub unavailable_replicas: i32,

    /// Machine-readable reason for a terminal failure; never cleared by this controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Human-readable description of a terminal failure; never cleared by this controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,

    /// Nodes backing the pool
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_refs: Vec<NodeReference>,
}

/// Lifecycle phase of a MachinePool
///
/// Serializes as PascalCase ("Pending", "ScalingUp", etc.).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum MachinePoolPhase {
    /// Pool accepted but neither provider is ready yet
    Pending,

    /// Bootstrap data is ready, infrastructure is still provisioning
    Provisioning,

    /// At least one node has joined the pool
    Provisioned,

    /// Ready replica count matches the desired count
    Running,

    /// More replicas desired than ready
    ScalingUp,

    /// Fewer replicas desired than ready
    ScalingDown,

    /// An unrecoverable failure is recorded on the pool
    Failed,

    /// Pool deletion is in progress
    Deleting,
}

impl MachinePool {
    /// Mutable access to status, initializing an empty one when unset
    pub fn status_mut(&mut self) -> &mut MachinePoolStatus {
        self.status.get_or_insert_with(MachinePoolStatus::default)
    }
}
