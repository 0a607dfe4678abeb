//! Cluster CRD
//!
//! The owning entity a MachinePool names via `spec.clusterName`. Carries the
//! fleet-wide pause switch consulted before any pool reconciliation work.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "fleetops.microscaler.io",
    version = "v1alpha1",
    kind = "Cluster",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Pause reconciliation of this cluster and all machine pools that
    /// belong to it
    #[serde(default)]
    pub paused: bool,
}
