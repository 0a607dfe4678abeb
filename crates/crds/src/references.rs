//! Object references used by FleetOps CRDs
//!
//! Provides typed references to externally-managed provider objects and to
//! cluster nodes. Provider references carry a full apiVersion + kind so the
//! controller can reach objects of kinds it has no compiled-in types for.

use kube::api::GroupVersionKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to an externally-managed provider object
///
/// Unlike a plain local object reference this carries `apiVersion` and `kind`,
/// because bootstrap and infrastructure providers define their own resource
/// types and the controller addresses them dynamically.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalReference {
    /// API version of the referenced resource (e.g. "infrastructure.fleetops.microscaler.io/v1alpha1")
    pub api_version: String,

    /// Kind of the referenced resource (e.g. "ProxmoxMachinePool")
    pub kind: String,

    /// Name of the referenced resource
    pub name: String,

    /// Namespace of the referenced resource (defaults to the referencing object's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ExternalReference {
    /// Create a reference within the same namespace as the referencing object
    pub fn new(api_version: String, kind: String, name: String) -> Self {
        Self {
            api_version,
            kind,
            name,
            namespace: None,
        }
    }

    /// Split the reference into the group/version/kind triple used for
    /// dynamic API access. Core-group references ("v1") have an empty group.
    pub fn group_version_kind(&self) -> GroupVersionKind {
        let (group, version) = match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        };
        GroupVersionKind::gvk(group, version, &self.kind)
    }
}

/// Reference to a cluster node backing a machine pool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeReference {
    /// Name of the node
    pub name: String,
}
