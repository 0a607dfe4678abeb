//! Controller-specific error types.
//!
//! This module defines error types specific to the MachinePool Controller
//! that are not covered by upstream library errors.

use crate::store::StoreError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the MachinePool Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// External object store error
    #[error("External store error: {0}")]
    Store(#[from] StoreError),

    /// Owning Cluster not found
    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Provider object reported data the controller cannot use
    #[error("Provider data error: {0}")]
    ExternalData(String),

    /// Provider object is already controlled by someone else
    #[error("Ownership conflict: {0}")]
    Ownership(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
