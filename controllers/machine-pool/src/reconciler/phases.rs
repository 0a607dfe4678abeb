//! Lifecycle phase derivation for machine pools.
//!
//! The phase is recomputed from scratch on every pass. Rules are evaluated in
//! a fixed order and each matching rule overwrites the previous one, so later
//! rules take precedence. When no rule matches, the current phase is kept.

use crds::{MachinePool, MachinePoolPhase, MachinePoolStatus};
use kube::ResourceExt;
use tracing::info;

/// Computes the phase the pool should be in, given its current spec and
/// status.
pub(crate) fn derived_phase(pool: &MachinePool) -> MachinePoolPhase {
    let default_status = MachinePoolStatus::default();
    let status = pool.status.as_ref().unwrap_or(&default_status);
    let desired = pool.spec.replicas;

    let mut phase = status.phase.unwrap_or(MachinePoolPhase::Pending);

    if status.bootstrap_ready && !status.infrastructure_ready {
        phase = MachinePoolPhase::Provisioning;
    }
    if !status.node_refs.is_empty() {
        phase = MachinePoolPhase::Provisioned;
    }
    if status.infrastructure_ready && desired == status.ready_replicas {
        phase = MachinePoolPhase::Running;
    }
    if status.infrastructure_ready && desired > status.ready_replicas {
        phase = MachinePoolPhase::ScalingUp;
    }
    if status.infrastructure_ready && desired < status.ready_replicas {
        phase = MachinePoolPhase::ScalingDown;
    }
    if status.failure_reason.is_some() || status.failure_message.is_some() {
        phase = MachinePoolPhase::Failed;
    }
    if pool.metadata.deletion_timestamp.is_some() {
        phase = MachinePoolPhase::Deleting;
    }

    phase
}

/// Recomputes and stores the pool phase, logging transitions.
pub(crate) fn reconcile_phase(pool: &mut MachinePool) {
    let phase = derived_phase(pool);
    let name = pool.name_any();
    let namespace = pool.namespace().unwrap_or_else(|| "default".to_string());

    let status = pool.status_mut();
    if status.phase != Some(phase) {
        info!("MachinePool {}/{} entered phase {:?}", namespace, name, phase);
    }
    status.phase = Some(phase);
}
