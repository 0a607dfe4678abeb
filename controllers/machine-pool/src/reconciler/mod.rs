//! Reconciliation logic for MachinePool resources.
//!
//! This module is organized by concern:
//! - `external`: generic adoption/watch routine shared by both providers
//! - `bootstrap`: bootstrap provider handling and data secret extraction
//! - `infrastructure`: infrastructure provider handling and replica tracking
//! - `phases`: derivation of the pool lifecycle phase

pub mod bootstrap;
pub mod external;
#[cfg(test)]
mod external_test;
pub mod infrastructure;
pub mod phases;

use crate::error::ControllerError;
use crate::reconciler::external::{is_paused, ExternalReconciler};
use crds::{Cluster, MachinePool};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use std::time::Duration;
use tracing::{debug, error, info};

/// How long to wait before rechecking a provider object that is missing or
/// not yet ready.
pub(crate) const EXTERNAL_READY_WAIT: Duration = Duration::from_secs(30);

/// Instruction to retry a pool after a delay. Not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requeue {
    /// Delay before the next reconciliation pass
    pub after: Duration,
    /// Why the pass could not complete yet
    pub reason: String,
}

impl Requeue {
    /// Requeue after the standard provider readiness wait.
    pub(crate) fn external_ready_wait(reason: String) -> Self {
        Self {
            after: EXTERNAL_READY_WAIT,
            reason,
        }
    }
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing left to do until the pool or a watched object changes
    Done,
    /// Try again after a delay
    Requeue(Requeue),
}

impl Outcome {
    /// Merges two outcomes, keeping the sooner retry.
    pub(crate) fn earliest(self, other: Outcome) -> Outcome {
        match (self, other) {
            (Outcome::Done, other) => other,
            (outcome, Outcome::Done) => outcome,
            (Outcome::Requeue(a), Outcome::Requeue(b)) => {
                if b.after < a.after {
                    Outcome::Requeue(b)
                } else {
                    Outcome::Requeue(a)
                }
            }
        }
    }
}

/// Reconciles MachinePool resources.
pub struct Reconciler {
    pub(crate) client: Client,
    pub(crate) externals: ExternalReconciler,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(client: Client, externals: ExternalReconciler) -> Self {
        Self { client, externals }
    }

    /// Runs one reconciliation pass over a machine pool.
    ///
    /// Works on a deep copy of the pool; spec and status changes are flushed
    /// with merge patches at the end of the pass, even when the pass itself
    /// produced a requeue or an error.
    pub async fn reconcile_machine_pool(&self, pool: &MachinePool) -> Result<Outcome, ControllerError> {
        let name = pool
            .metadata
            .name
            .clone()
            .ok_or_else(|| ControllerError::InvalidConfig("MachinePool missing name".to_string()))?;
        let namespace = pool
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| ControllerError::InvalidConfig("MachinePool missing namespace".to_string()))?;

        info!("Reconciling MachinePool {}/{}", namespace, name);

        let cluster_api: Api<Cluster> = Api::namespaced(self.client.clone(), &namespace);
        let cluster = match cluster_api.get(&pool.spec.cluster_name).await {
            Ok(cluster) => cluster,
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                return Err(ControllerError::ClusterNotFound(format!(
                    "{}/{}",
                    namespace, pool.spec.cluster_name
                )));
            }
            Err(e) => return Err(ControllerError::Kube(e)),
        };

        if is_paused(&cluster, &pool.metadata) {
            info!("Reconciliation is paused for MachinePool {}/{}", namespace, name);
            return Ok(Outcome::Done);
        }

        let mut updated = pool.clone();
        let result = run_pass(&self.externals, &cluster, &mut updated).await;

        if let Err(e) = self.persist(pool, &updated, &namespace, &name).await {
            if result.is_err() {
                // Keep the reconcile error; the flush is retried next pass.
                error!("Failed to persist MachinePool {}/{}: {}", namespace, name, e);
            } else {
                return Err(e);
            }
        }

        result
    }

    /// Flushes spec and status changes produced by a pass.
    async fn persist(
        &self,
        original: &MachinePool,
        updated: &MachinePool,
        namespace: &str,
        name: &str,
    ) -> Result<(), ControllerError> {
        let api: Api<MachinePool> = Api::namespaced(self.client.clone(), namespace);
        let pp = PatchParams::default();

        if updated.spec != original.spec {
            debug!("Persisting spec changes for MachinePool {}/{}", namespace, name);
            let patch = serde_json::json!({ "spec": &updated.spec });
            api.patch(name, &pp, &Patch::Merge(&patch)).await?;
        }

        let updated_status = updated.status.clone().unwrap_or_default();
        if original.status.clone().unwrap_or_default() != updated_status {
            debug!("Persisting status changes for MachinePool {}/{}", namespace, name);
            let patch = serde_json::json!({ "status": &updated_status });
            api.patch_status(name, &pp, &Patch::Merge(&patch)).await?;
        }

        Ok(())
    }
}

/// Drives both providers and the phase machine over an in-memory copy of the
/// pool. Mutations are left for the caller to persist.
pub(crate) async fn run_pass(
    externals: &ExternalReconciler,
    cluster: &Cluster,
    pool: &mut MachinePool,
) -> Result<Outcome, ControllerError> {
    let result = if pool.metadata.deletion_timestamp.is_some() {
        debug!(
            "MachinePool {}/{} is being deleted, skipping provider reconciliation",
            pool.metadata.namespace.as_deref().unwrap_or("default"),
            pool.metadata.name.as_deref().unwrap_or("")
        );
        Ok(Outcome::Done)
    } else {
        reconcile_providers(externals, cluster, pool).await
    };

    // Phases run even when a provider errored.
    phases::reconcile_phase(pool);

    result
}

/// Reconciles the bootstrap and infrastructure providers in order. Both run
/// regardless of each other's outcome; the first hard error wins, and two
/// requeue outcomes merge to the sooner delay.
pub(crate) async fn reconcile_providers(
    externals: &ExternalReconciler,
    cluster: &Cluster,
    pool: &mut MachinePool,
) -> Result<Outcome, ControllerError> {
    let mut outcome = Outcome::Done;
    let mut first_error: Option<ControllerError> = None;

    match externals.reconcile_bootstrap(cluster, pool).await {
        Ok(o) => outcome = outcome.earliest(o),
        Err(e) => first_error = Some(e),
    }

    match externals.reconcile_infrastructure(cluster, pool).await {
        Ok(o) => outcome = outcome.earliest(o),
        Err(e) => first_error = first_error.or(Some(e)),
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(outcome),
    }
}
