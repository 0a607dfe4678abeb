//! Bootstrap provider reconciliation.
//!
//! Resolves the optional bootstrap config reference, waits for the provider
//! to publish a data secret, and copies the secret name into the pool spec.
//! Pools with inline bootstrap data skip the provider entirely.

use crate::error::ControllerError;
use crate::fields::{is_ready, read_string};
use crate::reconciler::external::{ExternalOutcome, ExternalReconciler};
use crate::reconciler::{Outcome, Requeue};
use crds::{Cluster, MachinePool};
use kube::ResourceExt;
use tracing::debug;

impl ExternalReconciler {
    /// Reconciles the bootstrap provider for a machine pool.
    pub(crate) async fn reconcile_bootstrap(
        &self,
        cluster: &Cluster,
        pool: &mut MachinePool,
    ) -> Result<Outcome, ControllerError> {
        let name = pool.name_any();
        let namespace = pool.namespace().unwrap_or_else(|| "default".to_string());

        // The provider object is resolved before the inline short-circuit so
        // a referenced config is always adopted and watched.
        let config_ref = pool.spec.bootstrap.config_ref.clone();
        let config = match config_ref {
            Some(reference) => match self.reconcile(cluster, pool, &reference).await? {
                ExternalOutcome::Resolved(object) => Some(object),
                ExternalOutcome::Paused => return Ok(Outcome::Done),
                ExternalOutcome::Missing(requeue) => return Ok(Outcome::Requeue(requeue)),
            },
            None => None,
        };

        if pool.spec.bootstrap.data.is_some() || pool.spec.bootstrap.data_secret_name.is_some() {
            pool.status_mut().bootstrap_ready = true;
            return Ok(Outcome::Done);
        }

        let Some(config) = config else {
            return Err(ControllerError::InvalidConfig(format!(
                "MachinePool {}/{} has neither bootstrap data nor a bootstrap config reference",
                namespace, name
            )));
        };

        if config.metadata.deletion_timestamp.is_some() {
            debug!(
                "Bootstrap provider for MachinePool {}/{} is being deleted, skipping",
                namespace, name
            );
            return Ok(Outcome::Done);
        }

        let ready = is_ready(&config).map_err(|e| {
            ControllerError::ExternalData(format!(
                "failed to determine readiness of bootstrap provider for MachinePool {}/{}: {}",
                namespace, name, e
            ))
        })?;
        if !ready {
            debug!("Bootstrap provider for MachinePool {}/{} is not ready", namespace, name);
            return Ok(Outcome::Requeue(Requeue::external_ready_wait(format!(
                "bootstrap provider for MachinePool {}/{} is not ready",
                namespace, name
            ))));
        }

        let secret_name = read_string(&config, &["status", "dataSecretName"])
            .map_err(|e| {
                ControllerError::ExternalData(format!(
                    "failed to retrieve dataSecretName from bootstrap provider for MachinePool {}/{}: {}",
                    namespace, name, e
                ))
            })?
            .ok_or_else(|| {
                ControllerError::ExternalData(format!(
                    "failed to retrieve dataSecretName from bootstrap provider for MachinePool {}/{}",
                    namespace, name
                ))
            })?;
        if secret_name.is_empty() {
            return Err(ControllerError::ExternalData(format!(
                "retrieved empty dataSecretName from bootstrap provider for MachinePool {}/{}",
                namespace, name
            )));
        }

        pool.spec.bootstrap.data_secret_name = Some(secret_name);
        pool.status_mut().bootstrap_ready = true;
        Ok(Outcome::Done)
    }
}
