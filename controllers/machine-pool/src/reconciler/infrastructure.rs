//! Infrastructure provider reconciliation.
//!
//! Resolves the mandatory infrastructure reference, mirrors its readiness and
//! replica count into the pool, and copies the provider ID list into the pool
//! spec. A change in the provider ID list resets the ready counters until the
//! next node sync.

use crate::error::ControllerError;
use crate::fields::{is_ready, read_int, read_string_list};
use crate::reconciler::external::{ExternalOutcome, ExternalReconciler};
use crate::reconciler::{Outcome, Requeue};
use crds::{Cluster, MachinePool, FAILURE_REASON_INVALID_CONFIGURATION};
use kube::ResourceExt;
use tracing::{debug, error};

impl ExternalReconciler {
    /// Reconciles the infrastructure provider for a machine pool.
    pub(crate) async fn reconcile_infrastructure(
        &self,
        cluster: &Cluster,
        pool: &mut MachinePool,
    ) -> Result<Outcome, ControllerError> {
        let name = pool.name_any();
        let namespace = pool.namespace().unwrap_or_else(|| "default".to_string());
        let reference = pool.spec.infrastructure_ref.clone();
        let ref_namespace = reference.namespace.clone().unwrap_or_else(|| namespace.clone());

        let object = match self.reconcile(cluster, pool, &reference).await? {
            ExternalOutcome::Resolved(object) => object,
            ExternalOutcome::Paused => return Ok(Outcome::Done),
            ExternalOutcome::Missing(requeue) => {
                // An infrastructure object vanishing after it was ready means
                // someone deleted it out from under the pool.
                if pool.status.as_ref().is_some_and(|s| s.infrastructure_ready) {
                    error!(
                        "MachinePool {}/{} infrastructure resource {} {}/{} has been deleted after being ready",
                        namespace, name, reference.kind, ref_namespace, reference.name
                    );
                    let status = pool.status_mut();
                    status.failure_reason = Some(FAILURE_REASON_INVALID_CONFIGURATION.to_string());
                    status.failure_message = Some(format!(
                        "MachinePool infrastructure resource {} {}/{} has been deleted after being ready",
                        reference.kind, ref_namespace, reference.name
                    ));
                }
                return Ok(Outcome::Requeue(requeue));
            }
        };

        if object.metadata.deletion_timestamp.is_some() {
            debug!(
                "Infrastructure provider for MachinePool {}/{} is being deleted, skipping",
                namespace, name
            );
            return Ok(Outcome::Done);
        }

        let ready = is_ready(&object).map_err(|e| {
            ControllerError::ExternalData(format!(
                "failed to determine readiness of infrastructure provider for MachinePool {}/{}: {}",
                namespace, name, e
            ))
        })?;
        pool.status_mut().infrastructure_ready = ready;
        if !ready {
            debug!("Infrastructure provider for MachinePool {}/{} is not ready", namespace, name);
            return Ok(Outcome::Requeue(Requeue::external_ready_wait(format!(
                "infrastructure provider for MachinePool {}/{} is not ready",
                namespace, name
            ))));
        }

        let provider_ids = read_string_list(&object, &["spec", "providerIDList"])
            .map_err(|e| {
                ControllerError::ExternalData(format!(
                    "failed to retrieve spec.providerIDList from infrastructure provider for MachinePool {}/{}: {}",
                    namespace, name, e
                ))
            })?
            .ok_or_else(|| {
                ControllerError::ExternalData(format!(
                    "failed to retrieve spec.providerIDList from infrastructure provider for MachinePool {}/{}",
                    namespace, name
                ))
            })?;
        if provider_ids.is_empty() {
            return Ok(Outcome::Requeue(Requeue::external_ready_wait(format!(
                "retrieved empty spec.providerIDList from infrastructure provider for MachinePool {}/{}",
                namespace, name
            ))));
        }

        if let Some(observed) = read_int(&object, &["status", "replicas"]).map_err(|e| {
            ControllerError::ExternalData(format!(
                "failed to retrieve status.replicas from infrastructure provider for MachinePool {}/{}: {}",
                namespace, name, e
            ))
        })? {
            let observed = i32::try_from(observed).map_err(|_| {
                ControllerError::ExternalData(format!(
                    "retrieved out-of-range status.replicas from infrastructure provider for MachinePool {}/{}",
                    namespace, name
                ))
            })?;
            pool.status_mut().replicas = observed;
            if observed == 0 {
                return Ok(Outcome::Requeue(Requeue::external_ready_wait(format!(
                    "retrieved unset status.replicas from infrastructure provider for MachinePool {}/{}",
                    namespace, name
                ))));
            }
        }

        if pool.spec.provider_id_list != provider_ids {
            debug!(
                "MachinePool {}/{} provider ID list changed, resetting ready counters",
                namespace, name
            );
            pool.spec.provider_id_list = provider_ids;
            let status = pool.status_mut();
            status.ready_replicas = 0;
            status.available_replicas = 0;
            status.unavailable_replicas = status.replicas;
        }

        Ok(Outcome::Done)
    }
}
