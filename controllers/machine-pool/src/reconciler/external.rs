//! Shared reconciliation routine for provider-owned external objects.
//!
//! Both the bootstrap and infrastructure references resolve through the same
//! steps: fetch, pause check, ownership and label adoption, dynamic watch
//! registration, and failure mirroring. The provider-specific field handling
//! lives in the sibling modules.

use crate::error::ControllerError;
use crate::fields::failure_of;
use crate::reconciler::Requeue;
use crate::store::{ExternalStore, StoreError, WatchRegistrar};
use crds::{Cluster, ExternalReference, MachinePool, CLUSTER_NAME_LABEL, PAUSED_ANNOTATION};
use dashmap::DashSet;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info};

/// Tracks which external types already have a watch, so each api version and
/// kind pair is registered at most once per controller instance.
#[derive(Debug, Default)]
pub(crate) struct WatchRegistry {
    watched: DashSet<String>,
}

impl WatchRegistry {
    /// Claims the key, returning true only for the first claimant.
    fn claim(&self, key: &str) -> bool {
        self.watched.insert(key.to_string())
    }

    /// Releases a claim so a failed registration can be retried.
    fn release(&self, key: &str) {
        self.watched.remove(key);
    }
}

/// Result of resolving an external reference.
pub(crate) enum ExternalOutcome {
    /// The object exists and has been adopted
    Resolved(Box<DynamicObject>),
    /// The object is paused; leave it alone this pass
    Paused,
    /// The object does not exist yet; retry later
    Missing(Requeue),
}

/// Resolves and adopts provider objects referenced by machine pools.
pub struct ExternalReconciler {
    pub(crate) store: Arc<dyn ExternalStore>,
    pub(crate) registrar: Arc<dyn WatchRegistrar>,
    watches: WatchRegistry,
}

impl ExternalReconciler {
    /// Creates a new external reconciler.
    pub fn new(store: Arc<dyn ExternalStore>, registrar: Arc<dyn WatchRegistrar>) -> Self {
        Self {
            store,
            registrar,
            watches: WatchRegistry::default(),
        }
    }

    /// Runs the shared external-object routine for one reference.
    pub(crate) async fn reconcile(
        &self,
        cluster: &Cluster,
        pool: &mut MachinePool,
        reference: &ExternalReference,
    ) -> Result<ExternalOutcome, ControllerError> {
        let pool_name = pool.name_any();
        let pool_namespace = pool.namespace().ok_or_else(|| {
            ControllerError::InvalidConfig(format!("MachinePool {} has no namespace", pool_name))
        })?;
        let namespace = reference.namespace.clone().unwrap_or_else(|| pool_namespace.clone());

        let mut object = match self.store.get(reference, &namespace).await {
            Ok(object) => object,
            Err(StoreError::NotFound(_)) => {
                return Ok(ExternalOutcome::Missing(Requeue::external_ready_wait(format!(
                    "could not find {} {}/{} for MachinePool {}/{}",
                    reference.kind, namespace, reference.name, pool_namespace, pool_name
                ))));
            }
            Err(e) => return Err(e.into()),
        };

        if is_paused(cluster, &object.metadata) {
            debug!(
                "{} {}/{} is paused, skipping reconciliation",
                reference.kind, namespace, reference.name
            );
            return Ok(ExternalOutcome::Paused);
        }

        set_controller_reference(pool, &mut object)?;
        object
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(CLUSTER_NAME_LABEL.to_string(), pool.spec.cluster_name.clone());
        self.store.patch_metadata(reference, &namespace, &object).await?;

        let watch_key = format!("{}/{}", reference.api_version, reference.kind);
        if self.watches.claim(&watch_key) {
            info!("Adding watch on external object {}", watch_key);
            if let Err(e) = self.registrar.watch(&reference.group_version_kind()).await {
                self.watches.release(&watch_key);
                return Err(ControllerError::Watch(format!(
                    "failed to add watch on {}: {}",
                    watch_key, e
                )));
            }
        }

        let (failure_reason, failure_message) = failure_of(&object).map_err(|e| {
            ControllerError::ExternalData(format!(
                "failed to read failure fields from {} {}/{}: {}",
                reference.kind, namespace, reference.name, e
            ))
        })?;
        if let Some(reason) = failure_reason.filter(|r| !r.is_empty()) {
            pool.status_mut().failure_reason = Some(reason);
        }
        if let Some(message) = failure_message.filter(|m| !m.is_empty()) {
            pool.status_mut().failure_message = Some(format!(
                "Failure detected from referenced resource {} {}/{}: {}",
                reference.kind, namespace, reference.name, message
            ));
        }

        Ok(ExternalOutcome::Resolved(Box::new(object)))
    }
}

/// Marks the pool as the controller owner of the external object. Fails when
/// another controller already owns it.
fn set_controller_reference(pool: &MachinePool, object: &mut DynamicObject) -> Result<(), ControllerError> {
    let desired = pool.controller_owner_ref(&()).ok_or_else(|| {
        ControllerError::InvalidConfig(format!(
            "MachinePool {}/{} has no uid, cannot own provider objects",
            pool.namespace().unwrap_or_else(|| "default".to_string()),
            pool.name_any()
        ))
    })?;

    let object_name = object.name_any();
    let owner_refs = object.metadata.owner_references.get_or_insert_with(Vec::new);
    if let Some(existing) = owner_refs.iter_mut().find(|r| r.controller == Some(true)) {
        if existing.uid != desired.uid {
            return Err(ControllerError::Ownership(format!(
                "provider object {} is already controlled by {} {}",
                object_name, existing.kind, existing.name
            )));
        }
        *existing = desired;
        return Ok(());
    }

    owner_refs.retain(|r| r.uid != desired.uid);
    owner_refs.push(desired);
    Ok(())
}

/// A pool or provider object is paused when its owning cluster is paused or
/// when the object itself carries the pause annotation.
pub(crate) fn is_paused(cluster: &Cluster, meta: &ObjectMeta) -> bool {
    if cluster.spec.paused {
        return true;
    }
    meta.annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(PAUSED_ANNOTATION))
}
