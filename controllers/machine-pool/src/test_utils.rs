//! Test utilities for unit testing reconcilers

#[cfg(test)]
use crate::reconciler::external::ExternalReconciler;
#[cfg(test)]
use crate::store::{ExternalStore, StoreError, WatchRegistrar};
#[cfg(test)]
use async_trait::async_trait;
#[cfg(test)]
use crds::{Cluster, ClusterSpec, ExternalReference, MachinePool, MachinePoolSpec};
#[cfg(test)]
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
#[cfg(test)]
use kube::core::ErrorResponse;
#[cfg(test)]
use serde_json::Value;
#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Helper to create a test MachinePool with an infrastructure reference
#[cfg(test)]
pub fn create_test_machine_pool(name: &str, namespace: &str) -> MachinePool {
    let mut pool = MachinePool::new(
        name,
        MachinePoolSpec {
            cluster_name: "test-cluster".to_string(),
            replicas: 3,
            bootstrap: Default::default(),
            infrastructure_ref: create_test_infrastructure_ref(),
            provider_id_list: Vec::new(),
        },
    );
    pool.metadata.namespace = Some(namespace.to_string());
    pool.metadata.uid = Some("11111111-2222-3333-4444-555555555555".to_string());
    pool
}

/// Helper to create a test Cluster
#[cfg(test)]
pub fn create_test_cluster(name: &str, namespace: &str) -> Cluster {
    let mut cluster = Cluster::new(name, ClusterSpec { paused: false });
    cluster.metadata.namespace = Some(namespace.to_string());
    cluster
}

/// Helper to create a test bootstrap provider reference
#[cfg(test)]
pub fn create_test_bootstrap_ref() -> ExternalReference {
    ExternalReference::new(
        "bootstrap.fleetops.microscaler.io/v1alpha1".to_string(),
        "CloudInitConfig".to_string(),
        "test-bootstrap".to_string(),
    )
}

/// Helper to create a test infrastructure provider reference
#[cfg(test)]
pub fn create_test_infrastructure_ref() -> ExternalReference {
    ExternalReference::new(
        "infrastructure.fleetops.microscaler.io/v1alpha1".to_string(),
        "ProxmoxMachinePool".to_string(),
        "test-infra".to_string(),
    )
}

/// Helper to create a test provider object with the given payload
#[cfg(test)]
pub fn create_test_external_object(
    reference: &ExternalReference,
    namespace: &str,
    data: Value,
) -> DynamicObject {
    let ar = ApiResource::from_gvk(&reference.group_version_kind());
    let mut object = DynamicObject::new(&reference.name, &ar).within(namespace);
    object.data = data;
    object
}

/// Helper to create an ExternalReconciler backed by fakes
#[cfg(test)]
pub fn create_test_externals(
    store: Arc<FakeExternalStore>,
    registrar: Arc<FakeWatchRegistrar>,
) -> ExternalReconciler {
    ExternalReconciler::new(store, registrar)
}

#[cfg(test)]
fn fake_api_error(message: &str) -> StoreError {
    StoreError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

#[cfg(test)]
fn object_key(reference: &ExternalReference, namespace: &str) -> String {
    format!("{}/{}/{}", reference.kind, namespace, reference.name)
}

/// Fake external object store for testing
#[cfg(test)]
#[derive(Default)]
pub struct FakeExternalStore {
    objects: Mutex<HashMap<String, DynamicObject>>,
    patches: Mutex<Vec<DynamicObject>>,
    fail_get: Mutex<bool>,
    fail_patch: Mutex<bool>,
}

#[cfg(test)]
impl FakeExternalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&self, reference: &ExternalReference, namespace: &str, object: DynamicObject) {
        self.objects
            .lock()
            .unwrap()
            .insert(object_key(reference, namespace), object);
    }

    pub fn remove_object(&self, reference: &ExternalReference, namespace: &str) {
        self.objects.lock().unwrap().remove(&object_key(reference, namespace));
    }

    pub fn patched(&self) -> Vec<DynamicObject> {
        self.patches.lock().unwrap().clone()
    }

    pub fn set_fail_get(&self, fail: bool) {
        *self.fail_get.lock().unwrap() = fail;
    }

    pub fn set_fail_patch(&self, fail: bool) {
        *self.fail_patch.lock().unwrap() = fail;
    }
}

#[cfg(test)]
#[async_trait]
impl ExternalStore for FakeExternalStore {
    async fn get(&self, reference: &ExternalReference, namespace: &str) -> Result<DynamicObject, StoreError> {
        if *self.fail_get.lock().unwrap() {
            return Err(fake_api_error("get failed"));
        }
        self.objects
            .lock()
            .unwrap()
            .get(&object_key(reference, namespace))
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound(format!("{} {}/{}", reference.kind, namespace, reference.name))
            })
    }

    async fn patch_metadata(
        &self,
        reference: &ExternalReference,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<(), StoreError> {
        if *self.fail_patch.lock().unwrap() {
            return Err(fake_api_error("patch failed"));
        }
        self.patches.lock().unwrap().push(object.clone());
        self.objects
            .lock()
            .unwrap()
            .insert(object_key(reference, namespace), object.clone());
        Ok(())
    }
}

/// Fake watch registrar for testing
#[cfg(test)]
#[derive(Default)]
pub struct FakeWatchRegistrar {
    watches: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

#[cfg(test)]
impl FakeWatchRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watched(&self) -> Vec<String> {
        self.watches.lock().unwrap().clone()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[cfg(test)]
#[async_trait]
impl WatchRegistrar for FakeWatchRegistrar {
    async fn watch(&self, gvk: &GroupVersionKind) -> Result<(), StoreError> {
        if *self.fail.lock().unwrap() {
            return Err(fake_api_error("watch failed"));
        }
        self.watches
            .lock()
            .unwrap()
            .push(format!("{}/{}", gvk.group, gvk.kind));
        Ok(())
    }
}
