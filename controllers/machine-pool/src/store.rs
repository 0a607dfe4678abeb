//! Access to externally-managed provider objects.
//!
//! Bootstrap and infrastructure providers own arbitrary CRDs, so the
//! controller reaches their objects through dynamic APIs addressed by the
//! reference on the pool. The trait seams here keep the reconcilers
//! independent of the live cluster; production implementations sit below
//! them.

use async_trait::async_trait;
use crds::{ExternalReference, MachinePool};
use futures::StreamExt;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use kube_runtime::{watcher, WatchStreamExt};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Errors from the external object store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

/// Read and patch access to provider objects addressed by reference.
#[async_trait]
pub trait ExternalStore: Send + Sync {
    /// Fetches the referenced object from the given namespace.
    async fn get(
        &self,
        reference: &ExternalReference,
        namespace: &str,
    ) -> Result<DynamicObject, StoreError>;

    /// Persists the object's labels and owner references.
    async fn patch_metadata(
        &self,
        reference: &ExternalReference,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<(), StoreError>;
}

/// Registers standing watches on provider object kinds.
#[async_trait]
pub trait WatchRegistrar: Send + Sync {
    /// Ensures changes to objects of this kind re-trigger pool reconciliation.
    async fn watch(&self, gvk: &GroupVersionKind) -> Result<(), StoreError>;
}

/// Production store backed by the Kubernetes API.
pub struct KubeExternalStore {
    client: Client,
}

impl KubeExternalStore {
    /// Creates a store over the given client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, reference: &ExternalReference, namespace: &str) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(&reference.group_version_kind());
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }
}

#[async_trait]
impl ExternalStore for KubeExternalStore {
    async fn get(
        &self,
        reference: &ExternalReference,
        namespace: &str,
    ) -> Result<DynamicObject, StoreError> {
        match self.api(reference, namespace).get(&reference.name).await {
            Ok(object) => Ok(object),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(StoreError::NotFound(format!(
                "{} {}/{}",
                reference.kind, namespace, reference.name
            ))),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }

    async fn patch_metadata(
        &self,
        reference: &ExternalReference,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<(), StoreError> {
        // Only the metadata this controller owns; a full-object patch could
        // clobber concurrent provider writes.
        let patch = json!({
            "metadata": {
                "labels": object.metadata.labels,
                "ownerReferences": object.metadata.owner_references,
            }
        });
        self.api(reference, namespace)
            .patch(&reference.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Production registrar that spawns a watcher task per provider kind and
/// nudges the pool controller whenever an owned object changes.
pub struct DynamicWatchRegistrar {
    client: Client,
    trigger: mpsc::Sender<()>,
}

impl DynamicWatchRegistrar {
    /// Creates a registrar feeding the given trigger channel.
    pub fn new(client: Client, trigger: mpsc::Sender<()>) -> Self {
        Self { client, trigger }
    }
}

#[async_trait]
impl WatchRegistrar for DynamicWatchRegistrar {
    async fn watch(&self, gvk: &GroupVersionKind) -> Result<(), StoreError> {
        let api: Api<DynamicObject> =
            Api::all_with(self.client.clone(), &ApiResource::from_gvk(gvk));

        // List the kind once before spawning so an unservable kind fails the
        // registration instead of dying silently inside the task.
        api.list(&ListParams::default().limit(1)).await?;

        let kind = gvk.kind.clone();
        let trigger = self.trigger.clone();
        tokio::spawn(async move {
            let stream = watcher(api, watcher::Config::default())
                .default_backoff()
                .touched_objects();
            futures::pin_mut!(stream);
            while let Some(event) = stream.next().await {
                match event {
                    Ok(object) => {
                        if owned_by_machine_pool(&object) {
                            debug!("{} {} changed, re-queueing machine pools", kind, object.name_any());
                            if trigger.send(()).await.is_err() {
                                // Pool controller shut down; stop watching.
                                return;
                            }
                        }
                    }
                    Err(e) => warn!("Watch error for {}: {}", kind, e),
                }
            }
        });

        Ok(())
    }
}

fn owned_by_machine_pool(object: &DynamicObject) -> bool {
    object.metadata.owner_references.as_ref().is_some_and(|refs| {
        refs.iter().any(|r| {
            r.kind == MachinePool::kind(&()).as_ref()
                && r.api_version == MachinePool::api_version(&()).as_ref()
        })
    })
}
