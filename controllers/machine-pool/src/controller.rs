//! Main controller orchestration.
//!
//! Wires the Kubernetes client, the external object store, the dynamic watch
//! registrar, and the reconciler together, then runs the watcher tasks until
//! one of them exits.

use crate::error::ControllerError;
use crate::reconciler::external::ExternalReconciler;
use crate::reconciler::Reconciler;
use crate::store::{DynamicWatchRegistrar, KubeExternalStore};
use crate::watcher::Watcher;
use crds::{Cluster, MachinePool};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Capacity of the channel feeding external events into the pool controller.
const TRIGGER_BUFFER: usize = 32;

/// The MachinePool controller.
pub struct Controller {
    machine_pool_watcher: JoinHandle<Result<(), ControllerError>>,
    cluster_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller, optionally scoped to a single namespace.
    pub async fn new(namespace: Option<String>) -> Result<Self, ControllerError> {
        info!("Initializing MachinePool Controller");

        let client = Client::try_default().await?;

        let (machine_pool_api, cluster_api): (Api<MachinePool>, Api<Cluster>) =
            match namespace.as_deref() {
                Some(ns) => (
                    Api::namespaced(client.clone(), ns),
                    Api::namespaced(client.clone(), ns),
                ),
                None => (Api::all(client.clone()), Api::all(client.clone())),
            };

        // External events (provider objects, clusters) nudge the controller
        // through this channel rather than through typed watches.
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_BUFFER);

        let store = Arc::new(KubeExternalStore::new(client.clone()));
        let registrar = Arc::new(DynamicWatchRegistrar::new(client.clone(), trigger_tx.clone()));
        let externals = ExternalReconciler::new(store, registrar);
        let reconciler = Arc::new(Reconciler::new(client, externals));

        let watcher_instance = Arc::new(Watcher::new(reconciler, machine_pool_api, cluster_api));

        // Start all watchers in background tasks
        let machine_pool_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move {
                watcher.watch_machine_pools(trigger_rx).await
            })
        };

        let cluster_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move {
                watcher.watch_clusters(trigger_tx).await
            })
        };

        Ok(Self {
            machine_pool_watcher,
            cluster_watcher,
        })
    }

    /// Runs the controller until one of the watcher tasks exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("MachinePool Controller running");

        // Wait for any watcher to exit (they should run forever)
        tokio::select! {
            result = &mut self.machine_pool_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("MachinePool watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("MachinePool watcher error: {}", e)))?;
            }
            result = &mut self.cluster_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Cluster watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("Cluster watcher error: {}", e)))?;
            }
        }

        Ok(())
    }
}
