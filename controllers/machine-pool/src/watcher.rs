//! Watcher tasks for MachinePool resources.
//!
//! Runs the controller loop over MachinePool objects and a lightweight watch
//! on Cluster objects. Cluster changes (for example pausing or unpausing) are
//! funneled into the trigger channel so every pool is re-queued.

use crate::error::ControllerError;
use crate::reconciler::{Outcome, Reconciler};
use crds::{Cluster, MachinePool};
use futures::StreamExt;
use kube::Api;
use kube::ResourceExt;
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{watcher, Controller, WatchStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

/// Watches MachinePool and Cluster resources and drives reconciliation.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    machine_pool_api: Api<MachinePool>,
    cluster_api: Api<Cluster>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        machine_pool_api: Api<MachinePool>,
        cluster_api: Api<Cluster>,
    ) -> Self {
        Self {
            reconciler,
            machine_pool_api,
            cluster_api,
        }
    }

    /// Watches MachinePool resources. External events arriving on the
    /// trigger channel re-queue every pool.
    pub async fn watch_machine_pools(&self, triggers: mpsc::Receiver<()>) -> Result<(), ControllerError> {
        info!("Starting MachinePool watcher");

        let error_policy = |obj: Arc<MachinePool>, error: &ControllerError, _ctx: Arc<Reconciler>| {
            error!("Reconciliation error for MachinePool {}: {}", obj.name_any(), error);
            Action::requeue(Duration::from_secs(60))
        };

        let reconcile = |obj: Arc<MachinePool>, ctx: Arc<Reconciler>| async move {
            debug!("Reconciling MachinePool {}", obj.name_any());
            match ctx.reconcile_machine_pool(&obj).await {
                Ok(Outcome::Done) => Ok(Action::await_change()),
                Ok(Outcome::Requeue(requeue)) => {
                    debug!(
                        "Requeueing MachinePool {} after {:?}: {}",
                        obj.name_any(),
                        requeue.after,
                        requeue.reason
                    );
                    Ok(Action::requeue(requeue.after))
                }
                Err(e) => {
                    error!("Reconciliation failed for MachinePool {}: {}", obj.name_any(), e);
                    Err(e)
                }
            }
        };

        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(1))
            .concurrency(4);

        Controller::new(self.machine_pool_api.clone(), watcher::Config::default())
            .with_config(controller_config)
            .reconcile_all_on(ReceiverStream::new(triggers))
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                if let Err(e) = res {
                    error!("Controller error for MachinePool: {}", e);
                }
            })
            .await;

        Ok(())
    }

    /// Watches Cluster resources and re-queues all machine pools on change.
    pub async fn watch_clusters(&self, trigger: mpsc::Sender<()>) -> Result<(), ControllerError> {
        info!("Starting Cluster watcher");

        let stream = watcher(self.cluster_api.clone(), watcher::Config::default())
            .default_backoff()
            .touched_objects();
        futures::pin_mut!(stream);

        while let Some(event) = stream.next().await {
            match event {
                Ok(cluster) => {
                    debug!("Cluster {} changed, re-queueing machine pools", cluster.name_any());
                    if trigger.send(()).await.is_err() {
                        return Err(ControllerError::Watch(
                            "machine pool trigger channel closed".to_string(),
                        ));
                    }
                }
                Err(e) => {
                    error!("Cluster watch error: {}", e);
                }
            }
        }

        Ok(())
    }
}
