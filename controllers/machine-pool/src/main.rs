//! MachinePool Controller
//!
//! Reconciles MachinePool resources against externally-managed provider objects:
//! - adopts and labels the referenced bootstrap and infrastructure objects,
//!   watching them so their changes re-trigger pool reconciliation
//! - extracts the bootstrap data secret once the bootstrap provider is ready
//! - mirrors provider IDs and replica counts from the infrastructure provider
//! - derives the pool lifecycle phase from observed state
//!
//! This controller only mutates MachinePool status (plus the spec fields it
//! mirrors back); creating and deleting pools is left to their owners.

mod controller;
mod error;
mod fields;
mod reconciler;
mod store;
mod test_utils;
mod watcher;

use crate::error::ControllerError;
use controller::Controller;
use std::env;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting MachinePool Controller");

    // Configure rustls crypto provider (use ring for compatibility)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    // Load configuration from environment variables
    let namespace = env::var("WATCH_NAMESPACE").ok();

    info!("Configuration:");
    info!("  Namespace: {}", namespace.as_deref().unwrap_or("all namespaces"));

    // Initialize and run controller
    let controller = Controller::new(namespace).await?;
    controller.run().await?;

    Ok(())
}
