//! partyfleet fleet controller
//!
//! Hosts the reconciliation engine: wires the durable state manager and the
//! provisioner into the reconciler loop and runs it until interrupted. All
//! engine logic lives in the library; this binary is glue.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use partyfleet_controller::provisioner::MockProvisioner;
use partyfleet_controller::{FleetConfig, FleetReconciler};
use partyfleet_store::StateManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting partyfleet controller");

    let config = FleetConfig::from_env();
    info!(
        minimum_cluster_count = config.minimum_cluster_count,
        maximum_cluster_count = config.maximum_cluster_count,
        refresh_interval_ms = config.refresh_interval.as_millis() as u64,
        "Configuration loaded"
    );

    let manager = Arc::new(StateManager::new());
    let provisioner = Arc::new(MockProvisioner::new());
    let reconciler = FleetReconciler::new(manager, provisioner, config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler_handle = tokio::spawn(async move { reconciler.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    shutdown_tx.send(true)?;
    reconciler_handle.await?;

    Ok(())
}
