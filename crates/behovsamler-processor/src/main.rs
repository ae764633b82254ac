//! behovsamler service
//!
//! Main entry point for the need/solution accumulator.
//!
//! ## Overview
//! The service consumes a single topic carrying *need* records (which
//! enumerate required answer kinds) and *solution* records (which each
//! carry partial answers), joins them by correlation identifier, and
//! republishes an enriched record flagged `final` once every required
//! kind has been observed. State lives in a changelog-backed local store
//! and survives restart.
//!
//! ## Configuration
//! See [`behovsamler_processor::config`] for the environment variables.
//!
//! ## Logging
//! Logging is controlled via the `RUST_LOG` environment variable:
//! ```bash
//! RUST_LOG=debug behovsamler    # Detailed logs
//! RUST_LOG=info behovsamler     # Standard logs (default)
//! ```

use std::sync::Arc;

use behovsamler_log::MemoryLog;
use behovsamler_processor::{
    metrics, Accumulator, AppConfig, Runtime, RuntimeConfig, StoreRebalanceListener,
};
use behovsamler_state::{ChangelogStateStore, StateStore, StateStoreConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    metrics::register_metrics();

    let config = AppConfig::from_env()?;
    tracing::info!(
        topic = %config.bus.topic,
        group = %config.bus.group_id,
        state_dir = %config.state_dir,
        partitions = config.partitions,
        "starting behovsamler"
    );

    // State store, one changelog-backed section per owned partition.
    let store: Arc<dyn StateStore> = Arc::new(ChangelogStateStore::open(&StateStoreConfig {
        state_dir: config.state_dir.clone(),
        ..Default::default()
    })?);

    // The in-process log backs single-process deployments and local runs;
    // a broker-backed client plugs in behind the same consumer/producer
    // traits.
    let log = MemoryLog::new(config.partitions);

    let listener = Arc::new(StoreRebalanceListener::new(Arc::clone(&store)));
    let consumer = log.subscribe(&config.bus.group_id, Some(listener)).await;
    let accumulator = Accumulator::new(Arc::clone(&store), Arc::new(log.clone()));
    let runtime = Runtime::start(
        Box::new(consumer),
        accumulator,
        RuntimeConfig::from_bus_config(&config.bus),
    );

    tracing::info!("behovsamler running, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("shutdown requested");
    runtime.shutdown().await?;
    Ok(())
}
