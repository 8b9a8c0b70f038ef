//! veristated - session state engine daemon.
//!
//! Boots the engine core: configuration, database, permission registry
//! warm-up and the mailbox retention sweeper. Outer transports (HTTP
//! routing, client connections) attach to the engine through the library
//! API and are not part of this binary.

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use veristate::config::Config;
use veristate::db::Database;
use veristate::delivery::InProcessDelivery;
use veristate::engine::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        aggregator = %config.engine.aggregator_module_id,
        exclusive_locks = config.engine.exclusive_locks,
        "Starting veristated"
    );

    let db = Database::new(&config.database.path).await?;

    let delivery = Arc::new(InProcessDelivery::new());
    let engine = Engine::new(config.engine.clone(), db, delivery).await?;

    let retention_task = engine.spawn_retention_task();
    info!(
        retention_days = config.engine.mailbox_retention_days,
        purge_interval_secs = config.engine.purge_interval_secs,
        "Mailbox retention sweeper started"
    );

    info!("Engine ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    retention_task.abort();

    Ok(())
}
