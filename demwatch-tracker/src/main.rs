//! demwatch-tracker - game match tracking service
//!
//! Ingests live game-state telemetry, resolves historical match-code
//! chains, and acquires and parses demo artifacts in the background.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use demwatch_tracker::config::TrackerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting demwatch-tracker");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(TrackerConfig::load()?);

    let data_dir = config.data_dir();
    demwatch_common::config::ensure_data_dir(&data_dir)?;
    info!("Data folder: {}", data_dir.display());

    let db_path = data_dir.join("demwatch.db");
    let db = demwatch_tracker::db::init_database_pool(&db_path).await?;
    info!("Database: {}", db_path.display());

    let cancel = CancellationToken::new();
    let state = demwatch_tracker::spawn_service(db, Arc::clone(&config), &data_dir, cancel.clone())?;
    let app = demwatch_tracker::build_router(state);

    let bind_addr = config.bind_addr().to_string();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    info!("demwatch-tracker stopped");
    Ok(())
}

/// Resolve on Ctrl-C and cancel all background work
async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Could not install Ctrl-C handler: {}", e);
        // Without a signal handler there is nothing to wait for; keep
        // serving until the process is killed externally.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    cancel.cancel();
}
