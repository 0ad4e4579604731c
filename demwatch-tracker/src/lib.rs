//! demwatch-tracker library interface
//!
//! Exposes the service internals for integration testing and hosts the
//! shared application state and router assembly.

pub mod api;
pub mod chain;
pub mod config;
pub mod db;
pub mod demo;
pub mod error;
pub mod jobs;
pub mod rating;
pub mod sweeper;
pub mod telemetry;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::chain::{ChainClient, ChainResolver};
use crate::config::TrackerConfig;
use crate::demo::{AcquireJob, JobQueue, ParseJob};
use crate::rating::default_model;
use crate::telemetry::{Ingestor, SessionStore, Snapshot};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Service configuration
    pub config: Arc<TrackerConfig>,
    /// Live telemetry sessions, keyed by player id
    pub sessions: Arc<SessionStore>,
    /// Inbound channel to the telemetry ingestor
    pub telemetry_tx: mpsc::Sender<Snapshot>,
    /// Chain walker, shared by the resolve endpoint and the resync loop
    pub resolver: Arc<ChainResolver>,
    /// Demo acquisition queue handle
    pub acquire_queue: JobQueue<AcquireJob>,
    /// Demo parse queue handle
    pub parse_queue: JobQueue<ParseJob>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

/// Assemble the full service: worker pools, ingestor, background loops
///
/// Everything spawned here shuts down when `cancel` fires. Integration
/// tests call this against an in-memory pool and a temp data dir.
pub fn spawn_service(
    db: SqlitePool,
    config: Arc<TrackerConfig>,
    data_dir: &Path,
    cancel: CancellationToken,
) -> demwatch_common::Result<AppState> {
    let sessions = Arc::new(SessionStore::new());
    let rating = default_model();

    let (acquire_queue, parse_queue) =
        demo::spawn_pipelines(db.clone(), &config, data_dir, cancel.clone())?;

    let (telemetry_tx, telemetry_rx) = mpsc::channel(config.telemetry.queue_capacity);
    let ingestor = Arc::new(Ingestor::new(
        db.clone(),
        Arc::clone(&sessions),
        Arc::clone(&rating),
        &config.telemetry,
    ));
    tokio::spawn(ingestor.run(telemetry_rx, cancel.clone()));

    let client = ChainClient::new(&config.chain)
        .map_err(|e| demwatch_common::Error::Config(e.to_string()))?;
    let resolver = Arc::new(ChainResolver::new(
        db.clone(),
        client,
        acquire_queue.clone(),
        &config.chain,
    ));

    jobs::spawn_background_loops(
        db.clone(),
        Arc::clone(&config),
        Arc::clone(&sessions),
        rating,
        Arc::clone(&resolver),
        acquire_queue.clone(),
        data_dir.to_path_buf(),
        cancel,
    );

    Ok(AppState {
        db,
        config,
        sessions,
        telemetry_tx,
        resolver,
        acquire_queue,
        parse_queue,
        startup_time: Utc::now(),
    })
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
