//! Telemetry ingestion endpoint

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::telemetry::Snapshot;
use crate::AppState;

/// POST /telemetry - accept a game-state snapshot
///
/// The snapshot is validated by deserialization and handed to the
/// ingestion channel; processing happens off the request path so the
/// game client never waits on database work.
pub async fn ingest(
    State(state): State<AppState>,
    Json(snapshot): Json<Snapshot>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    match state.telemetry_tx.try_send(snapshot) {
        Ok(()) => Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))),
        Err(TrySendError::Full(_)) => {
            warn!("Telemetry channel full, rejecting snapshot");
            Err(ApiError::TryLater(
                "Telemetry ingestion is saturated".to_string(),
            ))
        }
        Err(TrySendError::Closed(_)) => Err(ApiError::Internal(
            "Telemetry ingestor is not running".to_string(),
        )),
    }
}
