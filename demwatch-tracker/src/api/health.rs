//! Health endpoint

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::AppState;

/// GET /health - liveness plus a few operational gauges
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = (Utc::now() - state.startup_time).num_seconds();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime,
        "live_sessions": state.sessions.len().await,
        "acquire_queue_depth": state.acquire_queue.depth(),
        "parse_queue_depth": state.parse_queue.depth(),
    }))
}
