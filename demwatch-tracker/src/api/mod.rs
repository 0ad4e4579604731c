//! HTTP API for demwatch-tracker
//!
//! All routes are thin: inbound telemetry goes straight to the ingestion
//! channel, match work goes to the bounded job queues, and chain
//! resolution runs inline because callers want the discovered codes back.

pub mod health;
pub mod matches;
pub mod telemetry;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/telemetry", post(telemetry::ingest))
        .route("/users/:user_id/resolve", post(matches::resolve_chain))
        .route("/matches/add", post(matches::add_match))
        .route("/matches/:match_guid", get(matches::get_match))
        .route("/matches/:match_guid/parse", post(matches::trigger_parse))
}
