//! Match and chain-resolution endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use demwatch_common::sharecode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::chain::ResolveOutcome;
use crate::db::{codes, demos, matches};
use crate::db::matches::{NewMatch, SOURCE_MANUAL};
use crate::demo::{AcquireJob, ParseJob};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ResolveRequest {
    /// Seed share code; defaults to the most recently stored code
    pub seed: Option<String>,
}

/// POST /users/:user_id/resolve - walk the match-code chain for a user
///
/// Runs inline rather than through a queue because the caller wants the
/// discovered codes back; the resolver's own depth bound and pacing keep
/// the request from running long.
pub async fn resolve_chain(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Option<Json<ResolveRequest>>,
) -> ApiResult<Json<ResolveOutcome>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let outcome = state
        .resolver
        .resolve(&user_id, request.seed.as_deref())
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct AddMatchRequest {
    pub user_id: String,
    pub share_code: String,
}

/// POST /matches/add - manually register a match by share code
///
/// Mirrors what chain resolution does for a discovered code: store the
/// code, create a placeholder match and artifact, and enqueue acquisition.
/// A code already on record is a success no-op.
pub async fn add_match(
    State(state): State<AppState>,
    Json(request): Json<AddMatchRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
    }

    let code = sharecode::normalize(&request.share_code)?;
    let decoded = sharecode::decode(&code)?;

    // Manual adds feed the code store too, so they can seed later resolution
    codes::insert_or_skip(&state.db, &request.user_id, &code, &decoded).await?;

    let new = NewMatch {
        user_id: request.user_id.clone(),
        source: SOURCE_MANUAL.to_string(),
        share_code: Some(code.clone()),
        finished_at: Utc::now(),
        ..Default::default()
    };

    let Some(match_guid) = matches::insert(&state.db, &new).await? else {
        info!(user = %request.user_id, code = %code, "Share code already registered");
        return Ok((
            StatusCode::OK,
            Json(json!({ "created": false, "share_code": code })),
        ));
    };

    if let Some(artifact_guid) = demos::create(&state.db, &match_guid, &decoded).await? {
        if let Err(e) = state
            .acquire_queue
            .submit(AcquireJob { artifact_guid })
            .await
        {
            // The pending artifact row remains; the retry loop covers it
            warn!(match_guid = %match_guid, "Could not enqueue acquisition: {}", e);
        }
    }

    info!(user = %request.user_id, match_guid = %match_guid, "Match added manually");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "created": true,
            "match_guid": match_guid,
            "share_code": code,
        })),
    ))
}

/// GET /matches/:match_guid - one persisted match, joined with its artifact
pub async fn get_match(
    State(state): State<AppState>,
    Path(match_guid): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = matches::get(&state.db, &match_guid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No match {match_guid}")))?;

    let artifact = demos::get_by_match(&state.db, &match_guid).await?;
    let demo = artifact.map(|a| {
        json!({
            "artifact_guid": a.artifact_guid,
            "status": a.status,
            "size_bytes": a.size_bytes,
            "sha256": a.sha256,
            "downloaded_at": a.downloaded_at,
        })
    });

    Ok(Json(json!({ "match": record, "demo": demo })))
}

/// POST /matches/:match_guid/parse - request (re-)parsing of a match's demo
pub async fn trigger_parse(
    State(state): State<AppState>,
    Path(match_guid): Path<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let artifact = demos::get_by_match(&state.db, &match_guid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No demo artifact for match {match_guid}")))?;

    let deadline =
        Utc::now() + Duration::seconds(state.config.parse.wait_for_download_secs as i64);
    state
        .parse_queue
        .submit(ParseJob {
            artifact_guid: artifact.artifact_guid,
            deadline,
        })
        .await
        .map_err(|_| ApiError::TryLater("Parse queue is unavailable".to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "match_guid": match_guid })),
    ))
}
