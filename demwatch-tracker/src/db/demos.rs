//! Demo artifact storage
//!
//! One row per match awaiting or holding a binary replay. `status` is a
//! strict state machine:
//!
//! ```text
//! pending → downloading → { downloaded | unavailable | failed | expired }
//! downloaded → parsing → { parsed | parse_failed }
//! ```
//!
//! `unavailable` is distinct from `failed`: absence of the artifact on all
//! probed shards is commonly transient and carries a scheduled retry,
//! while `failed`/`parse_failed` record an error and are never retried
//! automatically.

use chrono::{DateTime, Utc};
use demwatch_common::{sharecode::DecodedCode, Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Artifact lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoStatus {
    Pending,
    Downloading,
    Downloaded,
    Unavailable,
    Failed,
    Expired,
    Parsing,
    Parsed,
    ParseFailed,
}

impl DemoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemoStatus::Pending => "pending",
            DemoStatus::Downloading => "downloading",
            DemoStatus::Downloaded => "downloaded",
            DemoStatus::Unavailable => "unavailable",
            DemoStatus::Failed => "failed",
            DemoStatus::Expired => "expired",
            DemoStatus::Parsing => "parsing",
            DemoStatus::Parsed => "parsed",
            DemoStatus::ParseFailed => "parse_failed",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "pending" => Ok(DemoStatus::Pending),
            "downloading" => Ok(DemoStatus::Downloading),
            "downloaded" => Ok(DemoStatus::Downloaded),
            "unavailable" => Ok(DemoStatus::Unavailable),
            "failed" => Ok(DemoStatus::Failed),
            "expired" => Ok(DemoStatus::Expired),
            "parsing" => Ok(DemoStatus::Parsing),
            "parsed" => Ok(DemoStatus::Parsed),
            "parse_failed" => Ok(DemoStatus::ParseFailed),
            other => Err(Error::Internal(format!("Unknown demo status: {other}"))),
        }
    }
}

/// A demo artifact row
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct DemoArtifact {
    pub artifact_guid: String,
    pub match_guid: String,
    pub match_id: i64,
    pub outcome_id: i64,
    pub token_id: i64,
    pub status: String,
    pub shard_index: Option<i64>,
    pub local_path: Option<String>,
    pub size_bytes: Option<i64>,
    pub sha256: Option<String>,
    pub error: Option<String>,
    pub retry_at: Option<String>,
    pub downloaded_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DemoArtifact {
    pub fn status(&self) -> Result<DemoStatus> {
        DemoStatus::parse(&self.status)
    }

    /// The decoded share-code triple this artifact was created from
    pub fn decoded(&self) -> DecodedCode {
        DecodedCode {
            match_id: self.match_id as u64,
            outcome_id: self.outcome_id as u64,
            token_id: self.token_id as u16,
        }
    }
}

/// Create a pending artifact row for a match
///
/// One artifact per match: a duplicate create is a no-op returning `None`.
pub async fn create(
    pool: &SqlitePool,
    match_guid: &str,
    decoded: &DecodedCode,
) -> Result<Option<String>> {
    let artifact_guid = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        INSERT INTO demo_artifacts (
            artifact_guid, match_guid, match_id, outcome_id, token_id,
            status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(match_guid) DO NOTHING
        "#,
    )
    .bind(&artifact_guid)
    .bind(match_guid)
    .bind(decoded.match_id as i64)
    .bind(decoded.outcome_id as i64)
    .bind(decoded.token_id as i64)
    .bind(DemoStatus::Pending.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        Ok(None)
    } else {
        Ok(Some(artifact_guid))
    }
}

/// Fetch one artifact by guid
pub async fn get(pool: &SqlitePool, artifact_guid: &str) -> Result<Option<DemoArtifact>> {
    let record =
        sqlx::query_as::<_, DemoArtifact>("SELECT * FROM demo_artifacts WHERE artifact_guid = ?")
            .bind(artifact_guid)
            .fetch_optional(pool)
            .await?;
    Ok(record)
}

/// Fetch the artifact owned by a match
pub async fn get_by_match(pool: &SqlitePool, match_guid: &str) -> Result<Option<DemoArtifact>> {
    let record =
        sqlx::query_as::<_, DemoArtifact>("SELECT * FROM demo_artifacts WHERE match_guid = ?")
            .bind(match_guid)
            .fetch_optional(pool)
            .await?;
    Ok(record)
}

/// Bare status transition (downloading, parsing, parsed, expired)
pub async fn set_status(pool: &SqlitePool, artifact_guid: &str, status: DemoStatus) -> Result<()> {
    sqlx::query("UPDATE demo_artifacts SET status = ?, updated_at = ? WHERE artifact_guid = ?")
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(artifact_guid)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record a successful download
pub async fn mark_downloaded(
    pool: &SqlitePool,
    artifact_guid: &str,
    shard_index: u32,
    local_path: &str,
    size_bytes: u64,
    sha256: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        UPDATE demo_artifacts SET
            status = ?, shard_index = ?, local_path = ?, size_bytes = ?,
            sha256 = ?, error = NULL, retry_at = NULL,
            downloaded_at = ?, updated_at = ?
        WHERE artifact_guid = ?
        "#,
    )
    .bind(DemoStatus::Downloaded.as_str())
    .bind(shard_index as i64)
    .bind(local_path)
    .bind(size_bytes as i64)
    .bind(sha256)
    .bind(&now)
    .bind(&now)
    .bind(artifact_guid)
    .execute(pool)
    .await?;
    Ok(())
}

/// No shard holds the artifact yet; schedule a future retry
pub async fn mark_unavailable(
    pool: &SqlitePool,
    artifact_guid: &str,
    retry_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE demo_artifacts SET status = ?, retry_at = ?, updated_at = ?
        WHERE artifact_guid = ?
        "#,
    )
    .bind(DemoStatus::Unavailable.as_str())
    .bind(retry_at.to_rfc3339())
    .bind(Utc::now().to_rfc3339())
    .bind(artifact_guid)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a terminal failure with its message
pub async fn mark_failed(
    pool: &SqlitePool,
    artifact_guid: &str,
    status: DemoStatus,
    error: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE demo_artifacts SET status = ?, error = ?, retry_at = NULL, updated_at = ?
        WHERE artifact_guid = ?
        "#,
    )
    .bind(status.as_str())
    .bind(error)
    .bind(Utc::now().to_rfc3339())
    .bind(artifact_guid)
    .execute(pool)
    .await?;
    Ok(())
}

/// Unavailable artifacts whose scheduled retry time has passed
pub async fn due_for_retry(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<DemoArtifact>> {
    let records = sqlx::query_as::<_, DemoArtifact>(
        r#"
        SELECT * FROM demo_artifacts
        WHERE status = ? AND retry_at IS NOT NULL AND retry_at <= ?
        "#,
    )
    .bind(DemoStatus::Unavailable.as_str())
    .bind(now.to_rfc3339())
    .fetch_all(pool)
    .await?;
    Ok(records)
}

/// Parsed artifacts still holding a local file downloaded before the cutoff
pub async fn parsed_with_file_before(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<DemoArtifact>> {
    let records = sqlx::query_as::<_, DemoArtifact>(
        r#"
        SELECT * FROM demo_artifacts
        WHERE status = ? AND local_path IS NOT NULL AND downloaded_at <= ?
        "#,
    )
    .bind(DemoStatus::Parsed.as_str())
    .bind(cutoff.to_rfc3339())
    .fetch_all(pool)
    .await?;
    Ok(records)
}

/// Forget the local file after cleanup removed it
pub async fn clear_local_file(pool: &SqlitePool, artifact_guid: &str) -> Result<()> {
    sqlx::query(
        "UPDATE demo_artifacts SET local_path = NULL, updated_at = ? WHERE artifact_guid = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(artifact_guid)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            DemoStatus::Pending,
            DemoStatus::Downloading,
            DemoStatus::Downloaded,
            DemoStatus::Unavailable,
            DemoStatus::Failed,
            DemoStatus::Expired,
            DemoStatus::Parsing,
            DemoStatus::Parsed,
            DemoStatus::ParseFailed,
        ] {
            assert_eq!(DemoStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(DemoStatus::parse("bogus").is_err());
    }
}
