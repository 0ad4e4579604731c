//! Persisted match storage
//!
//! One row per finalized match attempt. Rows are written by the terminal
//! telemetry path, the sweeper, the chain resolver (placeholders) and the
//! manual-add path; after creation only the parse pipeline touches a row,
//! attaching detailed demo stats.

use chrono::{DateTime, Duration, Utc};
use demwatch_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::demo::parser::DemoSummary;

/// Match discovery source
pub const SOURCE_TELEMETRY: &str = "telemetry";
pub const SOURCE_CHAIN: &str = "chain";
pub const SOURCE_MANUAL: &str = "manual";

/// A persisted match row
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct MatchRecord {
    pub match_guid: String,
    pub user_id: String,
    pub source: String,
    pub share_code: Option<String>,
    pub map: Option<String>,
    pub team: Option<String>,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub mvps: i64,
    pub score: i64,
    pub headshots: Option<i64>,
    pub damage: Option<i64>,
    pub triple_kills: Option<i64>,
    pub quad_kills: Option<i64>,
    pub aces: Option<i64>,
    pub rounds_won: Option<i64>,
    pub rounds_lost: Option<i64>,
    pub is_win: Option<bool>,
    pub rating: Option<f64>,
    pub label: Option<String>,
    pub demo_summary: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: String,
    pub created_at: String,
}

/// Fields for a new finalized match row
#[derive(Debug, Clone, Default)]
pub struct NewMatch {
    pub user_id: String,
    pub source: String,
    pub share_code: Option<String>,
    pub map: Option<String>,
    pub team: Option<String>,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub mvps: i64,
    pub score: i64,
    pub rounds_won: Option<i64>,
    pub rounds_lost: Option<i64>,
    pub is_win: Option<bool>,
    pub rating: Option<f64>,
    pub label: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
}

/// Insert a match row, returning its guid
///
/// For rows carrying a share code the UNIQUE(user_id, share_code) index is
/// the concurrency backstop: a conflicting insert returns `None` instead
/// of a second row.
pub async fn insert(pool: &SqlitePool, new: &NewMatch) -> Result<Option<String>> {
    let match_guid = Uuid::new_v4().to_string();
    let started_at = new.started_at.map(|dt| dt.to_rfc3339());
    let finished_at = new.finished_at.to_rfc3339();
    let created_at = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        INSERT INTO matches (
            match_guid, user_id, source, share_code, map, team,
            kills, deaths, assists, mvps, score,
            rounds_won, rounds_lost, is_win, rating, label,
            started_at, finished_at, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(&match_guid)
    .bind(&new.user_id)
    .bind(&new.source)
    .bind(&new.share_code)
    .bind(&new.map)
    .bind(&new.team)
    .bind(new.kills)
    .bind(new.deaths)
    .bind(new.assists)
    .bind(new.mvps)
    .bind(new.score)
    .bind(new.rounds_won)
    .bind(new.rounds_lost)
    .bind(new.is_win)
    .bind(new.rating)
    .bind(&new.label)
    .bind(&started_at)
    .bind(&finished_at)
    .bind(&created_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        Ok(None)
    } else {
        Ok(Some(match_guid))
    }
}

/// True if a match for this user/map finished within the trailing window
///
/// The dedup guard for duplicate terminal events and for the race between
/// the terminal path and the sweeper.
pub async fn recent_exists(
    pool: &SqlitePool,
    user_id: &str,
    map: Option<&str>,
    window: Duration,
) -> Result<bool> {
    let cutoff = (Utc::now() - window).to_rfc3339();

    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM matches
        WHERE user_id = ?
          AND source = ?
          AND finished_at >= ?
          AND (map IS NULL OR ? IS NULL OR map = ?)
        "#,
    )
    .bind(user_id)
    .bind(SOURCE_TELEMETRY)
    .bind(&cutoff)
    .bind(map)
    .bind(map)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Fetch one match by guid
pub async fn get(pool: &SqlitePool, match_guid: &str) -> Result<Option<MatchRecord>> {
    let record = sqlx::query_as::<_, MatchRecord>("SELECT * FROM matches WHERE match_guid = ?")
        .bind(match_guid)
        .fetch_optional(pool)
        .await?;
    Ok(record)
}

/// Match creation timestamp, for the acquisition freshness gate
pub async fn created_at(pool: &SqlitePool, match_guid: &str) -> Result<Option<DateTime<Utc>>> {
    let created: Option<String> =
        sqlx::query_scalar("SELECT created_at FROM matches WHERE match_guid = ?")
            .bind(match_guid)
            .fetch_optional(pool)
            .await?;

    match created {
        Some(text) => {
            let parsed = DateTime::parse_from_rfc3339(&text).map_err(|e| {
                demwatch_common::Error::Internal(format!("Bad created_at for {match_guid}: {e}"))
            })?;
            Ok(Some(parsed.with_timezone(&Utc)))
        }
        None => Ok(None),
    }
}

/// Attach a parsed demo summary to the owning match
///
/// Stores the structured result as an opaque JSON blob and unpacks the
/// owning user's per-player stats into the summary columns. Matches whose
/// user does not appear in the demo keep the blob only.
pub async fn attach_summary(
    pool: &SqlitePool,
    match_guid: &str,
    summary: &DemoSummary,
) -> Result<()> {
    let blob = serde_json::to_string(summary)
        .map_err(|e| demwatch_common::Error::Internal(format!("Serialize summary: {e}")))?;

    let user_id: Option<String> =
        sqlx::query_scalar("SELECT user_id FROM matches WHERE match_guid = ?")
            .bind(match_guid)
            .fetch_optional(pool)
            .await?;

    let user_id = user_id.ok_or_else(|| {
        demwatch_common::Error::NotFound(format!("Match {match_guid} for summary attach"))
    })?;

    let own = summary.players.get(&user_id);

    sqlx::query(
        r#"
        UPDATE matches SET
            demo_summary = ?,
            map = COALESCE(?, map),
            kills = COALESCE(?, kills),
            deaths = COALESCE(?, deaths),
            assists = COALESCE(?, assists),
            mvps = COALESCE(?, mvps),
            headshots = ?,
            damage = ?,
            triple_kills = ?,
            quad_kills = ?,
            aces = ?
        WHERE match_guid = ?
        "#,
    )
    .bind(&blob)
    .bind(Some(&summary.map))
    .bind(own.map(|p| p.kills))
    .bind(own.map(|p| p.deaths))
    .bind(own.map(|p| p.assists))
    .bind(own.map(|p| p.mvps))
    .bind(own.map(|p| p.headshots))
    .bind(own.map(|p| p.damage))
    .bind(own.map(|p| p.triple_kills))
    .bind(own.map(|p| p.quad_kills))
    .bind(own.map(|p| p.aces))
    .bind(match_guid)
    .execute(pool)
    .await?;

    Ok(())
}
