//! Database access for demwatch-tracker
//!
//! SQLite via sqlx. Tables are created on startup; uniqueness constraints
//! are the cross-process concurrency backstop (user+code for discovered
//! matches, one artifact per match).

pub mod aggregates;
pub mod codes;
pub mod demos;
pub mod matches;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Connects to `demwatch.db` under the data folder, creating it if missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// In-memory pool for tests
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePool::connect("sqlite::memory:").await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tracker tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            match_guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            source TEXT NOT NULL,
            share_code TEXT,
            map TEXT,
            team TEXT,
            kills INTEGER NOT NULL DEFAULT 0,
            deaths INTEGER NOT NULL DEFAULT 0,
            assists INTEGER NOT NULL DEFAULT 0,
            mvps INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL DEFAULT 0,
            headshots INTEGER,
            damage INTEGER,
            triple_kills INTEGER,
            quad_kills INTEGER,
            aces INTEGER,
            rounds_won INTEGER,
            rounds_lost INTEGER,
            is_win INTEGER,
            rating REAL,
            label TEXT,
            demo_summary TEXT,
            started_at TEXT,
            finished_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per (user, code) for chain/manual matches; telemetry rows
    // have no share code and rely on the recency dedup window instead.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_matches_user_code
        ON matches(user_id, share_code) WHERE share_code IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_matches_user_finished
        ON matches(user_id, finished_at)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS demo_artifacts (
            artifact_guid TEXT PRIMARY KEY,
            match_guid TEXT NOT NULL UNIQUE,
            match_id INTEGER NOT NULL,
            outcome_id INTEGER NOT NULL,
            token_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            shard_index INTEGER,
            local_path TEXT,
            size_bytes INTEGER,
            sha256 TEXT,
            error TEXT,
            retry_at TEXT,
            downloaded_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chain_codes (
            code_guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            share_code TEXT NOT NULL,
            match_id INTEGER NOT NULL,
            outcome_id INTEGER NOT NULL,
            token_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(user_id, share_code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS player_aggregates (
            user_id TEXT PRIMARY KEY,
            matches INTEGER NOT NULL DEFAULT 0,
            wins INTEGER NOT NULL DEFAULT 0,
            kills INTEGER NOT NULL DEFAULT 0,
            deaths INTEGER NOT NULL DEFAULT 0,
            assists INTEGER NOT NULL DEFAULT 0,
            mvps INTEGER NOT NULL DEFAULT 0,
            headshots INTEGER NOT NULL DEFAULT 0,
            damage INTEGER NOT NULL DEFAULT 0,
            triple_kills INTEGER NOT NULL DEFAULT 0,
            quad_kills INTEGER NOT NULL DEFAULT 0,
            aces INTEGER NOT NULL DEFAULT 0,
            avg_rating REAL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
