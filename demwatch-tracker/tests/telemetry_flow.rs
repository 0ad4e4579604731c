//! End-to-end telemetry ingestion: snapshots in, persisted matches out

mod common;

use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use demwatch_tracker::config::TelemetryConfig;
use demwatch_tracker::db;
use demwatch_tracker::rating::default_model;
use demwatch_tracker::telemetry::{Ingestor, SessionStore};

const PLAYER: &str = "76561198000000001";

fn ingestor(db: SqlitePool, sessions: Arc<SessionStore>) -> Ingestor {
    Ingestor::new(db, sessions, default_model(), &TelemetryConfig::default())
}

async fn match_rows(pool: &SqlitePool) -> Vec<(String, i64, i64, Option<bool>)> {
    sqlx::query("SELECT user_id, kills, deaths, is_win FROM matches ORDER BY created_at")
        .fetch_all(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|row| {
            (
                row.get("user_id"),
                row.get("kills"),
                row.get("deaths"),
                row.get("is_win"),
            )
        })
        .collect()
}

#[tokio::test]
async fn full_match_lifecycle_persists_exactly_one_row() {
    let pool = db::init_memory_pool().await.unwrap();
    let sessions = Arc::new(SessionStore::new());
    let ingestor = ingestor(pool.clone(), Arc::clone(&sessions));

    // Warmup: no session yet
    let snap = common::snapshot(PLAYER, Some("warmup"), None, 0, 0, 0, 0);
    ingestor.handle_snapshot(snap).await.unwrap();
    assert!(sessions.is_empty().await);

    // Going live creates the session
    let snap = common::snapshot(PLAYER, Some("live"), Some("live"), 5, 1, 3, 2);
    ingestor.handle_snapshot(snap).await.unwrap();
    assert_eq!(sessions.len().await, 1);

    // Counters are cumulative overwrites, not additions
    let snap = common::snapshot(PLAYER, Some("live"), Some("live"), 10, 3, 10, 8);
    ingestor.handle_snapshot(snap).await.unwrap();
    let session = sessions.get(PLAYER).await.unwrap();
    assert_eq!(session.kills, 10);
    assert_eq!(session.deaths, 3);

    // Terminal event persists and drops the session
    let snap = common::snapshot(PLAYER, Some("gameover"), Some("over"), 10, 3, 13, 9);
    ingestor.handle_snapshot(snap).await.unwrap();
    assert!(sessions.is_empty().await);

    let rows = match_rows(&pool).await;
    assert_eq!(rows.len(), 1);
    let (user, kills, deaths, is_win) = &rows[0];
    assert_eq!(user, PLAYER);
    assert_eq!(*kills, 10);
    assert_eq!(*deaths, 3);
    assert_eq!(*is_win, Some(true));
}

#[tokio::test]
async fn duplicate_terminal_event_is_deduplicated() {
    let pool = db::init_memory_pool().await.unwrap();
    let sessions = Arc::new(SessionStore::new());
    let ingestor = ingestor(pool.clone(), Arc::clone(&sessions));

    let snap = common::snapshot(PLAYER, Some("live"), Some("live"), 7, 2, 9, 4);
    ingestor.handle_snapshot(snap).await.unwrap();

    let terminal = common::snapshot(PLAYER, Some("gameover"), Some("over"), 7, 2, 13, 4);
    ingestor.handle_snapshot(terminal.clone()).await.unwrap();
    // The game client resends the final state; second terminal must be a no-op
    ingestor.handle_snapshot(terminal).await.unwrap();

    assert_eq!(match_rows(&pool).await.len(), 1);
}

#[tokio::test]
async fn warmup_after_live_drops_session_without_persisting() {
    let pool = db::init_memory_pool().await.unwrap();
    let sessions = Arc::new(SessionStore::new());
    let ingestor = ingestor(pool.clone(), Arc::clone(&sessions));

    let snap = common::snapshot(PLAYER, Some("live"), Some("live"), 4, 4, 5, 5);
    ingestor.handle_snapshot(snap).await.unwrap();
    assert_eq!(sessions.len().await, 1);

    // Next match starting: leftover session is dropped, not saved
    let snap = common::snapshot(PLAYER, Some("warmup"), None, 0, 0, 0, 0);
    ingestor.handle_snapshot(snap).await.unwrap();

    assert!(sessions.is_empty().await);
    assert!(match_rows(&pool).await.is_empty());
}

#[tokio::test]
async fn terminal_without_stats_persists_nothing() {
    let pool = db::init_memory_pool().await.unwrap();
    let sessions = Arc::new(SessionStore::new());
    let ingestor = ingestor(pool.clone(), Arc::clone(&sessions));

    let snap = common::snapshot(PLAYER, Some("gameover"), Some("over"), 0, 0, 0, 0);
    ingestor.handle_snapshot(snap).await.unwrap();

    assert!(match_rows(&pool).await.is_empty());
}

#[tokio::test]
async fn two_players_get_independent_sessions() {
    let pool = db::init_memory_pool().await.unwrap();
    let sessions = Arc::new(SessionStore::new());
    let ingestor = ingestor(pool.clone(), Arc::clone(&sessions));

    let other = "76561198000000002";
    let snap = common::snapshot(PLAYER, Some("live"), Some("live"), 3, 0, 1, 0);
    ingestor.handle_snapshot(snap).await.unwrap();
    let snap = common::snapshot(other, Some("live"), Some("live"), 8, 1, 1, 0);
    ingestor.handle_snapshot(snap).await.unwrap();

    assert_eq!(sessions.len().await, 2);
    assert_eq!(sessions.get(PLAYER).await.unwrap().kills, 3);
    assert_eq!(sessions.get(other).await.unwrap().kills, 8);
}
