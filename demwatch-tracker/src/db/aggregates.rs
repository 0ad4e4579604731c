//! Per-player lifetime aggregates
//!
//! Recomputed from the matches table after each successful demo parse (and
//! available to any other caller). Recomputation failure is non-fatal to
//! the triggering operation; callers log and continue.

use chrono::Utc;
use demwatch_common::Result;
use sqlx::{Row, SqlitePool};

/// Recompute a user's aggregate row from their match history
pub async fn recompute_for_user(pool: &SqlitePool, user_id: &str) -> Result<()> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*)                          AS matches,
            COALESCE(SUM(is_win), 0)          AS wins,
            COALESCE(SUM(kills), 0)           AS kills,
            COALESCE(SUM(deaths), 0)          AS deaths,
            COALESCE(SUM(assists), 0)         AS assists,
            COALESCE(SUM(mvps), 0)            AS mvps,
            COALESCE(SUM(headshots), 0)       AS headshots,
            COALESCE(SUM(damage), 0)          AS damage,
            COALESCE(SUM(triple_kills), 0)    AS triple_kills,
            COALESCE(SUM(quad_kills), 0)      AS quad_kills,
            COALESCE(SUM(aces), 0)            AS aces,
            AVG(rating)                       AS avg_rating
        FROM matches
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let matches: i64 = row.get("matches");
    let wins: i64 = row.get("wins");
    let kills: i64 = row.get("kills");
    let deaths: i64 = row.get("deaths");
    let assists: i64 = row.get("assists");
    let mvps: i64 = row.get("mvps");
    let headshots: i64 = row.get("headshots");
    let damage: i64 = row.get("damage");
    let triple_kills: i64 = row.get("triple_kills");
    let quad_kills: i64 = row.get("quad_kills");
    let aces: i64 = row.get("aces");
    let avg_rating: Option<f64> = row.get("avg_rating");

    sqlx::query(
        r#"
        INSERT INTO player_aggregates (
            user_id, matches, wins, kills, deaths, assists, mvps,
            headshots, damage, triple_kills, quad_kills, aces,
            avg_rating, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            matches = excluded.matches,
            wins = excluded.wins,
            kills = excluded.kills,
            deaths = excluded.deaths,
            assists = excluded.assists,
            mvps = excluded.mvps,
            headshots = excluded.headshots,
            damage = excluded.damage,
            triple_kills = excluded.triple_kills,
            quad_kills = excluded.quad_kills,
            aces = excluded.aces,
            avg_rating = excluded.avg_rating,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(matches)
    .bind(wins)
    .bind(kills)
    .bind(deaths)
    .bind(assists)
    .bind(mvps)
    .bind(headshots)
    .bind(damage)
    .bind(triple_kills)
    .bind(quad_kills)
    .bind(aces)
    .bind(avg_rating)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a user's aggregate row as JSON-friendly pairs
pub async fn get_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Option<serde_json::Value>> {
    let row = sqlx::query("SELECT * FROM player_aggregates WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| {
        serde_json::json!({
            "user_id": r.get::<String, _>("user_id"),
            "matches": r.get::<i64, _>("matches"),
            "wins": r.get::<i64, _>("wins"),
            "kills": r.get::<i64, _>("kills"),
            "deaths": r.get::<i64, _>("deaths"),
            "assists": r.get::<i64, _>("assists"),
            "mvps": r.get::<i64, _>("mvps"),
            "headshots": r.get::<i64, _>("headshots"),
            "damage": r.get::<i64, _>("damage"),
            "triple_kills": r.get::<i64, _>("triple_kills"),
            "quad_kills": r.get::<i64, _>("quad_kills"),
            "aces": r.get::<i64, _>("aces"),
            "avg_rating": r.get::<Option<f64>, _>("avg_rating"),
            "updated_at": r.get::<String, _>("updated_at"),
        })
    }))
}
