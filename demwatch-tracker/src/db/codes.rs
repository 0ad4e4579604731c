//! Chain code storage
//!
//! One immutable row per (user, normalized share code). The UNIQUE
//! constraint makes re-running chain resolution with an overlapping seed
//! harmless: conflicting inserts are skipped, never duplicated.

use chrono::Utc;
use demwatch_common::{sharecode::DecodedCode, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Insert a discovered code; `false` means it was already known
pub async fn insert_or_skip(
    pool: &SqlitePool,
    user_id: &str,
    share_code: &str,
    decoded: &DecodedCode,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO chain_codes (
            code_guid, user_id, share_code, match_id, outcome_id, token_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, share_code) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(share_code)
    .bind(decoded.match_id as i64)
    .bind(decoded.outcome_id as i64)
    .bind(decoded.token_id as i64)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Most recently stored code for a user, the default resolution seed
pub async fn latest_for_user(pool: &SqlitePool, user_id: &str) -> Result<Option<String>> {
    let code: Option<String> = sqlx::query_scalar(
        r#"
        SELECT share_code FROM chain_codes
        WHERE user_id = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(code)
}

/// All users with at least one stored code, for the periodic bulk resync
pub async fn users_with_codes(pool: &SqlitePool) -> Result<Vec<String>> {
    let users: Vec<String> = sqlx::query_scalar("SELECT DISTINCT user_id FROM chain_codes")
        .fetch_all(pool)
        .await?;
    Ok(users)
}
