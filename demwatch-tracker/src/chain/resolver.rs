//! Chain resolver
//!
//! Walks `next(seed)` in an explicit bounded loop with an accumulator:
//! never deeper than the configured maximum, a fixed delay between
//! successive calls, rate-limit aborts returning partial results, and
//! auth rejection distinguished between the first call (credentials are
//! actually bad) and a later depth (usually just exhaustion).
//!
//! Every newly discovered code becomes a placeholder match plus a demo
//! acquisition job; codes already known for the user are counted as
//! skipped and never re-inserted. The UNIQUE(user, code) constraint backs
//! this check against concurrent resolutions and manual adds.

use chrono::Utc;
use demwatch_common::sharecode::{self, DecodedCode};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::config::ChainConfig;
use crate::db::matches::{self, NewMatch, SOURCE_CHAIN};
use crate::db::{codes, demos};
use crate::demo::acquire::AcquireJob;
use crate::demo::queue::JobQueue;
use crate::error::ChainError;

use super::client::{ChainClient, ChainStep};

/// Why the walk stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Upstream reported the end of the chain
    Exhausted,
    /// The configured maximum depth was reached
    MaxDepth,
    /// Upstream rate limit; the results so far are still valid
    RateLimited,
}

/// Result of one chain resolution
#[derive(Debug, Clone, Serialize)]
pub struct ResolveOutcome {
    /// Newly discovered codes, in chain order
    pub discovered: Vec<String>,
    /// Codes already known for this user
    pub skipped: usize,
    pub reason: StopReason,
}

/// Chain walker
pub struct ChainResolver {
    db: SqlitePool,
    client: ChainClient,
    acquire_queue: JobQueue<AcquireJob>,
    max_depth: u32,
    step_delay: std::time::Duration,
}

impl ChainResolver {
    pub fn new(
        db: SqlitePool,
        client: ChainClient,
        acquire_queue: JobQueue<AcquireJob>,
        config: &ChainConfig,
    ) -> Self {
        Self {
            db,
            client,
            acquire_queue,
            max_depth: config.max_depth,
            step_delay: std::time::Duration::from_millis(config.step_delay_ms),
        }
    }

    /// Walk the chain for a user
    ///
    /// `seed` is the caller-supplied starting code; when `None`, the most
    /// recently stored code for the user is used. No seed anywhere is the
    /// distinct `NoSeed` condition, not a generic failure. Safe to re-run
    /// with an overlapping or identical seed.
    pub async fn resolve(
        &self,
        user_id: &str,
        seed: Option<&str>,
    ) -> Result<ResolveOutcome, ChainError> {
        let mut seed = match seed {
            Some(code) => sharecode::normalize(code)?,
            None => codes::latest_for_user(&self.db, user_id)
                .await?
                .ok_or_else(|| ChainError::NoSeed(user_id.to_string()))?,
        };

        let mut discovered = Vec::new();
        let mut skipped = 0usize;
        let mut reason = StopReason::MaxDepth;

        for depth in 0..self.max_depth {
            if depth > 0 {
                // Fixed pacing between successive upstream calls
                tokio::time::sleep(self.step_delay).await;
            }

            match self.client.next(user_id, &seed).await {
                Ok(ChainStep::Terminal) => {
                    reason = StopReason::Exhausted;
                    break;
                }
                Ok(ChainStep::Next(raw)) => {
                    let code = sharecode::normalize(&raw)?;
                    let decoded = sharecode::decode(&code)?;

                    if codes::insert_or_skip(&self.db, user_id, &code, &decoded).await? {
                        self.register_match(user_id, &code, &decoded).await?;
                        discovered.push(code.clone());
                    } else {
                        skipped += 1;
                    }

                    seed = code;
                }
                Err(ChainError::RateLimited) => {
                    // Partial results are not a failure
                    debug!(user = %user_id, depth, "Rate limited, returning partial results");
                    reason = StopReason::RateLimited;
                    break;
                }
                Err(ChainError::AuthRejected) if depth > 0 => {
                    // Past the first call this usually just means the chain
                    // is exhausted, not that credentials are bad.
                    debug!(user = %user_id, depth, "Auth rejection past first call, treating as exhaustion");
                    reason = StopReason::Exhausted;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            user = %user_id,
            discovered = discovered.len(),
            skipped,
            reason = ?reason,
            "Chain resolution finished"
        );

        Ok(ResolveOutcome {
            discovered,
            skipped,
            reason,
        })
    }

    /// Placeholder match + artifact + acquisition job for a new code
    ///
    /// Each step is a no-op on conflict, so a concurrent manual add or a
    /// second resolver cannot double-register.
    async fn register_match(
        &self,
        user_id: &str,
        code: &str,
        decoded: &DecodedCode,
    ) -> Result<(), ChainError> {
        let new = NewMatch {
            user_id: user_id.to_string(),
            source: SOURCE_CHAIN.to_string(),
            share_code: Some(code.to_string()),
            finished_at: Utc::now(),
            ..Default::default()
        };

        let Some(match_guid) = matches::insert(&self.db, &new).await? else {
            debug!(user = %user_id, code = %code, "Placeholder match already exists");
            return Ok(());
        };

        if let Some(artifact_guid) = demos::create(&self.db, &match_guid, decoded).await? {
            if let Err(e) = self.acquire_queue.submit(AcquireJob { artifact_guid }).await {
                // The artifact row stays pending; the retry loop or a
                // manual parse request can pick it up later.
                warn!(match_guid = %match_guid, "Could not enqueue acquisition: {}", e);
            }
        }

        Ok(())
    }
}
