//! Session expiry & persistence sweeper
//!
//! Periodic pass guaranteeing every session with real combat statistics is
//! durably persisted exactly once even when the terminal event never
//! arrives (disconnect, crash, dropped packet):
//!
//! - `inactivity ≤ age < max_retention`, unpersisted, nonzero stats →
//!   persist labeled "auto-saved due to inactivity", mark persisted, keep
//!   the entry (removal is deferred to the max-retention branch).
//! - `age ≥ max_retention` → best-effort persist labeled "incomplete" if
//!   still unpersisted with stats, then remove from tracking regardless of
//!   persistence outcome.
//! - All-zero sessions are never persisted, only dropped at max-retention.
//!
//! A persist failure is logged and retried on the next cycle while the
//! session remains under max-retention; one failing session never aborts
//! the rest of the pass.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{SweeperConfig, TelemetryConfig};
use crate::db::matches;
use crate::rating::RatingModel;
use crate::telemetry::ingestor::new_match_from_session;
use crate::telemetry::session::{Session, SessionStore};

/// Label for sessions persisted by the inactivity branch
pub const LABEL_AUTO_SAVED: &str = "auto-saved due to inactivity";

/// Label for sessions persisted at max-retention expiry
pub const LABEL_INCOMPLETE: &str = "incomplete";

/// Outcome counters for one sweep pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub examined: usize,
    pub auto_saved: usize,
    pub expired_persisted: usize,
    pub removed: usize,
    pub failures: usize,
}

/// Background session sweeper
pub struct Sweeper {
    db: SqlitePool,
    sessions: Arc<SessionStore>,
    rating: Arc<dyn RatingModel>,
    inactivity: Duration,
    max_retention: Duration,
    dedup_window: Duration,
    interval: std::time::Duration,
}

impl Sweeper {
    pub fn new(
        db: SqlitePool,
        sessions: Arc<SessionStore>,
        rating: Arc<dyn RatingModel>,
        config: &SweeperConfig,
        telemetry: &TelemetryConfig,
    ) -> Self {
        Self {
            db,
            sessions,
            rating,
            inactivity: Duration::seconds(config.inactivity_threshold_secs as i64),
            max_retention: Duration::seconds(config.max_retention_secs as i64),
            dedup_window: Duration::seconds(telemetry.dedup_window_secs as i64),
            interval: std::time::Duration::from_secs(config.interval_secs),
        }
    }

    /// Fixed-interval sweep loop, independent of request traffic
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("Session sweeper started (interval {:?})", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh start does
        // not sweep an empty store.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let stats = self.sweep_once().await;
                    if stats.examined > 0 {
                        info!(
                            examined = stats.examined,
                            auto_saved = stats.auto_saved,
                            expired_persisted = stats.expired_persisted,
                            removed = stats.removed,
                            failures = stats.failures,
                            "Sweep pass complete"
                        );
                    }
                }
            }
        }
        info!("Session sweeper stopped");
    }

    /// One sweep pass over all tracked sessions
    pub async fn sweep_once(&self) -> SweepStats {
        let now = Utc::now();
        let mut stats = SweepStats::default();

        for session in self.sessions.all().await {
            stats.examined += 1;
            let age = now - session.last_update;
            let player_id = session.player_id.clone();

            if age >= self.max_retention {
                if !session.persisted && session.has_combat_stats() {
                    match self.persist(&session, LABEL_INCOMPLETE).await {
                        Ok(true) => stats.expired_persisted += 1,
                        Ok(false) => {}
                        Err(e) => {
                            stats.failures += 1;
                            warn!(player = %player_id,
                                  "Best-effort persist at max retention failed: {}", e);
                        }
                    }
                }
                // Removal happens regardless of persistence outcome
                self.sessions.remove(&player_id).await;
                stats.removed += 1;
                debug!(player = %player_id, "Session removed at max retention");
            } else if age >= self.inactivity
                && !session.persisted
                && session.has_combat_stats()
            {
                match self.persist(&session, LABEL_AUTO_SAVED).await {
                    Ok(saved) => {
                        if saved {
                            stats.auto_saved += 1;
                        }
                        // Keep the entry; the max-retention branch owns
                        // removal so bookkeeping happens exactly once.
                        self.sessions
                            .update(&player_id, |s| s.persisted = true)
                            .await;
                    }
                    Err(e) => {
                        // Still under max retention: retried next cycle
                        stats.failures += 1;
                        warn!(player = %player_id, "Auto-save persist failed: {}", e);
                    }
                }
            }
        }

        stats
    }

    /// Persist one session; `false` means the dedup guard suppressed it
    async fn persist(&self, session: &Session, label: &str) -> demwatch_common::Result<bool> {
        if matches::recent_exists(
            &self.db,
            &session.player_id,
            session.map.as_deref(),
            self.dedup_window,
        )
        .await?
        {
            debug!(player = %session.player_id,
                   "Recent match exists, sweeper persist suppressed");
            return Ok(false);
        }

        let new = new_match_from_session(
            session,
            Some(label.to_string()),
            self.rating.as_ref(),
            session.last_update,
        );
        Ok(matches::insert(&self.db, &new).await?.is_some())
    }
}
