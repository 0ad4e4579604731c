//! Telemetry ingestor
//!
//! Owns the per-snapshot state machine:
//! - no session + (live phase, or unspecified phase with counters) → create
//! - session + live → overwrite counters with the latest cumulative values
//! - terminal phase → finalize with a trailing dedup window, drop session
//! - warmup/intermission → drop any session without persisting (only the
//!   sweeper persists abandoned sessions)
//!
//! Counters are authoritative replacements, so duplicate or out-of-order
//! snapshots can only overwrite, never regress or double-count.

use chrono::{DateTime, Duration, Utc};
use demwatch_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TelemetryConfig;
use crate::db::matches::{self, NewMatch, SOURCE_TELEMETRY};
use crate::rating::{MatchFacts, RatingModel};

use super::session::{Session, SessionStore};
use super::snapshot::Snapshot;

/// Telemetry snapshot processor
pub struct Ingestor {
    db: SqlitePool,
    sessions: Arc<SessionStore>,
    rating: Arc<dyn RatingModel>,
    dedup_window: Duration,
}

impl Ingestor {
    pub fn new(
        db: SqlitePool,
        sessions: Arc<SessionStore>,
        rating: Arc<dyn RatingModel>,
        config: &TelemetryConfig,
    ) -> Self {
        Self {
            db,
            sessions,
            rating,
            dedup_window: Duration::seconds(config.dedup_window_secs as i64),
        }
    }

    /// Consume snapshots from the inbound channel until cancelled
    ///
    /// Per-snapshot failures are logged and never stop the loop.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Snapshot>, cancel: CancellationToken) {
        info!("Telemetry ingestor started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(snapshot) => {
                        let player = snapshot.player.steam_id.clone();
                        if let Err(e) = self.handle_snapshot(snapshot).await {
                            error!(player = %player, "Snapshot processing failed: {}", e);
                        }
                    }
                    None => break,
                },
            }
        }
        info!("Telemetry ingestor stopped");
    }

    /// Apply one snapshot to the session store
    pub async fn handle_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let player_id = snapshot.player.steam_id.clone();
        let now = Utc::now();

        if snapshot.is_terminal() {
            return self.finalize(&player_id, &snapshot, now).await;
        }

        if snapshot.is_match_start() {
            // New match starting. Any leftover session is dropped here
            // without persisting; abandoned-session persistence is the
            // sweeper's job alone.
            if self.sessions.remove(&player_id).await.is_some() {
                debug!(player = %player_id, "Dropped session at match start");
            }
            return Ok(());
        }

        let live = matches!(
            snapshot.match_phase(),
            Some(super::snapshot::MatchPhase::Live)
        );
        let counters_present = snapshot.player.match_stats.is_some();

        let updated = self
            .sessions
            .update(&player_id, |session| apply_snapshot(session, &snapshot, now))
            .await;

        if !updated && (live || (snapshot.match_phase().is_none() && counters_present)) {
            let mut session = Session::new(player_id.clone(), now);
            apply_snapshot(&mut session, &snapshot, now);
            self.sessions.insert(session).await;
            debug!(player = %player_id, "Created session");
        }

        Ok(())
    }

    /// Terminal-event path: persist once (dedup-guarded), drop the session
    async fn finalize(&self, player_id: &str, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<()> {
        let session = self.sessions.remove(player_id).await;

        let mut finished = match session {
            Some(session) => session,
            None => {
                // Terminal without a session: possibly a duplicate terminal
                // event, possibly a lost session. Rebuild what the snapshot
                // itself carries and let the dedup check decide.
                Session::new(player_id.to_string(), now)
            }
        };
        apply_snapshot(&mut finished, snapshot, now);

        if !finished.has_combat_stats() {
            debug!(player = %player_id, "Terminal event with no stats, nothing to persist");
            return Ok(());
        }

        if matches::recent_exists(&self.db, player_id, finished.map.as_deref(), self.dedup_window)
            .await?
        {
            debug!(player = %player_id, "Match already persisted within dedup window");
            return Ok(());
        }

        let new = new_match_from_session(&finished, None, self.rating.as_ref(), now);
        match matches::insert(&self.db, &new).await? {
            Some(guid) => {
                info!(player = %player_id, match_guid = %guid, kills = finished.kills,
                      "Persisted finished match");
            }
            None => {
                warn!(player = %player_id, "Match insert skipped by uniqueness constraint");
            }
        }

        Ok(())
    }
}

/// Overwrite session state with the snapshot's cumulative values
pub(crate) fn apply_snapshot(session: &mut Session, snapshot: &Snapshot, now: DateTime<Utc>) {
    if let Some(stats) = snapshot.player.match_stats {
        session.kills = stats.kills;
        session.deaths = stats.deaths;
        session.assists = stats.assists;
        session.mvps = stats.mvps;
        session.score = stats.score;
    }
    if let Some(name) = &snapshot.player.name {
        session.player_name = Some(name.clone());
    }
    if let Some(team) = snapshot.player.team {
        session.team = Some(team);
    }
    if let Some(map) = snapshot.map.as_ref().and_then(|m| m.name.clone()) {
        session.map = Some(map);
    }
    if let Some((won, lost)) = snapshot.team_scores() {
        session.rounds_won = won;
        session.rounds_lost = lost;
    }
    session.last_update = now;
}

/// Build a persistable match row from a session
pub(crate) fn new_match_from_session(
    session: &Session,
    label: Option<String>,
    rating: &dyn RatingModel,
    finished_at: DateTime<Utc>,
) -> NewMatch {
    let rounds = session.rounds_won + session.rounds_lost;
    let facts = MatchFacts {
        kills: session.kills,
        deaths: session.deaths,
        assists: session.assists,
        mvps: session.mvps,
        score: session.score,
        rounds,
    };

    NewMatch {
        user_id: session.player_id.clone(),
        source: SOURCE_TELEMETRY.to_string(),
        share_code: None,
        map: session.map.clone(),
        team: session.team.map(|t| t.as_str().to_string()),
        kills: session.kills,
        deaths: session.deaths,
        assists: session.assists,
        mvps: session.mvps,
        score: session.score,
        rounds_won: (rounds > 0).then_some(session.rounds_won),
        rounds_lost: (rounds > 0).then_some(session.rounds_lost),
        is_win: (rounds > 0).then_some(session.rounds_won > session.rounds_lost),
        rating: Some(rating.rate(&facts)),
        label,
        started_at: Some(session.started_at),
        finished_at,
    }
}
