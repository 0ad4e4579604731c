//! Background loop wiring
//!
//! A handful of independent timer-driven loops: the session sweeper, the
//! periodic bulk chain resync, the unavailable-artifact retry scan, and
//! the parsed-artifact cleanup. Every loop contains its failures per item
//! and keeps running until cancelled.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::ChainResolver;
use crate::config::TrackerConfig;
use crate::db::{codes, demos};
use crate::demo::{AcquireJob, JobQueue};
use crate::error::ChainError;
use crate::rating::RatingModel;
use crate::sweeper::Sweeper;
use crate::telemetry::SessionStore;

/// How often the unavailable-artifact retry scan runs
const RETRY_SCAN_INTERVAL: Duration = Duration::from_secs(600);

/// Spawn all timer-driven background loops
pub fn spawn_background_loops(
    db: SqlitePool,
    config: Arc<TrackerConfig>,
    sessions: Arc<SessionStore>,
    rating: Arc<dyn RatingModel>,
    resolver: Arc<ChainResolver>,
    acquire_queue: JobQueue<AcquireJob>,
    data_dir: PathBuf,
    cancel: CancellationToken,
) {
    let sweeper = Arc::new(Sweeper::new(
        db.clone(),
        Arc::clone(&sessions),
        rating,
        &config.sweeper,
        &config.telemetry,
    ));
    tokio::spawn(sweeper.run(cancel.clone()));

    if config.chain.resync_interval_secs > 0 {
        tokio::spawn(resync_loop(
            db.clone(),
            resolver,
            Duration::from_secs(config.chain.resync_interval_secs),
            cancel.clone(),
        ));
    }

    tokio::spawn(retry_loop(db.clone(), acquire_queue, cancel.clone()));

    tokio::spawn(cleanup_loop(
        db,
        Duration::from_secs(config.cleanup.interval_secs),
        config.cleanup.max_artifact_age_days,
        data_dir,
        cancel,
    ));
}

/// Periodic bulk resync: walk the chain for every user with stored codes
async fn resync_loop(
    db: SqlitePool,
    resolver: Arc<ChainResolver>,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!("Chain resync loop started (interval {:?})", interval);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let users = match codes::users_with_codes(&db).await {
                    Ok(users) => users,
                    Err(e) => {
                        warn!("Resync could not list users: {}", e);
                        continue;
                    }
                };

                for user_id in users {
                    match resolver.resolve(&user_id, None).await {
                        Ok(outcome) => {
                            if !outcome.discovered.is_empty() {
                                info!(user = %user_id, discovered = outcome.discovered.len(),
                                      "Resync discovered new matches");
                            }
                        }
                        Err(ChainError::AuthRejected) => {
                            warn!(user = %user_id, "Resync auth rejected, skipping user");
                        }
                        Err(e) => {
                            // Transient upstream trouble; next cycle retries
                            warn!(user = %user_id, "Resync failed: {}", e);
                        }
                    }
                }
            }
        }
    }
    info!("Chain resync loop stopped");
}

/// Re-enqueue unavailable artifacts whose scheduled retry time has passed
async fn retry_loop(db: SqlitePool, queue: JobQueue<AcquireJob>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(RETRY_SCAN_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let due = match demos::due_for_retry(&db, Utc::now()).await {
                    Ok(due) => due,
                    Err(e) => {
                        warn!("Retry scan failed: {}", e);
                        continue;
                    }
                };

                for artifact in due {
                    debug!(artifact = %artifact.artifact_guid, "Retrying unavailable artifact");
                    if let Err(e) = queue
                        .submit(AcquireJob {
                            artifact_guid: artifact.artifact_guid.clone(),
                        })
                        .await
                    {
                        warn!("Could not enqueue retry: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

/// Delete local files of parsed artifacts past the retention age
async fn cleanup_loop(
    db: SqlitePool,
    interval: Duration,
    max_age_days: i64,
    data_dir: PathBuf,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let cutoff = Utc::now() - ChronoDuration::days(max_age_days);
                let stale = match demos::parsed_with_file_before(&db, cutoff).await {
                    Ok(stale) => stale,
                    Err(e) => {
                        warn!("Artifact cleanup scan failed: {}", e);
                        continue;
                    }
                };

                for artifact in stale {
                    let Some(path) = artifact.local_path.as_deref() else { continue };
                    // Guard against rows pointing outside the demo folder
                    let path = PathBuf::from(path);
                    if !path.starts_with(&data_dir) {
                        warn!(path = %path.display(), "Refusing to delete file outside data dir");
                        continue;
                    }
                    let removed = match tokio::fs::remove_file(&path).await {
                        Ok(()) => true,
                        // Someone else already removed it; the row is still stale
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
                        Err(e) => {
                            warn!(path = %path.display(), "Could not remove artifact file: {}", e);
                            false
                        }
                    };
                    if removed {
                        if let Err(e) = demos::clear_local_file(&db, &artifact.artifact_guid).await
                        {
                            warn!("Could not clear local path: {}", e);
                        } else {
                            debug!(artifact = %artifact.artifact_guid, "Cleaned up artifact file");
                        }
                    }
                }
            }
        }
    }
}
