//! Demo parse worker pool
//!
//! Waits for acquisition to finish, then runs the incremental parser and
//! persists the structured result. The wait never busy-holds a worker
//! slot: a job whose artifact is still pending/downloading is re-enqueued
//! after a poll interval, carrying its own deadline budget, and the worker
//! moves on. States: `parsing → {parsed | parse_failed}`; a failed parse
//! retains the downloaded file so a retry needs no re-acquisition.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ParseConfig;
use crate::db::demos::{self, DemoArtifact, DemoStatus};
use crate::db::{aggregates, matches};

use super::parser;
use super::queue::JobQueue;

/// One parse job with its wait-for-download budget
#[derive(Debug, Clone)]
pub struct ParseJob {
    pub artifact_guid: String,
    /// Latest instant the job may still be waiting for the download
    pub deadline: DateTime<Utc>,
}

/// Parse worker logic
pub struct ParseRunner {
    db: SqlitePool,
    /// Own queue handle, used for the scheduled re-check while waiting
    queue: JobQueue<ParseJob>,
    poll_interval: std::time::Duration,
}

impl ParseRunner {
    pub fn new(db: SqlitePool, queue: JobQueue<ParseJob>, config: &ParseConfig) -> Self {
        Self {
            db,
            queue,
            poll_interval: std::time::Duration::from_secs(config.poll_interval_secs),
        }
    }

    /// Worker entry point; contains all per-job error handling
    pub async fn handle(self: &Arc<Self>, job: ParseJob) {
        if let Err(e) = self.process(job).await {
            error!("Parse job failed: {}", e);
        }
    }

    async fn process(self: &Arc<Self>, job: ParseJob) -> demwatch_common::Result<()> {
        let artifact = match demos::get(&self.db, &job.artifact_guid).await? {
            Some(artifact) => artifact,
            None => {
                warn!(artifact = %job.artifact_guid, "Parse requested for unknown artifact");
                return Ok(());
            }
        };

        match artifact.status()? {
            // Duplicate/already-processed is a success no-op
            DemoStatus::Parsed | DemoStatus::Parsing => {
                debug!(artifact = %job.artifact_guid, "Already parsed or in progress");
                Ok(())
            }
            // Retry after a failed parse reuses the retained file
            DemoStatus::Downloaded | DemoStatus::ParseFailed => self.parse_now(&artifact).await,
            DemoStatus::Failed | DemoStatus::Expired | DemoStatus::Unavailable => {
                // Acquisition concluded without a file; propagate instead
                // of waiting out the budget.
                error!(
                    artifact = %job.artifact_guid,
                    status = %artifact.status,
                    "Acquisition did not produce an artifact, aborting parse"
                );
                Ok(())
            }
            DemoStatus::Pending | DemoStatus::Downloading => {
                if Utc::now() >= job.deadline {
                    error!(
                        artifact = %job.artifact_guid,
                        "Artifact still not downloaded at deadline, giving up"
                    );
                    return Ok(());
                }
                // Scheduled re-check; the worker slot is freed immediately
                debug!(artifact = %job.artifact_guid, "Artifact not downloaded yet, re-checking later");
                let queue = self.queue.clone();
                let poll = self.poll_interval;
                tokio::spawn(async move {
                    tokio::time::sleep(poll).await;
                    if let Err(e) = queue.submit(job).await {
                        warn!("Could not re-enqueue parse job: {}", e);
                    }
                });
                Ok(())
            }
        }
    }

    async fn parse_now(&self, artifact: &DemoArtifact) -> demwatch_common::Result<()> {
        let Some(local_path) = artifact.local_path.clone() else {
            demos::mark_failed(
                &self.db,
                &artifact.artifact_guid,
                DemoStatus::ParseFailed,
                "Downloaded artifact has no local file",
            )
            .await?;
            return Ok(());
        };

        demos::set_status(&self.db, &artifact.artifact_guid, DemoStatus::Parsing).await?;

        let bytes = match tokio::fs::read(&local_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                demos::mark_failed(
                    &self.db,
                    &artifact.artifact_guid,
                    DemoStatus::ParseFailed,
                    &format!("Read {local_path}: {e}"),
                )
                .await?;
                return Ok(());
            }
        };

        match parser::parse(&bytes) {
            Ok(summary) => {
                matches::attach_summary(&self.db, &artifact.match_guid, &summary).await?;
                demos::set_status(&self.db, &artifact.artifact_guid, DemoStatus::Parsed).await?;
                info!(
                    artifact = %artifact.artifact_guid,
                    map = %summary.map,
                    rounds = summary.rounds.len(),
                    "Demo parsed"
                );

                // Downstream aggregate recomputation: failure is logged,
                // never reverts the parse's own success.
                if let Some(owner) = matches::get(&self.db, &artifact.match_guid).await? {
                    if let Err(e) = aggregates::recompute_for_user(&self.db, &owner.user_id).await {
                        warn!(user = %owner.user_id, "Aggregate recomputation failed: {}", e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                // Local file retained: the artifact stays retryable
                // without re-acquisition.
                warn!(artifact = %artifact.artifact_guid, "Parse failed: {}", e);
                demos::mark_failed(
                    &self.db,
                    &artifact.artifact_guid,
                    DemoStatus::ParseFailed,
                    &e.to_string(),
                )
                .await?;
                Ok(())
            }
        }
    }
}
