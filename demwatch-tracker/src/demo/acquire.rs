//! Demo acquisition worker pool
//!
//! Fetches the binary replay for a match from one of many unordered
//! storage shards. The correct shard is unknown: if a directory-lookup
//! endpoint is configured it is asked first, otherwise candidate shard
//! indices are probed in priority order (heuristic guess from the numeric
//! match id, a neighborhood around it, then the remaining index space)
//! with a cheap existence check per candidate.
//!
//! Job states: `pending → downloading → {downloaded | unavailable |
//! failed | expired}`. Absence on every probed shard is `unavailable`
//! (commonly transient, retried later); a transport error unrelated to
//! absence is `failed` and is never auto-retried here.

use chrono::{Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::config::AcquireConfig;
use crate::db::demos::{self, DemoArtifact, DemoStatus};
use crate::db::matches;
use crate::error::AcquireError;

use super::parse::ParseJob;
use super::queue::JobQueue;

/// One acquisition job; all state lives in the artifact row
#[derive(Debug, Clone)]
pub struct AcquireJob {
    pub artifact_guid: String,
}

/// Directory lookup response: either a direct URL or a shard index
#[derive(Debug, Deserialize)]
struct DirectoryEnvelope {
    url: Option<String>,
    shard: Option<u32>,
}

/// Acquisition worker logic
pub struct Acquirer {
    db: SqlitePool,
    http: reqwest::Client,
    config: AcquireConfig,
    parse_queue: JobQueue<ParseJob>,
    /// Total wait budget granted to the parse job enqueued after download
    parse_wait: Duration,
    demo_dir: PathBuf,
}

impl Acquirer {
    pub fn new(
        db: SqlitePool,
        config: AcquireConfig,
        parse_wait_secs: u64,
        parse_queue: JobQueue<ParseJob>,
        demo_dir: PathBuf,
    ) -> Result<Self, demwatch_common::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("demwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| demwatch_common::Error::Internal(e.to_string()))?;

        Ok(Self {
            db,
            http,
            config,
            parse_queue,
            parse_wait: Duration::seconds(parse_wait_secs as i64),
            demo_dir,
        })
    }

    /// Worker entry point; contains all per-job error handling
    pub async fn acquire(&self, job: AcquireJob) {
        if let Err(e) = self.process(&job.artifact_guid).await {
            error!(artifact = %job.artifact_guid, "Acquisition job failed: {}", e);
            // Storage the state machine depends on is unreachable; leave
            // the row as-is for the retry loop.
        }
    }

    async fn process(&self, artifact_guid: &str) -> Result<(), AcquireError> {
        let artifact = demos::get(&self.db, artifact_guid)
            .await?
            .ok_or_else(|| AcquireError::UnknownArtifact(artifact_guid.to_string()))?;

        match artifact.status().map_err(AcquireError::Storage)? {
            // Re-entrant call on an acquired artifact is a no-op
            DemoStatus::Downloaded | DemoStatus::Parsing | DemoStatus::Parsed => {
                debug!(artifact = %artifact_guid, "Already acquired, nothing to do");
                return Ok(());
            }
            // Terminal failures are never auto-retried by this pool
            DemoStatus::Failed | DemoStatus::Expired | DemoStatus::ParseFailed => {
                debug!(artifact = %artifact_guid, status = %artifact.status, "Terminal status, skipping");
                return Ok(());
            }
            DemoStatus::Pending | DemoStatus::Downloading | DemoStatus::Unavailable => {}
        }

        // Freshness gate: stale matches expire with zero network calls
        let created = matches::created_at(&self.db, &artifact.match_guid)
            .await?
            .unwrap_or_else(Utc::now);
        if Utc::now() - created > Duration::days(self.config.freshness_days) {
            info!(artifact = %artifact_guid, "Owning match outside freshness window, expiring");
            demos::set_status(&self.db, artifact_guid, DemoStatus::Expired).await?;
            return Ok(());
        }

        demos::set_status(&self.db, artifact_guid, DemoStatus::Downloading).await?;

        let file_name = artifact_file_name(&artifact);

        // Directory lookup avoids probing entirely when available
        let mut located = match &self.config.directory_url {
            Some(endpoint) => self.directory_lookup(endpoint, &artifact, &file_name).await,
            None => None,
        };
        if located.is_none() {
            located = self.probe_shards(&artifact, &file_name).await;
        }

        let Some((shard_index, url)) = located else {
            let retry_at = Utc::now() + Duration::seconds(self.config.retry_unavailable_secs as i64);
            info!(artifact = %artifact_guid, retry_at = %retry_at,
                  "No shard holds the artifact, marking unavailable");
            demos::mark_unavailable(&self.db, artifact_guid, retry_at).await?;
            return Ok(());
        };

        match self.download(&url).await {
            Ok(bytes) => {
                let local_path = self.demo_dir.join(&file_name);
                tokio::fs::write(&local_path, &bytes).await?;

                let sha256 = format!("{:x}", Sha256::digest(&bytes));
                demos::mark_downloaded(
                    &self.db,
                    artifact_guid,
                    shard_index,
                    &local_path.to_string_lossy(),
                    bytes.len() as u64,
                    &sha256,
                )
                .await?;
                info!(artifact = %artifact_guid, shard = shard_index, size = bytes.len(),
                      "Artifact downloaded");

                let job = ParseJob {
                    artifact_guid: artifact_guid.to_string(),
                    deadline: Utc::now() + self.parse_wait,
                };
                if let Err(e) = self.parse_queue.submit(job).await {
                    warn!(artifact = %artifact_guid, "Could not enqueue parse: {}", e);
                }
            }
            Err(AcquireError::Download(msg)) if msg.contains("HTTP 404") => {
                // The shard lied (or the artifact vanished between probe
                // and fetch); absence stays transient.
                let retry_at =
                    Utc::now() + Duration::seconds(self.config.retry_unavailable_secs as i64);
                demos::mark_unavailable(&self.db, artifact_guid, retry_at).await?;
            }
            Err(e) => {
                warn!(artifact = %artifact_guid, "Download failed: {}", e);
                demos::mark_failed(&self.db, artifact_guid, DemoStatus::Failed, &e.to_string())
                    .await?;
            }
        }

        Ok(())
    }

    /// Ask the authenticated directory endpoint where the artifact lives
    ///
    /// Any failure falls back to probing; the lookup is an optimization,
    /// never a requirement.
    async fn directory_lookup(
        &self,
        endpoint: &str,
        artifact: &DemoArtifact,
        file_name: &str,
    ) -> Option<(u32, String)> {
        let timeout = std::time::Duration::from_secs(self.config.probe_timeout_secs);
        let result = self
            .http
            .get(endpoint)
            .timeout(timeout)
            .query(&[
                ("matchid", artifact.match_id.to_string()),
                ("outcomeid", artifact.outcome_id.to_string()),
                ("token", artifact.token_id.to_string()),
            ])
            .send()
            .await;

        let response = match result {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(status = %r.status(), "Directory lookup miss, falling back to probing");
                return None;
            }
            Err(e) => {
                debug!("Directory lookup failed, falling back to probing: {}", e);
                return None;
            }
        };

        let envelope: DirectoryEnvelope = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                debug!("Directory lookup body unreadable: {}", e);
                return None;
            }
        };

        if let Some(url) = envelope.url {
            return Some((envelope.shard.unwrap_or(0), url));
        }
        envelope
            .shard
            .map(|shard| (shard, self.shard_url(shard, file_name)))
    }

    /// Probe candidate shards in priority order, stopping at the first hit
    async fn probe_shards(&self, artifact: &DemoArtifact, file_name: &str) -> Option<(u32, String)> {
        let candidates = candidate_shards(
            artifact.match_id as u64,
            self.config.shard_count,
            self.config.probe_neighborhood,
            self.config.probe_max_attempts,
        );
        let timeout = std::time::Duration::from_secs(self.config.probe_timeout_secs);

        for shard in candidates {
            let url = self.shard_url(shard, file_name);
            match self.http.head(&url).timeout(timeout).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(shard, "Probe hit");
                    return Some((shard, url));
                }
                Ok(_) => {
                    // Absence is a normal, non-exceptional outcome
                }
                Err(e) => {
                    // A timeout means "this candidate failed", never fatal
                    debug!(shard, "Probe error: {}", e);
                }
            }
        }

        None
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, AcquireError> {
        let timeout = std::time::Duration::from_secs(self.config.download_timeout_secs);
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AcquireError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::Download(format!("HTTP {}", status.as_u16())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AcquireError::Download(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn shard_url(&self, shard: u32, file_name: &str) -> String {
        self.config
            .shard_url_template
            .replace("{shard}", &shard.to_string())
            .replace("{file}", file_name)
    }
}

/// Deterministic artifact file name from the decoded triple
pub fn artifact_file_name(artifact: &DemoArtifact) -> String {
    format!(
        "match_{}_{}_{}.dem",
        artifact.match_id, artifact.outcome_id, artifact.token_id
    )
}

/// Prioritized shard candidates: guess, neighborhood, remainder
///
/// The guess is a heuristic derived from the numeric match id. "What to
/// try" is decided here; "how many" is the caller's attempt bound.
pub fn candidate_shards(
    match_id: u64,
    shard_count: u32,
    neighborhood: u32,
    max_attempts: u32,
) -> Vec<u32> {
    if shard_count == 0 {
        return Vec::new();
    }

    let guess = (match_id % shard_count as u64) as u32;
    let mut seen = vec![false; shard_count as usize];
    let mut out = Vec::new();

    let push = |idx: u32, out: &mut Vec<u32>, seen: &mut Vec<bool>| {
        if !seen[idx as usize] {
            seen[idx as usize] = true;
            out.push(idx);
        }
    };

    push(guess, &mut out, &mut seen);
    for offset in 1..=neighborhood {
        push((guess + offset) % shard_count, &mut out, &mut seen);
        push(
            (guess + shard_count - (offset % shard_count)) % shard_count,
            &mut out,
            &mut seen,
        );
    }
    for idx in 0..shard_count {
        push(idx, &mut out, &mut seen);
    }

    out.truncate(max_attempts as usize);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_start_with_guess_then_neighborhood() {
        let candidates = candidate_shards(1003, 100, 2, 100);
        // 1003 % 100 = 3
        assert_eq!(&candidates[..5], &[3, 4, 2, 5, 1]);
        // Remainder covers the full space exactly once
        assert_eq!(candidates.len(), 100);
        let mut sorted = candidates.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 100);
    }

    #[test]
    fn test_candidates_respect_attempt_bound() {
        let candidates = candidate_shards(7, 128, 4, 10);
        assert_eq!(candidates.len(), 10);
    }

    #[test]
    fn test_candidates_wrap_at_edges() {
        let candidates = candidate_shards(0, 8, 2, 8);
        // guess 0, neighborhood wraps below zero
        assert_eq!(&candidates[..5], &[0, 1, 7, 2, 6]);
    }

    #[test]
    fn test_zero_shards_yield_nothing() {
        assert!(candidate_shards(42, 0, 4, 10).is_empty());
    }

    #[test]
    fn test_neighborhood_larger_than_space() {
        let candidates = candidate_shards(5, 4, 10, 16);
        assert_eq!(candidates.len(), 4);
    }
}
