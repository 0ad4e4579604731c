//! Configuration for demwatch-tracker
//!
//! Loaded from `demwatch-tracker.toml` (see `demwatch_common::config` for
//! file resolution) with env-var overrides for the bind address and the
//! chain API key. Every timing and sizing knob of the background pipelines
//! is a config field; defaults are compiled in.

use demwatch_common::config as common_config;
use demwatch_common::Result;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

/// Env override for the HTTP bind address
pub const BIND_ADDR_ENV: &str = "DEMWATCH_BIND_ADDR";

/// Env override for the chain API key
pub const CHAIN_API_KEY_ENV: &str = "DEMWATCH_CHAIN_API_KEY";

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TrackerConfig {
    /// Data folder (database + downloaded artifacts); None = platform default
    pub data_dir: Option<PathBuf>,
    /// HTTP bind address
    pub bind_addr: Option<String>,
    pub telemetry: TelemetryConfig,
    pub sweeper: SweeperConfig,
    pub chain: ChainConfig,
    pub acquire: AcquireConfig,
    pub parse: ParseConfig,
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Trailing window where a second finalize for the same player/map is a no-op
    pub dedup_window_secs: u64,
    /// Inbound snapshot channel capacity
    pub queue_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 60,
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Sweep pass interval
    pub interval_secs: u64,
    /// Age at which an idle session with stats is auto-saved
    pub inactivity_threshold_secs: u64,
    /// Age at which a session is removed from tracking unconditionally
    pub max_retention_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            inactivity_threshold_secs: 300,
            max_retention_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Base URL of the next-code API
    pub base_url: String,
    /// API key; env `DEMWATCH_CHAIN_API_KEY` takes priority
    pub api_key: Option<String>,
    /// Maximum codes walked per resolution
    pub max_depth: u32,
    /// Fixed delay between successive next-code calls
    pub step_delay_ms: u64,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Periodic bulk resync interval (0 disables)
    pub resync_interval_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            base_url: "https://chain.demwatch.example".to_string(),
            api_key: None,
            max_depth: 50,
            step_delay_ms: 1000,
            request_timeout_secs: 10,
            resync_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquireConfig {
    /// Fixed worker count for the acquisition pool
    pub workers: usize,
    /// Pending acquisition job capacity
    pub queue_capacity: usize,
    /// Matches older than this are expired without any network calls
    pub freshness_days: i64,
    /// Number of storage shards probed for artifacts
    pub shard_count: u32,
    /// Shard indices tried around the heuristic guess before the remainder
    pub probe_neighborhood: u32,
    /// Upper bound on existence probes per job
    pub probe_max_attempts: u32,
    /// Per-probe timeout
    pub probe_timeout_secs: u64,
    /// Full download timeout
    pub download_timeout_secs: u64,
    /// Delay before an `unavailable` artifact is retried
    pub retry_unavailable_secs: u64,
    /// Shard URL template with `{shard}` and `{file}` placeholders
    pub shard_url_template: String,
    /// Optional authenticated directory-lookup endpoint, tried before probing
    pub directory_url: Option<String>,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 64,
            freshness_days: 7,
            shard_count: 128,
            probe_neighborhood: 4,
            probe_max_attempts: 32,
            probe_timeout_secs: 5,
            download_timeout_secs: 120,
            retry_unavailable_secs: 7200,
            shard_url_template: "http://replay{shard}.demwatch.example/730/{file}".to_string(),
            directory_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    /// Fixed worker count for the parse pool
    pub workers: usize,
    /// Pending parse job capacity
    pub queue_capacity: usize,
    /// Maximum total wait for the artifact to finish downloading
    pub wait_for_download_secs: u64,
    /// Re-check interval while waiting for the download
    pub poll_interval_secs: u64,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
            wait_for_download_secs: 600,
            poll_interval_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Artifact cleanup pass interval
    pub interval_secs: u64,
    /// Parsed artifacts older than this lose their local file
    pub max_artifact_age_days: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 86_400,
            max_artifact_age_days: 30,
        }
    }
}

impl TrackerConfig {
    /// Load config from the platform TOML file, then apply env overrides
    pub fn load() -> Result<Self> {
        let mut config = match common_config::config_file_path("demwatch-tracker") {
            Some(path) => {
                info!("Loading config from {}", path.display());
                common_config::load_toml_config(&path)?
            }
            None => {
                info!("No config file found, using compiled defaults");
                Self::default()
            }
        };

        if let Ok(addr) = std::env::var(BIND_ADDR_ENV) {
            config.bind_addr = Some(addr);
        }
        if let Ok(key) = std::env::var(CHAIN_API_KEY_ENV) {
            config.chain.api_key = Some(key);
        }

        Ok(config)
    }

    /// Effective bind address
    pub fn bind_addr(&self) -> &str {
        self.bind_addr.as_deref().unwrap_or("127.0.0.1:5740")
    }

    /// Effective data folder
    pub fn data_dir(&self) -> PathBuf {
        common_config::resolve_data_dir(self.data_dir.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_tunables() {
        let config = TrackerConfig::default();
        assert_eq!(config.telemetry.dedup_window_secs, 60);
        assert_eq!(config.sweeper.interval_secs, 300);
        assert!(config.sweeper.inactivity_threshold_secs < config.sweeper.max_retention_secs);
        assert_eq!(config.chain.max_depth, 50);
        assert_eq!(config.acquire.workers, 3);
        assert_eq!(config.acquire.freshness_days, 7);
        assert_eq!(config.parse.workers, 2);
        assert_eq!(config.parse.wait_for_download_secs, 600);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            bind_addr = "0.0.0.0:8080"

            [acquire]
            workers = 5
            shard_count = 64
        "#;
        let config: TrackerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.acquire.workers, 5);
        assert_eq!(config.acquire.shard_count, 64);
        // Untouched sections keep defaults
        assert_eq!(config.acquire.probe_neighborhood, 4);
        assert_eq!(config.parse.workers, 2);
    }
}
