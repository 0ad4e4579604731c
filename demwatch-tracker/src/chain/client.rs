//! Chain API client
//!
//! HTTP client for the next-code endpoint. Every call carries an explicit
//! timeout, and responses are classified into the conditions the resolver
//! acts on: next code, terminal exhaustion, rate limit, auth rejection,
//! server error.

use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ChainConfig;
use crate::error::ChainError;

const USER_AGENT: &str = concat!("demwatch/", env!("CARGO_PKG_VERSION"));

/// Sentinel the upstream uses for "no newer code"
const TERMINAL_SENTINEL: &str = "n/a";

/// One step of the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStep {
    /// The next code after the seed
    Next(String),
    /// End of the chain; the seed is the newest known code
    Terminal,
}

#[derive(Debug, Deserialize)]
struct NextCodeEnvelope {
    result: NextCodeResult,
}

#[derive(Debug, Deserialize)]
struct NextCodeResult {
    nextcode: String,
}

/// HTTP chain API client
pub struct ChainClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ChainClient {
    pub fn new(config: &ChainConfig) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ChainError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// `next(seed)`: the code after `seed` in this user's chain
    pub async fn next(&self, user_id: &str, seed: &str) -> Result<ChainStep, ChainError> {
        let url = format!("{}/next", self.base_url);

        let mut query: Vec<(&str, &str)> = vec![("user", user_id), ("knowncode", seed)];
        if let Some(key) = &self.api_key {
            query.push(("key", key));
        }

        debug!(user = %user_id, seed = %seed, "Chain API call");

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ChainError::RateLimited);
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ChainError::AuthRejected);
        }
        if status.is_server_error() {
            return Err(ChainError::Server(format!("HTTP {}", status.as_u16())));
        }
        if status.as_u16() == 202 {
            // Accepted-but-nothing-newer is an exhaustion signal
            return Ok(ChainStep::Terminal);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::Protocol(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let envelope: NextCodeEnvelope = response
            .json()
            .await
            .map_err(|e| ChainError::Protocol(e.to_string()))?;

        if envelope.result.nextcode.eq_ignore_ascii_case(TERMINAL_SENTINEL) {
            Ok(ChainStep::Terminal)
        } else {
            Ok(ChainStep::Next(envelope.result.nextcode))
        }
    }
}
