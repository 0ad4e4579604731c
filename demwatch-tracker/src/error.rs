//! Error types for demwatch-tracker
//!
//! `ApiError` is the HTTP-facing error with a JSON envelope. The pipeline
//! enums (`ChainError`, `AcquireError`, `ParseError`) carry the
//! classification the background components act on: transient conditions
//! are deferred or retried, auth rejection is distinguished from
//! exhaustion, absence is distinguished from permanent failure, and
//! duplicates are success no-ops.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use demwatch_common::ShareCodeError;
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// No seed code available to start chain resolution (409)
    #[error("No seed code available for user {0}")]
    NoSeed(String),

    /// Upstream rejected our credentials (502)
    #[error("Chain API rejected credentials")]
    ChainAuth,

    /// Transient condition; caller should retry later (503)
    #[error("Temporarily unavailable: {0}")]
    TryLater(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// demwatch-common error
    #[error("Common error: {0}")]
    Common(#[from] demwatch_common::Error),
}

impl From<ShareCodeError> for ApiError {
    fn from(err: ShareCodeError) -> Self {
        ApiError::BadRequest(format!("Invalid share code: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NoSeed(user) => (
                StatusCode::CONFLICT,
                "NO_SEED",
                format!(
                    "No share code known for user {user}; supply one to start resolution"
                ),
            ),
            ApiError::ChainAuth => (
                StatusCode::BAD_GATEWAY,
                "CHAIN_AUTH",
                "Chain API rejected credentials; check the configured API key".to_string(),
            ),
            ApiError::TryLater(msg) => (StatusCode::SERVICE_UNAVAILABLE, "TRY_LATER", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Chain resolution errors
#[derive(Debug, Error)]
pub enum ChainError {
    /// Neither the caller nor storage supplied a seed code
    #[error("No seed code available for user {0}")]
    NoSeed(String),

    /// Upstream rate limit hit; partial results are still valid
    #[error("Rate limited by chain API")]
    RateLimited,

    /// Credentials rejected on the very first call
    #[error("Chain API rejected credentials")]
    AuthRejected,

    /// Upstream server error; retryable later
    #[error("Chain API server error: {0}")]
    Server(String),

    /// Transport-level failure
    #[error("Chain API network error: {0}")]
    Network(String),

    /// Response shape we do not understand
    #[error("Unexpected chain API response: {0}")]
    Protocol(String),

    /// Seed or returned code failed normalization
    #[error("Invalid share code: {0}")]
    Code(#[from] ShareCodeError),

    /// Storage failure while recording discovered codes
    #[error("Storage error: {0}")]
    Storage(#[from] demwatch_common::Error),
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::NoSeed(user) => ApiError::NoSeed(user),
            ChainError::AuthRejected => ApiError::ChainAuth,
            ChainError::RateLimited
            | ChainError::Server(_)
            | ChainError::Network(_) => ApiError::TryLater(err.to_string()),
            ChainError::Code(e) => e.into(),
            ChainError::Protocol(msg) => ApiError::Internal(msg),
            ChainError::Storage(e) => ApiError::Common(e),
        }
    }
}

/// Demo acquisition errors (per-job; never halt the pool)
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Artifact row missing
    #[error("Unknown artifact: {0}")]
    UnknownArtifact(String),

    /// Transport/protocol failure unrelated to shard absence
    #[error("Download failed: {0}")]
    Download(String),

    /// Local filesystem failure while persisting the artifact
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] demwatch_common::Error),
}

/// Demo parse errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Artifact shorter than the section being read
    #[error("Truncated artifact at offset {0}")]
    Truncated(usize),

    /// Leading magic bytes do not identify a demo event stream
    #[error("Not a demo event stream")]
    BadMagic,

    /// Format version this parser does not understand
    #[error("Unsupported demo format version {0}")]
    UnsupportedVersion(u8),

    /// Record tag outside the known event set
    #[error("Unknown record type 0x{0:02x} at offset {1}")]
    UnknownRecord(u8, usize),

    /// Structurally invalid record content
    #[error("Malformed artifact: {0}")]
    Malformed(String),
}
