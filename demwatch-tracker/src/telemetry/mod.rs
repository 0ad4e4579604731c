//! Live telemetry ingestion
//!
//! Per-player snapshots arrive at an arbitrary rate over HTTP, are
//! acknowledged immediately, and are processed asynchronously by a
//! dedicated ingestor task feeding the shared session store.

pub mod ingestor;
pub mod session;
pub mod snapshot;

pub use ingestor::Ingestor;
pub use session::{Session, SessionStore};
pub use snapshot::{MatchPhase, RoundPhase, Snapshot, Team};
