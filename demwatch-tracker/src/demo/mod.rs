//! Demo acquisition & parse pipelines
//!
//! Two bounded multi-producer/multi-consumer queues feed two fixed-size
//! worker pools. Acquisition is I/O-bound and sized larger; parsing is
//! CPU-bound and sized smaller. Request-triggered work is enqueued, never
//! spawned ad hoc.

pub mod acquire;
pub mod parse;
pub mod parser;
pub mod queue;

use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::TrackerConfig;

pub use acquire::{AcquireJob, Acquirer};
pub use parse::{ParseJob, ParseRunner};
pub use queue::JobQueue;

/// Wire up both pipelines and spawn their worker pools
pub fn spawn_pipelines(
    db: SqlitePool,
    config: &TrackerConfig,
    data_dir: &Path,
    cancel: CancellationToken,
) -> demwatch_common::Result<(JobQueue<AcquireJob>, JobQueue<ParseJob>)> {
    let (acquire_queue, acquire_rx) =
        JobQueue::<AcquireJob>::new("acquire", config.acquire.queue_capacity);
    let (parse_queue, parse_rx) = JobQueue::<ParseJob>::new("parse", config.parse.queue_capacity);

    let acquirer = Arc::new(Acquirer::new(
        db.clone(),
        config.acquire.clone(),
        config.parse.wait_for_download_secs,
        parse_queue.clone(),
        data_dir.join("demos"),
    )?);
    queue::spawn_workers(
        "acquire",
        config.acquire.workers,
        acquire_rx,
        move |job| {
            let acquirer = Arc::clone(&acquirer);
            async move { acquirer.acquire(job).await }
        },
        cancel.clone(),
    );

    let runner = Arc::new(ParseRunner::new(db, parse_queue.clone(), &config.parse));
    queue::spawn_workers(
        "parse",
        config.parse.workers,
        parse_rx,
        move |job| {
            let runner = Arc::clone(&runner);
            async move { runner.handle(job).await }
        },
        cancel,
    );

    Ok((acquire_queue, parse_queue))
}
