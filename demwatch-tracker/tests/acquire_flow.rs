//! Demo acquisition against mocked shard storage

mod common;

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use demwatch_common::sharecode;
use demwatch_tracker::config::AcquireConfig;
use demwatch_tracker::db::{self, demos, matches};
use demwatch_tracker::db::demos::DemoStatus;
use demwatch_tracker::db::matches::{NewMatch, SOURCE_CHAIN};
use demwatch_tracker::demo::{AcquireJob, Acquirer, JobQueue, ParseJob};

const USER: &str = "76561198000000001";

fn acquire_config(server: &MockServer) -> AcquireConfig {
    AcquireConfig {
        shard_count: 1,
        probe_neighborhood: 0,
        probe_max_attempts: 4,
        shard_url_template: format!("{}/shards/{{shard}}/{{file}}", server.uri()),
        ..AcquireConfig::default()
    }
}

/// Placeholder match + pending artifact, as chain resolution creates them
async fn seed_artifact(pool: &SqlitePool, match_id: u64, outcome_id: u64, token_id: u16) -> String {
    let code = sharecode::encode(match_id, outcome_id, token_id);
    let decoded = sharecode::decode(&code).unwrap();

    let new = NewMatch {
        user_id: USER.to_string(),
        source: SOURCE_CHAIN.to_string(),
        share_code: Some(code),
        finished_at: Utc::now(),
        ..Default::default()
    };
    let match_guid = matches::insert(pool, &new).await.unwrap().unwrap();
    demos::create(pool, &match_guid, &decoded).await.unwrap().unwrap()
}

fn acquirer(
    pool: &SqlitePool,
    config: AcquireConfig,
    demo_dir: std::path::PathBuf,
) -> (Acquirer, demwatch_tracker::demo::queue::JobReceiver<ParseJob>) {
    let (parse_queue, parse_rx) = JobQueue::<ParseJob>::new("parse", 8);
    let acquirer = Acquirer::new(pool.clone(), config, 600, parse_queue, demo_dir).unwrap();
    (acquirer, parse_rx)
}

#[tokio::test]
async fn probe_hit_downloads_and_enqueues_parse() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let artifact_guid = seed_artifact(&pool, 42, 9000, 7).await;
    let file = "match_42_9000_7.dem";
    let body = common::DemoBytes::new("de_nuke", 64.0, 1800.0)
        .round_start(1)
        .kill(1, 2, true)
        .round_end(1, 0)
        .finish();

    Mock::given(method("HEAD"))
        .and(path(format!("/shards/0/{file}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/shards/0/{file}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let (acquirer, parse_rx) = acquirer(&pool, acquire_config(&server), dir.path().to_path_buf());
    acquirer
        .acquire(AcquireJob {
            artifact_guid: artifact_guid.clone(),
        })
        .await;

    let artifact = demos::get(&pool, &artifact_guid).await.unwrap().unwrap();
    assert_eq!(artifact.status().unwrap(), DemoStatus::Downloaded);
    assert_eq!(artifact.shard_index, Some(0));
    assert_eq!(artifact.size_bytes, Some(body.len() as i64));
    assert!(artifact.sha256.is_some());

    let saved = std::fs::read(artifact.local_path.as_deref().unwrap()).unwrap();
    assert_eq!(saved, body);

    // Success hands the artifact to the parse pool
    assert_eq!(parse_rx.depth(), 1);
}

#[tokio::test]
async fn all_probes_missing_marks_unavailable_with_retry() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    // No mocks mounted: every probe gets a 404
    let artifact_guid = seed_artifact(&pool, 43, 9001, 8).await;

    let (acquirer, parse_rx) = acquirer(&pool, acquire_config(&server), dir.path().to_path_buf());
    acquirer
        .acquire(AcquireJob {
            artifact_guid: artifact_guid.clone(),
        })
        .await;

    let artifact = demos::get(&pool, &artifact_guid).await.unwrap().unwrap();
    assert_eq!(artifact.status().unwrap(), DemoStatus::Unavailable);
    assert!(artifact.retry_at.is_some());
    assert_eq!(parse_rx.depth(), 0);
}

#[tokio::test]
async fn stale_match_expires_without_any_network_call() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let artifact_guid = seed_artifact(&pool, 44, 9002, 9).await;

    // Age the owning match past the freshness window (7 days default)
    let old = (Utc::now() - Duration::days(10)).to_rfc3339();
    sqlx::query("UPDATE matches SET created_at = ?")
        .bind(&old)
        .execute(&pool)
        .await
        .unwrap();

    let (acquirer, _parse_rx) = acquirer(&pool, acquire_config(&server), dir.path().to_path_buf());
    acquirer
        .acquire(AcquireJob {
            artifact_guid: artifact_guid.clone(),
        })
        .await;

    let artifact = demos::get(&pool, &artifact_guid).await.unwrap().unwrap();
    assert_eq!(artifact.status().unwrap(), DemoStatus::Expired);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn reacquiring_a_downloaded_artifact_is_a_no_op() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let artifact_guid = seed_artifact(&pool, 45, 9003, 10).await;
    demos::mark_downloaded(&pool, &artifact_guid, 0, "/tmp/somewhere.dem", 10, "abc")
        .await
        .unwrap();

    let (acquirer, parse_rx) = acquirer(&pool, acquire_config(&server), dir.path().to_path_buf());
    acquirer
        .acquire(AcquireJob {
            artifact_guid: artifact_guid.clone(),
        })
        .await;

    let artifact = demos::get(&pool, &artifact_guid).await.unwrap().unwrap();
    assert_eq!(artifact.status().unwrap(), DemoStatus::Downloaded);
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(parse_rx.depth(), 0);
}

#[tokio::test]
async fn shard_404_at_download_time_stays_transient() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let artifact_guid = seed_artifact(&pool, 46, 9004, 11).await;
    let file = "match_46_9004_11.dem";

    // Probe says yes, fetch says no: the artifact vanished in between
    Mock::given(method("HEAD"))
        .and(path(format!("/shards/0/{file}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/shards/0/{file}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (acquirer, _parse_rx) = acquirer(&pool, acquire_config(&server), dir.path().to_path_buf());
    acquirer
        .acquire(AcquireJob {
            artifact_guid: artifact_guid.clone(),
        })
        .await;

    let artifact = demos::get(&pool, &artifact_guid).await.unwrap().unwrap();
    assert_eq!(artifact.status().unwrap(), DemoStatus::Unavailable);
    assert!(artifact.retry_at.is_some());
}
