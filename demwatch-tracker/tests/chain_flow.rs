//! Chain resolution against a mocked next-code API

use serde_json::json;
use sqlx::SqlitePool;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use demwatch_common::sharecode;
use demwatch_tracker::chain::{ChainClient, ChainResolver, StopReason};
use demwatch_tracker::config::ChainConfig;
use demwatch_tracker::db;
use demwatch_tracker::demo::{AcquireJob, JobQueue};
use demwatch_tracker::error::ChainError;

const USER: &str = "76561198000000001";

fn chain_config(server: &MockServer) -> ChainConfig {
    ChainConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        step_delay_ms: 0,
        ..ChainConfig::default()
    }
}

fn resolver(
    pool: &SqlitePool,
    config: &ChainConfig,
) -> (ChainResolver, demwatch_tracker::demo::queue::JobReceiver<AcquireJob>) {
    let (queue, rx) = JobQueue::<AcquireJob>::new("acquire", 16);
    let client = ChainClient::new(config).unwrap();
    (
        ChainResolver::new(pool.clone(), client, queue, config),
        rx,
    )
}

fn next_code_body(code: &str) -> serde_json::Value {
    json!({ "result": { "nextcode": code } })
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn discovers_codes_until_chain_is_exhausted() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();

    let seed = sharecode::encode(1001, 2002, 31);
    let next = sharecode::encode(1002, 2003, 32);

    Mock::given(method("GET"))
        .and(path("/next"))
        .and(query_param("user", USER))
        .and(query_param("knowncode", seed.as_str()))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(next_code_body(&next)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .and(query_param("knowncode", next.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(next_code_body("n/a")))
        .mount(&server)
        .await;

    let config = chain_config(&server);
    let (resolver, _rx) = resolver(&pool, &config);
    let outcome = resolver.resolve(USER, Some(&seed)).await.unwrap();

    assert_eq!(outcome.discovered, vec![next.clone()]);
    assert_eq!(outcome.skipped, 0);
    assert_eq!(outcome.reason, StopReason::Exhausted);

    // One placeholder match and one pending artifact for the discovery
    assert_eq!(count(&pool, "chain_codes").await, 1);
    assert_eq!(count(&pool, "matches").await, 1);
    assert_eq!(count(&pool, "demo_artifacts").await, 1);

    // Exactly two upstream calls: the discovery and the terminal answer
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn overlapping_resolution_creates_no_duplicates() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();

    let seed = sharecode::encode(500, 600, 1);
    let next = sharecode::encode(501, 601, 2);

    Mock::given(method("GET"))
        .and(path("/next"))
        .and(query_param("knowncode", seed.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(next_code_body(&next)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .and(query_param("knowncode", next.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(next_code_body("n/a")))
        .mount(&server)
        .await;

    let config = chain_config(&server);
    let (resolver, _rx) = resolver(&pool, &config);

    resolver.resolve(USER, Some(&seed)).await.unwrap();
    let second = resolver.resolve(USER, Some(&seed)).await.unwrap();

    assert!(second.discovered.is_empty());
    assert_eq!(second.skipped, 1);
    assert_eq!(count(&pool, "chain_codes").await, 1);
    assert_eq!(count(&pool, "matches").await, 1);
    assert_eq!(count(&pool, "demo_artifacts").await, 1);
}

#[tokio::test]
async fn walk_is_bounded_by_max_depth() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();

    // Upstream always has "one more": every knowncode gets a fresh answer
    let answer = sharecode::encode(u64::MAX, u64::MAX, u16::MAX);
    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(next_code_body(&answer)))
        .mount(&server)
        .await;

    let mut config = chain_config(&server);
    config.max_depth = 3;
    let (resolver, _rx) = resolver(&pool, &config);

    let seed = sharecode::encode(1, 1, 1);
    let outcome = resolver.resolve(USER, Some(&seed)).await.unwrap();

    assert_eq!(outcome.reason, StopReason::MaxDepth);
    // The same answer repeats, so only the first step discovers anything
    assert_eq!(outcome.discovered.len(), 1);
    assert_eq!(outcome.skipped, 2);
}

#[tokio::test]
async fn rate_limit_returns_partial_results() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();

    let seed = sharecode::encode(10, 20, 3);
    let next = sharecode::encode(11, 21, 4);

    Mock::given(method("GET"))
        .and(path("/next"))
        .and(query_param("knowncode", seed.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(next_code_body(&next)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .and(query_param("knowncode", next.as_str()))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let config = chain_config(&server);
    let (resolver, _rx) = resolver(&pool, &config);
    let outcome = resolver.resolve(USER, Some(&seed)).await.unwrap();

    assert_eq!(outcome.reason, StopReason::RateLimited);
    assert_eq!(outcome.discovered, vec![next]);
}

#[tokio::test]
async fn auth_rejection_on_first_call_is_an_error() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();

    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let config = chain_config(&server);
    let (resolver, _rx) = resolver(&pool, &config);
    let seed = sharecode::encode(1, 2, 3);

    let result = resolver.resolve(USER, Some(&seed)).await;
    assert!(matches!(result, Err(ChainError::AuthRejected)));
}

#[tokio::test]
async fn missing_seed_is_a_distinct_error() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();

    let config = chain_config(&server);
    let (resolver, _rx) = resolver(&pool, &config);

    let result = resolver.resolve(USER, None).await;
    assert!(matches!(result, Err(ChainError::NoSeed(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn stored_code_seeds_the_next_resolution() {
    let server = MockServer::start().await;
    let pool = db::init_memory_pool().await.unwrap();

    let seed = sharecode::encode(700, 800, 9);
    let next = sharecode::encode(701, 801, 10);

    Mock::given(method("GET"))
        .and(path("/next"))
        .and(query_param("knowncode", seed.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(next_code_body(&next)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .and(query_param("knowncode", next.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(next_code_body("n/a")))
        .mount(&server)
        .await;

    let decoded = sharecode::decode(&seed).unwrap();
    db::codes::insert_or_skip(&pool, USER, &seed, &decoded)
        .await
        .unwrap();

    let config = chain_config(&server);
    let (resolver, _rx) = resolver(&pool, &config);

    // No explicit seed: the stored code is the starting point
    let outcome = resolver.resolve(USER, None).await.unwrap();
    assert_eq!(outcome.discovered, vec![next]);
}
