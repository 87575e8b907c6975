//! Coordinator runs against a scripted adapter and the in-memory store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use asset_collector::{Coordinator, CoordinatorConfig, RetryConfig};
use asset_core::{FailureKind, Normalizer, RawRecord, SchemaId, SchemaRegistry, Value, LATEST_PRICES};
use asset_data::{ChunkError, ChunkedSink, MemoryStore, SourceAdapter, SourceError};

#[derive(Debug, Clone, Copy)]
enum Script {
    Price(f64),
    NotFound,
    Timeout,
    RateLimitedOnce(f64),
    Empty,
    Malformed,
    Slow(f64),
    /// Cancels the run token mid-fetch, then returns a price.
    SlowCancelling(f64),
}

#[derive(Default)]
struct Tally {
    calls: Mutex<HashMap<String, u32>>,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancel: CancellationToken,
}

impl Tally {
    fn calls(&self, entity: &str) -> u32 {
        self.calls.lock().unwrap().get(entity).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

struct FakeAdapter {
    scripts: HashMap<String, Script>,
    tally: Arc<Tally>,
}

impl FakeAdapter {
    fn new(scripts: &[(&str, Script)]) -> (Self, Arc<Tally>) {
        let tally = Arc::new(Tally::default());
        let adapter = Self {
            scripts: scripts.iter().map(|(e, s)| (e.to_string(), *s)).collect(),
            tally: tally.clone(),
        };
        (adapter, tally)
    }
}

fn quote(entity: &str, price: impl Into<serde_json::Value>) -> Vec<RawRecord> {
    vec![RawRecord::new(entity)
        .with("symbol", entity)
        .with("market", "US")
        .with("price", price)
        .with("as_of", "2024-01-02T00:00:00Z")]
}

#[async_trait]
impl SourceAdapter for FakeAdapter {
    type Entity = String;

    fn name(&self) -> &'static str {
        "fake"
    }

    fn schema(&self) -> SchemaId {
        SchemaId::new(LATEST_PRICES, 1)
    }

    async fn fetch(&self, entity: &String) -> Result<Vec<RawRecord>, SourceError> {
        let attempt = {
            let mut calls = self.tally.calls.lock().unwrap();
            let n = calls.entry(entity.clone()).or_insert(0);
            *n += 1;
            *n
        };

        match self.scripts.get(entity).copied() {
            Some(Script::Price(p)) => Ok(quote(entity, p)),
            Some(Script::NotFound) | None => Err(SourceError::NotFound(entity.clone())),
            Some(Script::Timeout) => Err(SourceError::Timeout(entity.clone())),
            Some(Script::RateLimitedOnce(_)) if attempt == 1 => {
                Err(SourceError::RateLimited(entity.clone()))
            }
            Some(Script::RateLimitedOnce(p)) => Ok(quote(entity, p)),
            Some(Script::Empty) => Ok(Vec::new()),
            Some(Script::Malformed) => Ok(quote(entity, "not a price")),
            Some(Script::Slow(p)) => {
                let now = self.tally.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.tally.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.tally.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(quote(entity, p))
            }
            Some(Script::SlowCancelling(p)) => {
                self.tally.cancel.cancel();
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(quote(entity, p))
            }
        }
    }

    async fn close(&self) {
        self.tally.closed.store(true, Ordering::SeqCst);
    }
}

fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        concurrency: 1,
        request_delay: Duration::ZERO,
        retry: RetryConfig::fast(),
        deadline: None,
    }
}

fn coordinator(
    adapter: FakeAdapter,
    config: CoordinatorConfig,
) -> (Coordinator<FakeAdapter>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(ChunkedSink::new(store.clone(), 1000));
    let normalizer = Normalizer::new(Arc::new(SchemaRegistry::builtin()));
    (Coordinator::new(adapter, normalizer, sink, config), store)
}

fn entities(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_mixed_outcomes_are_accounted_per_entity() {
    let (adapter, tally) = FakeAdapter::new(&[
        ("AAA", Script::Price(101.5)),
        ("BBB", Script::NotFound),
        ("CCC", Script::Timeout),
    ]);
    let (coordinator, store) = coordinator(adapter, test_config());

    let summary = coordinator.run(entities(&["AAA", "BBB", "CCC"])).await.unwrap();

    assert_eq!(summary.succeeded, vec!["AAA"]);
    let expected: BTreeMap<String, FailureKind> = [
        ("BBB".to_string(), FailureKind::NotFound),
        ("CCC".to_string(), FailureKind::Timeout),
    ]
    .into_iter()
    .collect();
    assert_eq!(summary.failed, expected);
    assert!(summary.cancelled.is_empty());
    assert_eq!(summary.records_written, 1);

    // Timeout retried once, NotFound never.
    assert_eq!(tally.calls("CCC"), 2);
    assert_eq!(tally.calls("BBB"), 1);
    assert!(tally.closed.load(Ordering::SeqCst));

    let row = store.get(LATEST_PRICES, "AAA|US").unwrap();
    assert_eq!(row.get("price"), Some(&Value::Float(101.5)));
    assert_eq!(row.writes, 1);
    assert_eq!(store.row_count(LATEST_PRICES), 1);
}

#[tokio::test]
async fn test_malformed_payload_fails_only_that_entity() {
    let (adapter, _tally) = FakeAdapter::new(&[
        ("AAA", Script::Malformed),
        ("BBB", Script::Price(12.0)),
    ]);
    let (coordinator, store) = coordinator(adapter, test_config());

    let summary = coordinator.run(entities(&["AAA", "BBB"])).await.unwrap();

    assert_eq!(summary.succeeded, vec!["BBB"]);
    assert_eq!(summary.failed.get("AAA"), Some(&FailureKind::ValidationError));
    assert!(store.get(LATEST_PRICES, "AAA|US").is_none());
    assert_eq!(store.keys(LATEST_PRICES), vec!["BBB|US"]);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let (adapter, _tally) = FakeAdapter::new(&[
        ("AAA", Script::Price(1.0)),
        ("BBB", Script::Price(2.0)),
    ]);
    let (coordinator, store) = coordinator(adapter, test_config());

    coordinator.run(entities(&["AAA", "BBB"])).await.unwrap();
    coordinator.run(entities(&["AAA", "BBB"])).await.unwrap();

    assert_eq!(store.row_count(LATEST_PRICES), 2);
    assert_eq!(store.get(LATEST_PRICES, "AAA|US").unwrap().writes, 2);
}

#[tokio::test]
async fn test_rate_limited_then_recovers() {
    let (adapter, tally) = FakeAdapter::new(&[("AAA", Script::RateLimitedOnce(5.0))]);
    let (coordinator, store) = coordinator(adapter, test_config());

    let summary = coordinator.run(entities(&["AAA"])).await.unwrap();

    assert_eq!(summary.succeeded, vec!["AAA"]);
    assert_eq!(tally.calls("AAA"), 2);
    assert_eq!(store.row_count(LATEST_PRICES), 1);
}

#[tokio::test]
async fn test_retries_disabled() {
    let (adapter, tally) = FakeAdapter::new(&[("CCC", Script::Timeout)]);
    let config = CoordinatorConfig {
        retry: RetryConfig::no_retry(),
        ..test_config()
    };
    let (coordinator, _store) = coordinator(adapter, config);

    let summary = coordinator.run(entities(&["CCC"])).await.unwrap();

    assert_eq!(summary.failed.get("CCC"), Some(&FailureKind::Timeout));
    assert_eq!(tally.calls("CCC"), 1);
}

#[tokio::test]
async fn test_empty_payload_is_not_found() {
    let (adapter, _tally) = FakeAdapter::new(&[("AAA", Script::Empty)]);
    let (coordinator, store) = coordinator(adapter, test_config());

    let summary = coordinator.run(entities(&["AAA"])).await.unwrap();

    assert_eq!(summary.failed.get("AAA"), Some(&FailureKind::NotFound));
    assert_eq!(store.chunk_writes(), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_schedules_nothing() {
    let (adapter, tally) = FakeAdapter::new(&[
        ("AAA", Script::Price(1.0)),
        ("BBB", Script::Price(2.0)),
    ]);
    let token = CancellationToken::new();
    let (coordinator, store) = coordinator(adapter, test_config());
    let coordinator = coordinator.with_cancellation(token.clone());

    token.cancel();
    let summary = coordinator.run(entities(&["AAA", "BBB"])).await.unwrap();

    assert_eq!(summary.cancelled, vec!["AAA", "BBB"]);
    assert!(summary.succeeded.is_empty());
    assert_eq!(tally.total_calls(), 0);
    assert_eq!(store.row_count(LATEST_PRICES), 0);
    assert!(tally.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_elapsed_deadline_cancels_remaining() {
    let (adapter, tally) = FakeAdapter::new(&[("AAA", Script::Price(1.0))]);
    let config = CoordinatorConfig {
        deadline: Some(Duration::ZERO),
        ..test_config()
    };
    let (coordinator, _store) = coordinator(adapter, config);

    let summary = coordinator.run(entities(&["AAA"])).await.unwrap();

    assert_eq!(summary.cancelled, vec!["AAA"]);
    assert_eq!(tally.total_calls(), 0);
}

#[tokio::test]
async fn test_connectivity_loss_aborts_with_partial_accounting() {
    let (adapter, tally) = FakeAdapter::new(&[
        ("AAA", Script::Price(1.0)),
        ("BBB", Script::Price(2.0)),
        ("CCC", Script::Price(3.0)),
    ]);
    let (coordinator, store) = coordinator(adapter, test_config());
    store.succeed_next_chunk();
    store.fail_next_chunk(ChunkError::Unreachable("connection reset".to_string()));

    let aborted = coordinator
        .run(entities(&["AAA", "BBB", "CCC"]))
        .await
        .unwrap_err();

    assert_eq!(aborted.kind, FailureKind::ConnectivityLoss);
    assert_eq!(aborted.cause, "connection reset");
    assert_eq!(aborted.summary.succeeded, vec!["AAA"]);
    assert_eq!(
        aborted.summary.failed.get("BBB"),
        Some(&FailureKind::ConnectivityLoss)
    );
    assert_eq!(aborted.summary.cancelled, vec!["CCC"]);
    assert_eq!(aborted.summary.records_written, 1);
    assert_eq!(aborted.summary.chunks, 1);
    assert_eq!(tally.calls("CCC"), 0);
    assert!(tally.closed.load(Ordering::SeqCst));
    assert_eq!(store.row_count(LATEST_PRICES), 1);
}

#[tokio::test]
async fn test_connectivity_loss_blocks_in_flight_writes() {
    let (adapter, tally) = FakeAdapter::new(&[
        ("AAA", Script::Slow(1.0)),
        ("BBB", Script::Slow(2.0)),
    ]);
    let config = CoordinatorConfig {
        concurrency: 2,
        ..test_config()
    };
    let (coordinator, store) = coordinator(adapter, config);
    store.fail_next_chunk(ChunkError::Unreachable("connection reset".to_string()));

    let aborted = coordinator.run(entities(&["AAA", "BBB"])).await.unwrap_err();

    // Both fetches were in flight when the first write failed.
    assert_eq!(tally.max_in_flight.load(Ordering::SeqCst), 2);
    assert!(aborted.summary.succeeded.is_empty());
    assert_eq!(aborted.summary.failed.get("AAA"), Some(&FailureKind::ConnectivityLoss));
    assert_eq!(aborted.summary.failed.get("BBB"), Some(&FailureKind::ConnectivityLoss));
    assert_eq!(aborted.summary.records_written, 0);
    assert_eq!(store.chunk_writes(), 0);
    assert_eq!(store.row_count(LATEST_PRICES), 0);
}

#[tokio::test]
async fn test_cancel_mid_run_finishes_in_flight_entity() {
    let (adapter, tally) = FakeAdapter::new(&[
        ("AAA", Script::SlowCancelling(1.0)),
        ("BBB", Script::Price(2.0)),
        ("CCC", Script::Price(3.0)),
    ]);
    let token = tally.cancel.clone();
    let (coordinator, store) = coordinator(adapter, test_config());
    let coordinator = coordinator.with_cancellation(token);

    let summary = coordinator.run(entities(&["AAA", "BBB", "CCC"])).await.unwrap();

    assert_eq!(summary.succeeded, vec!["AAA"]);
    assert_eq!(summary.cancelled, vec!["BBB", "CCC"]);
    assert!(summary.failed.is_empty());
    assert_eq!(tally.calls("BBB"), 0);
    assert_eq!(tally.calls("CCC"), 0);
    assert!(store.get(LATEST_PRICES, "AAA|US").is_some());
    assert_eq!(store.row_count(LATEST_PRICES), 1);
}

#[tokio::test]
async fn test_rejected_chunk_marks_entity_and_continues() {
    let (adapter, _tally) = FakeAdapter::new(&[
        ("AAA", Script::Price(1.0)),
        ("BBB", Script::Price(2.0)),
    ]);
    let (coordinator, store) = coordinator(adapter, test_config());
    store.fail_next_chunk(ChunkError::Rejected("check constraint violated".to_string()));

    let summary = coordinator.run(entities(&["AAA", "BBB"])).await.unwrap();

    assert_eq!(summary.failed.get("AAA"), Some(&FailureKind::WriteRejected));
    assert_eq!(summary.succeeded, vec!["BBB"]);
    assert_eq!(summary.rejected_chunks.len(), 1);
    assert_eq!(summary.rejected_chunks[0].keys, vec!["AAA|US"]);
    assert_eq!(store.keys(LATEST_PRICES), vec!["BBB|US"]);
}

#[tokio::test]
async fn test_worker_pool_is_bounded() {
    let names: Vec<String> = (0..8).map(|i| format!("S{i}")).collect();
    let scripts: Vec<(&str, Script)> = names.iter().map(|n| (n.as_str(), Script::Slow(1.0))).collect();
    let (adapter, tally) = FakeAdapter::new(&scripts);
    let config = CoordinatorConfig {
        concurrency: 3,
        ..test_config()
    };
    let (coordinator, store) = coordinator(adapter, config);

    let summary = coordinator.run(names.clone()).await.unwrap();

    assert_eq!(summary.succeeded.len(), 8);
    assert!(tally.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert_eq!(store.row_count(LATEST_PRICES), 8);
}

#[tokio::test(start_paused = true)]
async fn test_request_delay_spaces_fetches() {
    let (adapter, _tally) = FakeAdapter::new(&[
        ("AAA", Script::Price(1.0)),
        ("BBB", Script::Price(2.0)),
        ("CCC", Script::Price(3.0)),
    ]);
    let config = CoordinatorConfig {
        request_delay: Duration::from_millis(500),
        ..test_config()
    };
    let (coordinator, _store) = coordinator(adapter, config);

    let summary = coordinator.run(entities(&["AAA", "BBB", "CCC"])).await.unwrap();

    assert_eq!(summary.succeeded.len(), 3);
    assert!(summary.elapsed >= Duration::from_millis(1000));
}
