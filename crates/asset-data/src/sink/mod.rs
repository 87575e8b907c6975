//! Persistence sink: chunked, idempotent upserts keyed by natural key.
//!
//! [`ChunkedSink`] owns the batching policy (de-duplication, chunking,
//! failure accounting). Stores only know how to write one chunk in one
//! transaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use asset_core::{CanonicalRecord, Schema};

use crate::error::{ChunkError, SinkError};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Rows per chunk transaction.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Upsert `rows` (all of `schema`, unique keys) atomically.
    async fn write_chunk(&self, schema: &Schema, rows: &[CanonicalRecord]) -> Result<u64, ChunkError>;
}

/// A chunk the store refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedChunk {
    pub table: String,
    /// Natural keys of the rows in the chunk.
    pub keys: Vec<String>,
    /// Entities those rows were fetched for.
    pub entities: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    /// Rows in committed chunks.
    pub written: usize,
    /// Committed chunk transactions.
    pub chunks: usize,
    pub rejected: Vec<RejectedChunk>,
}

impl UpsertReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub struct ChunkedSink {
    store: Arc<dyn ChunkStore>,
    chunk_size: usize,
    /// Serializes chunk transactions. Holds the connectivity-loss message
    /// once the store has been found unreachable; no write follows it.
    write_lock: Mutex<Option<String>>,
}

impl ChunkedSink {
    pub fn new(store: Arc<dyn ChunkStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            write_lock: Mutex::new(None),
        }
    }

    /// Write a batch in chunk transactions.
    ///
    /// A rejected chunk is recorded in the report and the next chunk is
    /// attempted. Connectivity loss stops immediately with the count of rows
    /// already committed, and every later call fails the same way without
    /// reaching the store.
    pub async fn upsert(&self, batch: Vec<CanonicalRecord>) -> Result<UpsertReport, SinkError> {
        let mut report = UpsertReport::default();

        for rows in group_by_table(batch) {
            let Some(schema) = rows.first().map(|r| Arc::clone(r.schema())) else {
                continue;
            };
            let rows = dedup_last_wins(rows);

            for chunk in rows.chunks(self.chunk_size) {
                let mut unreachable = self.write_lock.lock().await;
                if let Some(message) = unreachable.as_ref() {
                    return Err(connectivity_loss(&report, message.clone()));
                }

                match self.store.write_chunk(&schema, chunk).await {
                    Ok(affected) => {
                        debug!(table = %schema.table, rows = chunk.len(), affected = affected, "chunk committed");
                        report.written += chunk.len();
                        report.chunks += 1;
                    }
                    Err(ChunkError::Rejected(reason)) => {
                        warn!(table = %schema.table, rows = chunk.len(), error = %reason, "chunk rejected");
                        report.rejected.push(rejected_chunk(&schema, chunk, reason));
                    }
                    Err(ChunkError::Unreachable(message)) => {
                        *unreachable = Some(message.clone());
                        return Err(connectivity_loss(&report, message));
                    }
                }
            }
        }

        Ok(report)
    }
}

fn connectivity_loss(report: &UpsertReport, message: String) -> SinkError {
    SinkError::ConnectivityLoss {
        written: report.written,
        chunks: report.chunks,
        message,
    }
}

fn rejected_chunk(schema: &Schema, chunk: &[CanonicalRecord], reason: String) -> RejectedChunk {
    let mut entities: Vec<String> = chunk.iter().map(|r| r.entity().to_string()).collect();
    entities.sort();
    entities.dedup();

    RejectedChunk {
        table: schema.table.clone(),
        keys: chunk.iter().map(CanonicalRecord::key).collect(),
        entities,
        reason,
    }
}

/// Split a batch per destination table, keeping first-seen table order.
fn group_by_table(batch: Vec<CanonicalRecord>) -> Vec<Vec<CanonicalRecord>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<CanonicalRecord>> = HashMap::new();

    for record in batch {
        let table = record.table().to_string();
        if !groups.contains_key(&table) {
            order.push(table.clone());
        }
        groups.entry(table).or_default().push(record);
    }

    order
        .into_iter()
        .filter_map(|table| groups.remove(&table))
        .collect()
}

/// Collapse duplicate keys. The row keeps its first position, the last
/// value wins, so one `ON CONFLICT` statement never touches a row twice.
fn dedup_last_wins(rows: Vec<CanonicalRecord>) -> Vec<CanonicalRecord> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(rows.len());
    let mut unique: Vec<CanonicalRecord> = Vec::with_capacity(rows.len());

    for row in rows {
        match index.get(&row.key()) {
            Some(&pos) => unique[pos] = row,
            None => {
                index.insert(row.key(), unique.len());
                unique.push(row);
            }
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_core::{Normalizer, RawRecord, SchemaId, SchemaRegistry, Value, STOCK_PRICES};

    fn bars(ticker: &str, count: usize) -> Vec<CanonicalRecord> {
        let normalizer = Normalizer::new(Arc::new(SchemaRegistry::builtin()));
        let schema = SchemaId::new(STOCK_PRICES, 1);
        (0..count)
            .map(|i| {
                let raw = RawRecord::new(ticker)
                    .with("Date", 1_500_000_000 + (i as i64) * 86_400)
                    .with("ticker", ticker)
                    .with("Close", 100.0 + i as f64)
                    .with("Volume", 10);
                normalizer.normalize(&raw, &schema).unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_chunks_of_one_thousand() {
        let store = Arc::new(MemoryStore::new());
        let sink = ChunkedSink::new(store.clone(), DEFAULT_CHUNK_SIZE);

        let report = sink.upsert(bars("AAPL", 2500)).await.unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(report.written, 2500);
        assert!(report.is_clean());
        assert_eq!(store.chunk_writes(), 3);
        assert_eq!(store.row_count(STOCK_PRICES), 2500);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let sink = ChunkedSink::new(store.clone(), 100);

        sink.upsert(bars("MSFT", 250)).await.unwrap();
        sink.upsert(bars("MSFT", 250)).await.unwrap();

        assert_eq!(store.row_count(STOCK_PRICES), 250);
    }

    #[tokio::test]
    async fn test_duplicate_keys_collapse_last_wins() {
        let store = Arc::new(MemoryStore::new());
        let sink = ChunkedSink::new(store.clone(), 10);

        let mut batch = bars("NVDA", 2);
        let mut later = bars("NVDA", 1);
        let normalizer = Normalizer::new(Arc::new(SchemaRegistry::builtin()));
        later[0] = normalizer
            .normalize(
                &RawRecord::new("NVDA")
                    .with("Date", 1_500_000_000)
                    .with("ticker", "NVDA")
                    .with("Close", 1.0),
                &SchemaId::new(STOCK_PRICES, 1),
            )
            .unwrap();
        batch.extend(later);

        let report = sink.upsert(batch).await.unwrap();
        assert_eq!(report.written, 2);

        let key = "2017-07-14T02:40:00+00:00|NVDA";
        let row = store.get(STOCK_PRICES, key).unwrap();
        assert_eq!(row.get("close"), Some(&Value::Float(1.0)));
    }

    #[tokio::test]
    async fn test_rejected_chunk_reports_keys_and_continues() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_chunk(ChunkError::Rejected("value too long".into()));
        let sink = ChunkedSink::new(store.clone(), 2);

        let report = sink.upsert(bars("AMD", 5)).await.unwrap();

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].keys.len(), 2);
        assert_eq!(report.rejected[0].entities, vec!["AMD".to_string()]);
        assert_eq!(report.written, 3);
        assert_eq!(report.chunks, 2);
    }

    #[tokio::test]
    async fn test_connectivity_loss_reports_written() {
        let store = Arc::new(MemoryStore::new());
        let sink = ChunkedSink::new(store.clone(), 1000);

        store.succeed_next_chunk();
        store.fail_next_chunk(ChunkError::Unreachable("connection reset".into()));

        let err = sink.upsert(bars("B", 2500)).await.unwrap_err();
        match err {
            SinkError::ConnectivityLoss { written, chunks, .. } => {
                assert_eq!(written, 1000);
                assert_eq!(chunks, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_no_write_after_connectivity_loss() {
        let store = Arc::new(MemoryStore::new());
        let sink = ChunkedSink::new(store.clone(), 1000);
        store.fail_next_chunk(ChunkError::Unreachable("connection reset".into()));

        assert!(sink.upsert(bars("AAA", 1)).await.is_err());

        // The store would accept this one; the sink must not try.
        let err = sink.upsert(bars("BBB", 1)).await.unwrap_err();
        match err {
            SinkError::ConnectivityLoss { written, message, .. } => {
                assert_eq!(written, 0);
                assert_eq!(message, "connection reset");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.chunk_writes(), 0);
        assert_eq!(store.row_count(STOCK_PRICES), 0);
    }
}
