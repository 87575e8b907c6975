//! In-process store with the same chunk contract as Postgres.
//!
//! Used by tests and dry runs. Outcomes of upcoming chunk writes can be
//! scripted to exercise rejection and connectivity-loss handling.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use asset_core::{CanonicalRecord, Schema, Value};

use super::ChunkStore;
use crate::error::ChunkError;

/// One persisted row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub columns: Vec<(String, Value)>,
    /// Upserts applied to this key.
    pub writes: u32,
    pub updated_at: DateTime<Utc>,
}

impl StoredRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, BTreeMap<String, StoredRow>>,
    chunk_writes: usize,
    script: VecDeque<Option<ChunkError>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a failure for the next unscripted chunk write.
    pub fn fail_next_chunk(&self, error: ChunkError) {
        self.state().script.push_back(Some(error));
    }

    /// Queue a success; lets a failure be scheduled after N good chunks.
    pub fn succeed_next_chunk(&self) {
        self.state().script.push_back(None);
    }

    /// Committed chunk transactions.
    pub fn chunk_writes(&self) -> usize {
        self.state().chunk_writes
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state().tables.get(table).map_or(0, BTreeMap::len)
    }

    pub fn get(&self, table: &str, key: &str) -> Option<StoredRow> {
        self.state().tables.get(table)?.get(key).cloned()
    }

    /// Keys of `table` in key order.
    pub fn keys(&self, table: &str) -> Vec<String> {
        self.state()
            .tables
            .get(table)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn write_chunk(&self, schema: &Schema, rows: &[CanonicalRecord]) -> Result<u64, ChunkError> {
        let mut state = self.state();

        if let Some(Some(error)) = state.script.pop_front() {
            return Err(error);
        }

        let now = Utc::now();
        let table = state.tables.entry(schema.table.clone()).or_default();
        for row in rows {
            let columns: Vec<(String, Value)> = schema
                .fields
                .iter()
                .map(|f| f.name.clone())
                .zip(row.values().iter().cloned())
                .collect();

            table
                .entry(row.key())
                .and_modify(|stored| {
                    stored.columns = columns.clone();
                    stored.writes += 1;
                    stored.updated_at = now;
                })
                .or_insert_with(|| StoredRow {
                    columns: columns.clone(),
                    writes: 1,
                    updated_at: now,
                });
        }

        state.chunk_writes += 1;
        Ok(rows.len() as u64)
    }
}
