//! Ingestion coordinator.
//!
//! Drives one adapter over a list of entities:
//!
//! ```text
//! throttle -> fetch (retry) -> normalize -> upsert -> account
//! ```
//!
//! Each entity fails on its own; only connectivity loss on the store ends
//! the run early. Cancellation and the optional deadline stop scheduling,
//! letting in-flight entities finish.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use asset_core::{FailureKind, Normalizer};
use asset_data::{ChunkedSink, RejectedChunk, SinkError, SourceAdapter};

use crate::error::RunAborted;
use crate::retry::{with_retry, RetryConfig};
use crate::summary::RunSummary;
use crate::throttle::Throttle;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub concurrency: usize,
    pub request_delay: Duration,
    pub retry: RetryConfig,
    /// Stop scheduling new entities after this long.
    pub deadline: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            request_delay: Duration::from_millis(500),
            retry: RetryConfig::default(),
            deadline: None,
        }
    }
}

enum Outcome {
    Succeeded {
        entity: String,
        written: usize,
        chunks: usize,
    },
    Failed {
        entity: String,
        kind: FailureKind,
        written: usize,
        chunks: usize,
        rejected: Vec<RejectedChunk>,
    },
    Cancelled {
        entity: String,
    },
    Aborted {
        entity: String,
        written: usize,
        chunks: usize,
        cause: String,
    },
}

impl Outcome {
    fn failed(entity: String, kind: FailureKind) -> Self {
        Outcome::Failed {
            entity,
            kind,
            written: 0,
            chunks: 0,
            rejected: Vec::new(),
        }
    }
}

pub struct Coordinator<A: SourceAdapter> {
    adapter: A,
    normalizer: Normalizer,
    sink: Arc<ChunkedSink>,
    throttle: Throttle,
    config: CoordinatorConfig,
    cancel: CancellationToken,
}

impl<A: SourceAdapter> Coordinator<A> {
    pub fn new(
        adapter: A,
        normalizer: Normalizer,
        sink: Arc<ChunkedSink>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            throttle: Throttle::new(config.request_delay),
            adapter,
            normalizer,
            sink,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop scheduling when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Ingest `entities`, returning per-entity accounting.
    ///
    /// The adapter is closed before returning on every path.
    pub async fn run(&self, entities: Vec<A::Entity>) -> Result<RunSummary, RunAborted> {
        let started = Instant::now();
        let deadline = self.config.deadline.map(|d| started + d);
        // Child token: an abort stops this run without touching the caller's token.
        let stop = self.cancel.child_token();

        info!(
            source = self.adapter.name(),
            schema = %self.adapter.schema(),
            entities = entities.len(),
            concurrency = self.config.concurrency,
            "run started"
        );

        let outcomes: Vec<Outcome> = stream::iter(entities)
            .map(|entity| self.process(entity, &stop, deadline))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        self.adapter.close().await;

        let mut summary = RunSummary::new(self.adapter.name());
        let mut abort_cause = None;

        for outcome in outcomes {
            match outcome {
                Outcome::Succeeded { entity, written, chunks } => {
                    summary.records_written += written;
                    summary.chunks += chunks;
                    summary.succeeded.push(entity);
                }
                Outcome::Failed {
                    entity,
                    kind,
                    written,
                    chunks,
                    rejected,
                } => {
                    summary.records_written += written;
                    summary.chunks += chunks;
                    summary.rejected_chunks.extend(rejected);
                    summary.failed.insert(entity, kind);
                }
                Outcome::Cancelled { entity } => summary.cancelled.push(entity),
                Outcome::Aborted {
                    entity,
                    written,
                    chunks,
                    cause,
                } => {
                    summary.records_written += written;
                    summary.chunks += chunks;
                    summary.failed.insert(entity, FailureKind::ConnectivityLoss);
                    abort_cause.get_or_insert(cause);
                }
            }
        }

        summary.finalize();
        summary.elapsed = started.elapsed();

        match abort_cause {
            Some(cause) => Err(RunAborted {
                summary,
                kind: FailureKind::ConnectivityLoss,
                cause,
            }),
            None => Ok(summary),
        }
    }

    async fn process(
        &self,
        entity: A::Entity,
        stop: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Outcome {
        let name = entity.to_string();

        if stop.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d) {
            debug!(entity = %name, "not scheduled");
            return Outcome::Cancelled { entity: name };
        }

        let (this, target) = (self, &entity);
        let fetched = with_retry(&self.config.retry, || async move {
            this.throttle.acquire().await;
            this.adapter.fetch(target).await
        })
        .await;

        let raw = match fetched {
            Ok(raw) if raw.is_empty() => {
                warn!(entity = %name, "no records returned");
                return Outcome::failed(name, FailureKind::NotFound);
            }
            Ok(raw) => raw,
            Err(e) => {
                warn!(entity = %name, kind = %e.kind(), error = %e, "fetch failed");
                return Outcome::failed(name, e.kind());
            }
        };

        let records = match self.normalizer.normalize_all(&raw, &self.adapter.schema()) {
            Ok(records) => records,
            Err(e) => {
                warn!(entity = %name, error = %e, "record rejected by normalizer");
                return Outcome::failed(name, e.kind());
            }
        };

        let count = records.len();
        match self.sink.upsert(records).await {
            Ok(report) if report.is_clean() => {
                info!(entity = %name, records = count, chunks = report.chunks, "entity ingested");
                Outcome::Succeeded {
                    entity: name,
                    written: report.written,
                    chunks: report.chunks,
                }
            }
            Ok(report) => {
                warn!(
                    entity = %name,
                    written = report.written,
                    rejected_chunks = report.rejected.len(),
                    "rows rejected by store"
                );
                Outcome::Failed {
                    entity: name,
                    kind: FailureKind::WriteRejected,
                    written: report.written,
                    chunks: report.chunks,
                    rejected: report.rejected,
                }
            }
            Err(SinkError::ConnectivityLoss {
                written,
                chunks,
                message,
            }) => {
                warn!(entity = %name, written = written, error = %message, "store unreachable, aborting run");
                stop.cancel();
                Outcome::Aborted {
                    entity: name,
                    written,
                    chunks,
                    cause: message,
                }
            }
            Err(e) => {
                warn!(entity = %name, error = %e, "write failed");
                Outcome::failed(name, FailureKind::WriteRejected)
            }
        }
    }
}
