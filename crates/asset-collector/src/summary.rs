//! Run accounting.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use asset_core::FailureKind;
use asset_data::RejectedChunk;

/// Outcome of one ingestion run, printed as JSON on completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Adapter that produced the records.
    pub source: String,
    pub succeeded: Vec<String>,
    pub succeeded_count: usize,
    pub failed: BTreeMap<String, FailureKind>,
    pub failed_count: usize,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
    /// Entities never started because the run was cancelled or aborted.
    pub cancelled: Vec<String>,
    /// Rows in committed chunks.
    pub records_written: usize,
    pub chunks: usize,
    pub rejected_chunks: Vec<RejectedChunk>,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((elapsed.as_secs_f64() * 1000.0).round() / 1000.0)
}

impl RunSummary {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.cancelled.len()
    }

    /// Succeeded share of the entities that were attempted, in percent.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.succeeded.len() + self.failed.len();
        if attempted == 0 {
            0.0
        } else {
            (self.succeeded.len() as f64 / attempted as f64) * 100.0
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    /// Entity counts per failure kind.
    pub fn failure_counts(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for kind in self.failed.values() {
            *counts.entry(*kind).or_insert(0) += 1;
        }
        counts
    }

    /// Stable ordering and derived counts for output. Called once the
    /// entity lists are complete.
    pub fn finalize(&mut self) {
        self.succeeded.sort();
        self.cancelled.sort();
        self.succeeded_count = self.succeeded.len();
        self.failed_count = self.failed.len();
        self.failures_by_kind = self.failure_counts();
    }

    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            source = %self.source,
            total = self.total(),
            succeeded = self.succeeded.len(),
            failed = self.failed.len(),
            cancelled = self.cancelled.len(),
            records_written = self.records_written,
            chunks = self.chunks,
            rejected_chunks = self.rejected_chunks.len(),
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "run finished"
        );

        for (kind, count) in self.failure_counts() {
            tracing::warn!(operation = operation, kind = %kind, entities = count, "failures");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_ignores_cancelled() {
        let mut summary = RunSummary::new("yahoo-quote");
        summary.succeeded = vec!["AAA".into(), "BBB".into(), "CCC".into()];
        summary.failed.insert("DDD".into(), FailureKind::NotFound);
        summary.cancelled = vec!["EEE".into()];

        assert_eq!(summary.total(), 5);
        assert!((summary.success_rate() - 75.0).abs() < 1e-9);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_empty_run() {
        let summary = RunSummary::new("sp500");
        assert_eq!(summary.success_rate(), 0.0);
        assert!(summary.is_clean());
    }

    #[test]
    fn test_json_shape() {
        let mut summary = RunSummary::new("yahoo-quote");
        summary.succeeded.push("AAA".into());
        summary.failed.insert("CCC".into(), FailureKind::Timeout);
        summary.failed.insert("BBB".into(), FailureKind::NotFound);
        summary.records_written = 1;
        summary.chunks = 1;
        summary.elapsed = Duration::from_millis(1250);
        summary.finalize();

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["succeeded"], serde_json::json!(["AAA"]));
        assert_eq!(
            json["failed"],
            serde_json::json!({"BBB": "NotFound", "CCC": "Timeout"})
        );
        assert_eq!(json["succeeded_count"], 1);
        assert_eq!(json["failed_count"], 2);
        assert_eq!(
            json["failures_by_kind"],
            serde_json::json!({"NotFound": 1, "Timeout": 1})
        );
        assert_eq!(json["records_written"], 1);
        assert_eq!(json["elapsed"], 1.25);
    }

    #[test]
    fn test_failure_counts() {
        let mut summary = RunSummary::new("set-web");
        summary.failed.insert("A".into(), FailureKind::NotFound);
        summary.failed.insert("B".into(), FailureKind::NotFound);
        summary.failed.insert("C".into(), FailureKind::ParseFailure);

        let counts = summary.failure_counts();
        assert_eq!(counts[&FailureKind::NotFound], 2);
        assert_eq!(counts[&FailureKind::ParseFailure], 1);
    }
}
