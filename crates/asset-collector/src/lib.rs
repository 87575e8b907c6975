//! Ingestion coordinator and collection workflows.
//!
//! The [`Coordinator`] drives any [`asset_data::SourceAdapter`] over a list
//! of entities with bounded concurrency, request pacing, bounded retry and
//! cancellation, writing through an [`asset_data::ChunkedSink`]. The
//! [`modules`] wire it to the concrete sources used by the CLI.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod modules;
pub mod retry;
pub mod summary;
pub mod throttle;

pub use config::{mask_database_url, CollectorConfig};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use error::{CollectorError, Result, RunAborted};
pub use retry::{with_retry, RetryConfig, Retryable};
pub use summary::RunSummary;
pub use throttle::Throttle;
