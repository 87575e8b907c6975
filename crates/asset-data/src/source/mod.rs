//! Source adapters.
//!
//! Each adapter turns one entity (a ticker, a directory page) into zero or
//! more [`RawRecord`]s, or a classified [`SourceError`]. Adapters never
//! retry or sleep; pacing is the coordinator's job.

use std::fmt;

use async_trait::async_trait;

use asset_core::{RawRecord, SchemaId};

use crate::error::SourceError;

pub mod set_directory;
pub mod set_price;
pub mod sp500;
pub mod yahoo;

pub use set_directory::{DirectoryPage, SetDirectoryAdapter, SET_INDUSTRY_GROUPS};
pub use set_price::SetPriceAdapter;
pub use sp500::{Sp500DirectoryAdapter, Sp500Page};
pub use yahoo::{YahooHistoryAdapter, YahooQuoteAdapter};

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unit of work. Its `Display` form keys the run summary.
    type Entity: Clone + fmt::Display + Send + Sync + 'static;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Schema the emitted raw records normalize into.
    fn schema(&self) -> SchemaId;

    async fn fetch(&self, entity: &Self::Entity) -> Result<Vec<RawRecord>, SourceError>;

    /// Release run-scoped resources. Called once at the end of every run.
    async fn close(&self) {}
}
