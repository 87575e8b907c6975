//! Source adapters and persistence for asset ingestion.
//!
//! - [`source`]: Yahoo Finance quotes and history, SET quote and directory
//!   pages, the S&P 500 constituents table
//! - [`selector`]: ordered CSS selector strategies for scraped pages
//! - [`webdriver`]: W3C WebDriver session for script-rendered pages
//! - [`sink`]: chunked upserts into Postgres or memory

pub mod database;
pub mod error;
pub mod http;
pub mod selector;
pub mod sink;
pub mod source;
pub mod webdriver;

pub use database::{Database, DatabaseConfig};
pub use error::{ChunkError, SinkError, SourceError};
pub use http::HttpSettings;
pub use selector::{SelectorStrategy, StrategyMatch};
pub use sink::{ChunkStore, ChunkedSink, MemoryStore, PgStore, RejectedChunk, UpsertReport};
pub use source::{
    DirectoryPage, SetDirectoryAdapter, SetPriceAdapter, SourceAdapter, Sp500DirectoryAdapter,
    Sp500Page, YahooHistoryAdapter, YahooQuoteAdapter,
};
pub use webdriver::WebDriverSession;
