//! Collector errors.

use thiserror::Error;

use asset_core::{FailureKind, SchemaError, SymbolError};
use asset_data::{SinkError, SourceError};

use crate::summary::RunSummary;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("database error: {0}")]
    Sink(#[from] SinkError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("invalid symbol: {0}")]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Aborted(Box<RunAborted>),
}

impl From<RunAborted> for CollectorError {
    fn from(aborted: RunAborted) -> Self {
        CollectorError::Aborted(Box::new(aborted))
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;

/// A run stopped by a fatal failure, with everything accounted up to that
/// point.
#[derive(Debug, Error)]
#[error("run aborted ({kind}): {cause}")]
pub struct RunAborted {
    pub summary: RunSummary,
    pub kind: FailureKind,
    pub cause: String,
}
