//! Error types for source adapters and the persistence sink.

use asset_core::FailureKind;
use reqwest::StatusCode;
use thiserror::Error;

/// Message fragments Yahoo uses for unknown or delisted tickers.
const NOT_FOUND_PATTERNS: &[&str] = &[
    "not found",
    "404",
    "no data found",
    "delisted",
    "invalid symbol",
    "no timezone found",
    "emptydataset",
    "noquotes",
    "noresult",
];

/// Classified fetch failure.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("parse failure: {0}")]
    Parse(String),
}

impl SourceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::RateLimited(_) => FailureKind::RateLimited,
            Self::Parse(_) => FailureKind::ParseFailure,
        }
    }

    /// Map a non-success HTTP status.
    pub fn from_status(status: StatusCode, url: &str) -> Self {
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => Self::NotFound(format!("{status} {url}")),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited(format!("{status} {url}")),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                Self::Timeout(format!("{status} {url}"))
            }
            _ => Self::Parse(format!("unexpected status {status} from {url}")),
        }
    }

    /// Classify a `yahoo_finance_api` error by its rendered message.
    pub fn from_yahoo(error: &yahoo_finance_api::YahooError, ticker: &str) -> Self {
        let msg = format!("{error:?}");
        let lower = msg.to_lowercase();

        if lower.contains("429") || lower.contains("too many") {
            Self::RateLimited(format!("{ticker}: {msg}"))
        } else if lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout(format!("{ticker}: {msg}"))
        } else if NOT_FOUND_PATTERNS.iter().any(|p| lower.contains(p)) {
            Self::NotFound(format!("{ticker}: {msg}"))
        } else if lower.contains("connect") {
            Self::Timeout(format!("{ticker}: {msg}"))
        } else {
            Self::Parse(format!("{ticker}: {msg}"))
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        if e.is_timeout() || e.is_connect() {
            Self::Timeout(format!("{url}: {e}"))
        } else if let Some(status) = e.status() {
            Self::from_status(status, &url)
        } else if e.is_decode() || e.is_body() {
            Self::Parse(format!("{url}: {e}"))
        } else {
            Self::Timeout(format!("{url}: {e}"))
        }
    }
}

/// Failure writing one chunk.
#[derive(Debug, Clone, Error)]
pub enum ChunkError {
    /// The store refused the statement (constraint, type mismatch, ...).
    #[error("chunk rejected: {0}")]
    Rejected(String),

    /// The store could not be reached.
    #[error("store unreachable: {0}")]
    Unreachable(String),
}

impl From<sqlx::Error> for ChunkError {
    fn from(e: sqlx::Error) -> Self {
        if is_connectivity_error(&e) {
            Self::Unreachable(e.to_string())
        } else {
            Self::Rejected(e.to_string())
        }
    }
}

/// Errors that end an upsert call.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Fatal: the run must stop. `written` rows in `chunks` transactions
    /// were committed before the loss.
    #[error("store unreachable after {written} rows written: {message}")]
    ConnectivityLoss {
        written: usize,
        chunks: usize,
        message: String,
    },

    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl SinkError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ConnectivityLoss { .. } => FailureKind::ConnectivityLoss,
            Self::Bootstrap(_) | Self::Query(_) => FailureKind::WriteRejected,
        }
    }
}

impl From<sqlx::Error> for SinkError {
    fn from(e: sqlx::Error) -> Self {
        if is_connectivity_error(&e) {
            Self::ConnectivityLoss {
                written: 0,
                chunks: 0,
                message: e.to_string(),
            }
        } else {
            Self::Query(e.to_string())
        }
    }
}

/// Errors meaning the database is gone rather than the statement being bad.
pub fn is_connectivity_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let url = "https://example.test/x";
        assert_eq!(
            SourceError::from_status(StatusCode::NOT_FOUND, url).kind(),
            FailureKind::NotFound
        );
        assert_eq!(
            SourceError::from_status(StatusCode::GONE, url).kind(),
            FailureKind::NotFound
        );
        assert_eq!(
            SourceError::from_status(StatusCode::TOO_MANY_REQUESTS, url).kind(),
            FailureKind::RateLimited
        );
        assert_eq!(
            SourceError::from_status(StatusCode::INTERNAL_SERVER_ERROR, url).kind(),
            FailureKind::ParseFailure
        );
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(is_connectivity_error(&sqlx::Error::PoolTimedOut));
        assert!(is_connectivity_error(&sqlx::Error::PoolClosed));
        assert!(!is_connectivity_error(&sqlx::Error::RowNotFound));

        let chunk: ChunkError = sqlx::Error::RowNotFound.into();
        assert!(matches!(chunk, ChunkError::Rejected(_)));
        let sink: SinkError = sqlx::Error::PoolClosed.into();
        assert_eq!(sink.kind(), FailureKind::ConnectivityLoss);
    }
}
