//! Failure taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified outcome of a failed entity.
///
/// Serialized with the variant name (`"NotFound"`, `"Timeout"`, ...) so the
/// run summary reads the same on stdout and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureKind {
    /// Entity unknown upstream.
    NotFound,
    /// Network call exceeded its deadline.
    Timeout,
    /// Upstream asked us to slow down.
    RateLimited,
    /// Expected structure absent from the payload.
    ParseFailure,
    /// Payload present but not convertible into a canonical record.
    ValidationError,
    /// Persistence store unreachable. Fatal to the run.
    ConnectivityLoss,
    /// The store rejected a chunk holding this entity's rows.
    WriteRejected,
}

impl FailureKind {
    /// Transient kinds that are worth one more attempt within the same run.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited)
    }

    /// Kinds that abort the whole run instead of one entity.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::ConnectivityLoss)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::Timeout => "Timeout",
            Self::RateLimited => "RateLimited",
            Self::ParseFailure => "ParseFailure",
            Self::ValidationError => "ValidationError",
            Self::ConnectivityLoss => "ConnectivityLoss",
            Self::WriteRejected => "WriteRejected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalization failure for a single raw record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown schema {name}@{version}")]
    UnknownSchema { name: String, version: u32 },

    #[error("primary key field `{field}` is missing")]
    MissingKey { field: String },

    #[error("field `{field}` has invalid value {value:?}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ValidationError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::ValidationError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::Timeout.is_retryable());
        assert!(FailureKind::RateLimited.is_retryable());
        assert!(!FailureKind::NotFound.is_retryable());
        assert!(!FailureKind::ParseFailure.is_retryable());
        assert!(!FailureKind::ValidationError.is_retryable());
        assert!(FailureKind::ConnectivityLoss.is_fatal());
    }

    #[test]
    fn test_serializes_as_variant_name() {
        let json = serde_json::to_string(&FailureKind::NotFound).unwrap();
        assert_eq!(json, "\"NotFound\"");
        assert_eq!(FailureKind::Timeout.to_string(), "Timeout");
    }
}
