//! Error types for the benchsync library.

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::validation::ValidationReport;

/// Main error type for benchsync operations.
#[derive(Debug, Error)]
pub enum BenchsyncError {
    /// Structural or semantic row-level validation failure. Carries the full
    /// structured report; occurs before any remote write.
    #[error("validation failed with {} error(s): {}", .0.error_count, .0.summary())]
    Validation(ValidationReport),

    /// A remote entity exists in a state incompatible with the incoming data
    /// and overwrite is disabled.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A required cross-reference could not be resolved remotely. Fatal to
    /// the in-progress upload; no rollback of earlier remote writes.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network/protocol failure from the gateway, propagated unchanged.
    #[error("gateway transport error: {0}")]
    Transport(String),

    /// Multiple modes or db names in one measurement grouping, conflicting
    /// pH values for one medium, duplicate (sample, test) pairs.
    #[error("ambiguous data: {0}")]
    AmbiguousData(String),

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error reading or accessing a file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<GatewayError> for BenchsyncError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound { .. } => BenchsyncError::NotFound(err.to_string()),
            GatewayError::Ambiguous { .. } => BenchsyncError::Conflict(err.to_string()),
            GatewayError::Remote { .. } | GatewayError::Transport(_) => {
                BenchsyncError::Transport(err.to_string())
            }
        }
    }
}

/// Result type alias for benchsync operations.
pub type Result<T> = std::result::Result<T, BenchsyncError>;
