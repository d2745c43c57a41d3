//! Error types for CityWatch

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias using CityWatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for CityWatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// A reading failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An outbound persistence write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A notification dispatch failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Channel error (worker or writer queue)
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a channel error
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }
}

/// Why a reading was rejected before reaching a window.
///
/// Rejections are recovered locally: counted, logged at debug level, and the
/// stream continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Value outside the configured range for its metric
    #[error("{metric} value {value} outside [{min}, {max}]")]
    OutOfRange {
        /// Metric name
        metric: String,
        /// Offending value
        value: f64,
        /// Inclusive lower bound
        min: f64,
        /// Inclusive upper bound
        max: f64,
    },

    /// Required fields missing, unknown metric, or non-finite value
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Timestamp older than the retention horizon
    #[error("timestamp {timestamp} older than the retention horizon")]
    StaleTimestamp {
        /// Offending timestamp
        timestamp: DateTime<Utc>,
    },

    /// Timestamp ahead of the ingest clock beyond the allowed skew
    #[error("timestamp {timestamp} ahead of the ingest clock")]
    FutureTimestamp {
        /// Offending timestamp
        timestamp: DateTime<Utc>,
    },

    /// Reading arrived later than the reorder grace period allows
    #[error("reading older than the reorder grace period")]
    OutOfOrderDropped,
}

impl ValidationError {
    /// Stable label for rejection counters
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OutOfRange { .. } => "out_of_range",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::StaleTimestamp { .. } => "stale_timestamp",
            Self::FutureTimestamp { .. } => "future_timestamp",
            Self::OutOfOrderDropped => "out_of_order_dropped",
        }
    }
}
