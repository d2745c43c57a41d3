//! Anomaly flag data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a reading was flagged as anomalous
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyReason {
    /// Deviation from the rolling mean exceeded the z-score threshold
    ZScore,
    /// Traffic metric spiked past the spike ratio of the rolling mean
    TrafficSpike,
}

/// A reading classified as anomalous against its rolling statistics.
///
/// Ephemeral: produced per reading and consumed immediately by the alert
/// evaluator, never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyFlag {
    /// Sensor that produced the anomalous reading
    pub sensor_id: String,

    /// Metric the reading belongs to
    pub metric: String,

    /// Timestamp of the anomalous reading
    pub timestamp: DateTime<Utc>,

    /// Normalized deviation: (value - mean) / stddev for z-score hits,
    /// value / mean for traffic spikes
    pub score: f64,

    /// Rule that fired
    pub reason: AnomalyReason,
}
