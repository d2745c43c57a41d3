//! Sensor reading data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of physical sensor producing readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    /// Inductive traffic loop (vehicle counts, speeds, wait times)
    Traffic,
    /// Air quality station (PM2.5, CO, temperature)
    AirQuality,
    /// Noise level meter
    Noise,
}

impl SensorType {
    /// Stable string form, matching the wire format
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Traffic => "traffic",
            Self::AirQuality => "air_quality",
            Self::Noise => "noise",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single measurement delivered by the ingestion adapter.
///
/// Immutable once validated; consumed exactly once per window instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    /// Sensor identifier (e.g., "Loop-01", "Air-03")
    pub sensor_id: String,

    /// Kind of sensor that produced the reading
    pub sensor_type: SensorType,

    /// Metric name (e.g., "vehicle_count", "pm25", "noise_db")
    pub metric: String,

    /// Measured value
    pub value: f64,

    /// Capture timestamp from the sensor clock
    pub timestamp: DateTime<Utc>,

    /// Monotonic sequence number assigned by the ingestion adapter
    #[serde(default)]
    pub ingest_sequence: u64,
}

impl Reading {
    /// Partition key for worker routing and window ownership
    pub fn partition_key(&self) -> (&str, &str) {
        (&self.sensor_id, &self.metric)
    }
}
