//! Aggregate data models

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Summary statistics derived from a window's current contents.
///
/// Always produced as a snapshot of the incrementally-maintained running
/// state; never recomputed from raw values outside the reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Number of readings in the window
    pub count: usize,

    /// Smallest value in the window
    pub min: f64,

    /// Largest value in the window
    pub max: f64,

    /// Arithmetic mean of the window
    pub mean: f64,

    /// Population standard deviation (count windows only)
    pub stddev: Option<f64>,
}

impl Aggregate {
    /// Aggregate of an empty window
    pub fn empty() -> Self {
        Self {
            count: 0,
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            stddev: None,
        }
    }
}

/// Row shape for the outbound time-series store.
///
/// Upserts are keyed by (sensor_id, metric, window_bucket), so a retried
/// write overwrites rather than appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Owning sensor
    pub sensor_id: String,

    /// Owning metric
    pub metric: String,

    /// Minute bucket the aggregate belongs to
    pub window_bucket: DateTime<Utc>,

    /// Time-window aggregate at the moment of the refresh
    pub aggregate: Aggregate,
}

impl AggregateRow {
    /// Upsert key in the time-series store
    pub fn key(&self) -> (&str, &str, DateTime<Utc>) {
        (&self.sensor_id, &self.metric, self.window_bucket)
    }
}

/// Truncate a timestamp to its minute bucket.
pub fn minute_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_minute_bucket_truncates() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 1, 10, 3, 42).unwrap();
        let bucket = minute_bucket(ts);
        assert_eq!(bucket, Utc.with_ymd_and_hms(2026, 8, 1, 10, 3, 0).unwrap());
    }

    #[test]
    fn test_rows_in_same_minute_share_key() {
        let a = AggregateRow {
            sensor_id: "Loop-01".to_string(),
            metric: "vehicle_count".to_string(),
            window_bucket: minute_bucket(Utc.with_ymd_and_hms(2026, 8, 1, 10, 3, 5).unwrap()),
            aggregate: Aggregate::empty(),
        };
        let b = AggregateRow {
            window_bucket: minute_bucket(Utc.with_ymd_and_hms(2026, 8, 1, 10, 3, 55).unwrap()),
            ..a.clone()
        };
        assert_eq!(a.key(), b.key());
    }
}
