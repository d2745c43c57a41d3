//! Sliding windows per (sensor, metric) pair
//!
//! Each pair owns two concurrent windows: a time-bounded window feeding the
//! persisted aggregates, and a count-bounded ring feeding the anomaly
//! statistics. Windows for different pairs never share state.

mod count;
mod time;

pub use count::CountWindow;
pub use time::{TimeInsert, TimeWindow};

use chrono::{DateTime, Utc};

use crate::config::WindowConfig;
use crate::models::{Aggregate, Reading};

/// Outcome of applying a reading to both windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Whether the reading entered the windows
    pub inserted: bool,
    /// Whether it was dropped as too far out of order
    pub out_of_order_dropped: bool,
}

/// Read-only view over one window's current state
#[derive(Debug, Clone, Copy)]
pub struct WindowView {
    /// Aggregate snapshot
    pub aggregate: Aggregate,
    /// Number of readings in the window
    pub len: usize,
}

/// Owns the two windows for one (sensor, metric) pair
#[derive(Debug)]
pub struct WindowManager {
    time: TimeWindow,
    count: CountWindow,
}

impl WindowManager {
    /// Build both windows from configuration
    pub fn new(config: &WindowConfig) -> Self {
        Self {
            time: TimeWindow::new(config.time_window, config.reorder_grace),
            count: CountWindow::new(config.count_window_size),
        }
    }

    /// Apply a validated reading to both windows. A reading dropped as out
    /// of order enters neither window.
    pub fn apply(&mut self, reading: &Reading, now: DateTime<Utc>) -> Applied {
        match self.time.insert(reading.timestamp, reading.value, now) {
            TimeInsert::Inserted => {
                self.count.push(reading.value);
                Applied {
                    inserted: true,
                    out_of_order_dropped: false,
                }
            }
            TimeInsert::OutOfOrderDropped => Applied {
                inserted: false,
                out_of_order_dropped: true,
            },
        }
    }

    /// Snapshot of the time window
    pub fn time_view(&self) -> WindowView {
        WindowView {
            aggregate: self.time.aggregate(),
            len: self.time.len(),
        }
    }

    /// Snapshot of the count window
    pub fn count_view(&self) -> WindowView {
        WindowView {
            aggregate: self.count.aggregate(),
            len: self.count.len(),
        }
    }

    /// Recompute both windows' running stats from raw contents; returns the
    /// larger drift of the two.
    pub fn reconcile(&mut self) -> f64 {
        self.time.reconcile().max(self.count.reconcile())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensorType;
    use chrono::Duration;

    fn reading(value: f64, timestamp: DateTime<Utc>) -> Reading {
        Reading {
            sensor_id: "Loop-01".to_string(),
            sensor_type: SensorType::Traffic,
            metric: "vehicle_count".to_string(),
            value,
            timestamp,
            ingest_sequence: 0,
        }
    }

    #[test]
    fn test_apply_feeds_both_windows() {
        let mut manager = WindowManager::new(&WindowConfig::default());
        let now = Utc::now();

        for i in 0..5 {
            let ts = now + Duration::seconds(i);
            let applied = manager.apply(&reading(10.0 + i as f64, ts), ts);
            assert!(applied.inserted);
        }

        assert_eq!(manager.time_view().len, 5);
        assert_eq!(manager.count_view().len, 5);
        assert_eq!(manager.time_view().aggregate.mean, 12.0);
        assert!(manager.count_view().aggregate.stddev.is_some());
    }

    #[test]
    fn test_stale_reading_enters_neither_window() {
        let mut manager = WindowManager::new(&WindowConfig::default());
        let now = Utc::now();

        let applied = manager.apply(&reading(99.0, now - Duration::minutes(30)), now);
        assert!(applied.out_of_order_dropped);
        assert_eq!(manager.time_view().len, 0);
        assert_eq!(manager.count_view().len, 0);
    }

    #[test]
    fn test_out_of_order_drop_skips_count_window() {
        let mut manager = WindowManager::new(&WindowConfig::default());
        let now = Utc::now();

        manager.apply(&reading(10.0, now), now);
        let applied = manager.apply(&reading(5.0, now - Duration::seconds(120)), now);

        assert!(applied.out_of_order_dropped);
        assert_eq!(manager.time_view().len, 1);
        assert_eq!(manager.count_view().len, 1);
    }
}
