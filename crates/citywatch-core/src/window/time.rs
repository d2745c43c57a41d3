//! Time-bounded sliding window
//!
//! Holds readings with `timestamp >= now - span`, strictly ordered by
//! timestamp. Eviction removes from the head only and is fused with insertion
//! so no separate sweep pass is needed.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use crate::aggregate::RunningStats;
use crate::models::Aggregate;

/// Outcome of a time-window insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInsert {
    /// The reading entered the window
    Inserted,
    /// The reading was older than the reorder grace period and was dropped
    OutOfOrderDropped,
}

/// Time-bounded window over one (sensor, metric) pair
#[derive(Debug)]
pub struct TimeWindow {
    span: Duration,
    grace: Duration,
    entries: VecDeque<(DateTime<Utc>, f64)>,
    stats: RunningStats,
}

impl TimeWindow {
    /// Window keeping readings within `span`, tolerating reorders up to
    /// `grace` behind the newest entry.
    pub fn new(span: std::time::Duration, grace: std::time::Duration) -> Self {
        Self {
            span: Duration::from_std(span).unwrap_or_else(|_| Duration::minutes(10)),
            grace: Duration::from_std(grace).unwrap_or_else(|_| Duration::seconds(60)),
            entries: VecDeque::new(),
            stats: RunningStats::new(),
        }
    }

    /// Insert a reading, evicting expired head entries first.
    pub fn insert(&mut self, timestamp: DateTime<Utc>, value: f64, now: DateTime<Utc>) -> TimeInsert {
        self.evict(now);

        // Already past the span: such a reading would be evicted on the
        // spot, so it never enters the window, even when the window is
        // empty after an idle stretch.
        if timestamp < now - self.span {
            return TimeInsert::OutOfOrderDropped;
        }

        match self.entries.back() {
            None => {
                self.entries.push_back((timestamp, value));
                self.stats.add(value);
                TimeInsert::Inserted
            }
            Some(&(newest, _)) if timestamp >= newest => {
                self.entries.push_back((timestamp, value));
                self.stats.add(value);
                TimeInsert::Inserted
            }
            Some(&(newest, _)) if timestamp >= newest - self.grace => {
                // Late but within grace: insert in timestamp position,
                // scanning from the back since reorders are shallow.
                let mut pos = self.entries.len();
                while pos > 0 && self.entries[pos - 1].0 > timestamp {
                    pos -= 1;
                }
                self.entries.insert(pos, (timestamp, value));
                self.stats.add(value);
                TimeInsert::Inserted
            }
            Some(_) => TimeInsert::OutOfOrderDropped,
        }
    }

    /// Drop head entries older than `now - span`
    pub fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.span;
        while let Some(&(ts, _)) = self.entries.front() {
            if ts >= cutoff {
                break;
            }
            if let Some((_, value)) = self.entries.pop_front() {
                let remaining = self.entries.iter().map(|&(_, v)| v);
                self.stats.remove(value, remaining);
            }
        }
    }

    /// Read-only aggregate snapshot (no stddev for time windows)
    pub fn aggregate(&self) -> Aggregate {
        self.stats.snapshot(false)
    }

    /// Number of readings currently held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamps currently held, in window order
    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.entries.iter().map(|&(ts, _)| ts)
    }

    /// Values currently held, in window order
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|&(_, v)| v)
    }

    /// Recompute the running stats from the raw contents; returns drift
    pub fn reconcile(&mut self) -> f64 {
        let values: Vec<f64> = self.values().collect();
        self.stats.reconcile(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn window() -> TimeWindow {
        TimeWindow::new(StdDuration::from_secs(600), StdDuration::from_secs(60))
    }

    #[test]
    fn test_retains_only_readings_within_span() {
        let mut w = window();
        let now = Utc::now();

        w.insert(now - Duration::minutes(15), 1.0, now - Duration::minutes(14));
        w.insert(now - Duration::minutes(5), 2.0, now - Duration::minutes(4));
        w.insert(now, 3.0, now);

        // The 15-minute-old entry fell out of the 10-minute span.
        let kept: Vec<f64> = w.values().collect();
        assert_eq!(kept, vec![2.0, 3.0]);
        let agg = w.aggregate();
        assert_eq!(agg.count, 2);
        assert_eq!(agg.mean, 2.5);
    }

    #[test]
    fn test_entries_stay_time_ordered() {
        let mut w = window();
        let now = Utc::now();

        w.insert(now - Duration::seconds(30), 1.0, now);
        w.insert(now, 3.0, now);
        // Late by 10 seconds: inside grace, lands between the two.
        let result = w.insert(now - Duration::seconds(10), 2.0, now);
        assert_eq!(result, TimeInsert::Inserted);

        let stamps: Vec<_> = w.timestamps().collect();
        let mut sorted = stamps.clone();
        sorted.sort();
        assert_eq!(stamps, sorted);
        assert_eq!(w.values().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_older_than_grace_is_dropped() {
        let mut w = window();
        let now = Utc::now();

        w.insert(now, 3.0, now);
        let result = w.insert(now - Duration::seconds(90), 1.0, now);
        assert_eq!(result, TimeInsert::OutOfOrderDropped);
        assert_eq!(w.len(), 1);
        assert_eq!(w.aggregate().count, 1);
    }

    #[test]
    fn test_stale_reading_into_idle_window_is_dropped() {
        let mut w = window();
        let now = Utc::now();

        // Nothing to evict, but the reading itself is past the span: a
        // delayed reading after an idle stretch must not enter the window.
        let result = w.insert(now - Duration::minutes(30), 99.0, now);
        assert_eq!(result, TimeInsert::OutOfOrderDropped);
        assert!(w.is_empty());
        assert_eq!(w.aggregate().count, 0);

        // A reading inside the span is still fine.
        assert_eq!(w.insert(now - Duration::minutes(5), 1.0, now), TimeInsert::Inserted);
    }

    #[test]
    fn test_eviction_updates_aggregate() {
        let mut w = window();
        let start = Utc::now();

        w.insert(start, 10.0, start);
        w.insert(start + Duration::minutes(1), 20.0, start + Duration::minutes(1));
        assert_eq!(w.aggregate().mean, 15.0);

        // Eleven minutes later the first entry has expired.
        let later = start + Duration::minutes(11);
        w.insert(later, 30.0, later);
        let agg = w.aggregate();
        assert_eq!(agg.count, 2);
        assert_eq!(agg.mean, 25.0);
        assert_eq!(agg.min, 20.0);
    }
}
