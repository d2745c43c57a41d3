//! Incremental aggregate maintenance
//!
//! Running sums are updated on every window insert and evict; aggregates are
//! never recomputed from raw values on the hot path. A periodic
//! reconciliation pass bounds floating-point drift.

use crate::models::Aggregate;

/// Running statistics kept alongside a window.
///
/// `add` and `remove` are O(1) except when the removed value was the current
/// extremum, which triggers a rescan of the surviving values.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: usize,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Build stats from scratch by scanning values
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut stats = Self::new();
        for v in values {
            stats.add(v);
        }
        stats
    }

    /// Number of values currently reflected in the stats
    pub fn count(&self) -> usize {
        self.count
    }

    /// Account for a newly inserted value
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    /// Subtract an evicted value. `remaining` supplies the surviving window
    /// contents for the min/max rescan when the evicted value was the
    /// extremum.
    pub fn remove<I: Iterator<Item = f64>>(&mut self, value: f64, remaining: I) {
        debug_assert!(self.count > 0, "remove from empty stats");
        self.count = self.count.saturating_sub(1);

        if self.count == 0 {
            *self = Self::new();
            return;
        }

        self.sum -= value;
        self.sum_sq -= value * value;

        if value <= self.min || value >= self.max {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for v in remaining {
                min = min.min(v);
                max = max.max(v);
            }
            self.min = min;
            self.max = max;
        }
    }

    /// Arithmetic mean
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Population standard deviation, guarded against negative rounding
    pub fn stddev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self.sum_sq / self.count as f64 - mean * mean;
        variance.max(0.0).sqrt()
    }

    /// Read-only aggregate snapshot
    pub fn snapshot(&self, with_stddev: bool) -> Aggregate {
        if self.count == 0 {
            return Aggregate::empty();
        }
        Aggregate {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.mean(),
            stddev: with_stddev.then(|| self.stddev()),
        }
    }

    /// Recompute the stats from the raw window contents, replacing the
    /// running state. Returns the largest absolute drift observed between
    /// the incremental and recomputed sums.
    pub fn reconcile<I: IntoIterator<Item = f64>>(&mut self, values: I) -> f64 {
        let fresh = Self::from_values(values);
        debug_assert_eq!(fresh.count, self.count, "reconcile count mismatch");

        let drift = (fresh.sum - self.sum)
            .abs()
            .max((fresh.sum_sq - self.sum_sq).abs());
        *self = fresh;
        drift
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_add_remove_tracks_extremes() {
        let mut stats = RunningStats::new();
        for v in [3.0, 7.0, 1.0, 9.0] {
            stats.add(v);
        }
        assert_eq!(stats.snapshot(false).min, 1.0);
        assert_eq!(stats.snapshot(false).max, 9.0);

        // Evicting the max forces a rescan of the remaining values.
        let remaining = [3.0, 7.0, 1.0];
        stats.remove(9.0, remaining.iter().copied());
        let agg = stats.snapshot(false);
        assert_eq!(agg.max, 7.0);
        assert_eq!(agg.min, 1.0);
        assert_eq!(agg.count, 3);
    }

    #[test]
    fn test_remove_last_value_resets() {
        let mut stats = RunningStats::new();
        stats.add(5.0);
        stats.remove(5.0, std::iter::empty());
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.snapshot(true), Aggregate::empty());
    }

    #[test]
    fn test_stddev_never_negative_under_rounding() {
        let mut stats = RunningStats::new();
        // Identical values: variance should be exactly zero, but the
        // sum-of-squares form can dip slightly negative.
        for _ in 0..100 {
            stats.add(0.1);
        }
        assert!(stats.stddev() >= 0.0);
        assert!(stats.stddev() < 1e-6);
    }

    #[test]
    fn test_mean_of_empty_is_zero() {
        assert_eq!(RunningStats::new().mean(), 0.0);
    }

    proptest! {
        /// Incremental maintenance must agree with a from-scratch recompute
        /// within floating-point tolerance, including after evictions.
        #[test]
        fn prop_reconcile_matches_incremental(values in prop::collection::vec(-1000.0f64..1000.0, 1..64)) {
            let mut stats = RunningStats::new();
            let mut window: Vec<f64> = Vec::new();

            for &v in &values {
                window.push(v);
                stats.add(v);
                // Bound the window at 20 like the count window does.
                if window.len() > 20 {
                    let evicted = window.remove(0);
                    stats.remove(evicted, window.iter().copied());
                }
            }

            let incremental = stats.snapshot(true);
            let drift = stats.reconcile(window.iter().copied());
            let recomputed = stats.snapshot(true);

            prop_assert!(drift < 1e-6);
            prop_assert!((incremental.mean - recomputed.mean).abs() < 1e-9);
            prop_assert!((incremental.stddev.unwrap() - recomputed.stddev.unwrap()).abs() < 1e-6);
            prop_assert_eq!(incremental.min, recomputed.min);
            prop_assert_eq!(incremental.max, recomputed.max);
        }
    }
}
