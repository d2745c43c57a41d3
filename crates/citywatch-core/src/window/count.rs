//! Count-bounded ring window
//!
//! Holds the last K valid readings for one (sensor, metric) pair. The oldest
//! entry is overwritten on insert past capacity; its contribution is
//! subtracted from the running sums before the new value is added, keeping
//! maintenance O(1). Feeds anomaly statistics only, never persisted directly.

use std::collections::VecDeque;

use crate::aggregate::RunningStats;
use crate::models::Aggregate;

/// Fixed-capacity ring window
#[derive(Debug)]
pub struct CountWindow {
    capacity: usize,
    entries: VecDeque<f64>,
    stats: RunningStats,
}

impl CountWindow {
    /// Window holding at most `capacity` readings
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
            stats: RunningStats::new(),
        }
    }

    /// Append a value, returning the evicted one when at capacity
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front().map(|old| {
                let remaining = self.entries.iter().copied();
                self.stats.remove(old, remaining);
                old
            })
        } else {
            None
        };

        self.entries.push_back(value);
        self.stats.add(value);
        evicted
    }

    /// Read-only aggregate snapshot, including stddev
    pub fn aggregate(&self) -> Aggregate {
        self.stats.snapshot(true)
    }

    /// Number of readings currently held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values currently held, oldest first
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().copied()
    }

    /// Recompute the running stats from the raw contents; returns drift
    pub fn reconcile(&mut self) -> f64 {
        let values: Vec<f64> = self.values().collect();
        self.stats.reconcile(values)
    }
}
