//! Operational counters
//!
//! Each worker owns its counters; engine-wide totals exist only as merged
//! snapshots taken at export time. The same increments are mirrored to the
//! `metrics` recorder so the Prometheus exporter sees them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ValidationError;

/// Counters owned by one sensor worker
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    processed: AtomicU64,
    rejected_out_of_range: AtomicU64,
    rejected_malformed: AtomicU64,
    rejected_stale: AtomicU64,
    rejected_future: AtomicU64,
    out_of_order_dropped: AtomicU64,
    anomalies: AtomicU64,
    alert_transitions: AtomicU64,
    notifications: AtomicU64,
    sink_drops: AtomicU64,
    missing_profiles: AtomicU64,
}

impl WorkerMetrics {
    /// A reading made it through the full pipeline
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("citywatch_readings_processed_total").increment(1);
    }

    /// A reading was rejected before or at the window stage
    pub fn record_rejection(&self, error: &ValidationError) {
        let counter = match error {
            ValidationError::OutOfRange { .. } => &self.rejected_out_of_range,
            ValidationError::MalformedPayload(_) => &self.rejected_malformed,
            ValidationError::StaleTimestamp { .. } => &self.rejected_stale,
            ValidationError::FutureTimestamp { .. } => &self.rejected_future,
            ValidationError::OutOfOrderDropped => &self.out_of_order_dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("citywatch_readings_rejected_total", "reason" => error.kind())
            .increment(1);
    }

    /// An anomaly flag was produced
    pub fn record_anomaly(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("citywatch_anomalies_total").increment(1);
    }

    /// Alert transitions were emitted
    pub fn record_alert_transitions(&self, count: u64) {
        if count > 0 {
            self.alert_transitions.fetch_add(count, Ordering::Relaxed);
            metrics::counter!("citywatch_alert_transitions_total").increment(count);
        }
    }

    /// A notification intent was emitted
    pub fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("citywatch_notifications_total").increment(1);
    }

    /// A sink event was dropped because the writer queue stayed full
    pub fn record_sink_drop(&self) {
        self.sink_drops.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("citywatch_sink_drops_total").increment(1);
    }

    /// A metric had no threshold profile; monitoring continues without alerts
    pub fn record_missing_profile(&self) {
        self.missing_profiles.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("citywatch_missing_profiles_total").increment(1);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            rejected_out_of_range: self.rejected_out_of_range.load(Ordering::Relaxed),
            rejected_malformed: self.rejected_malformed.load(Ordering::Relaxed),
            rejected_stale: self.rejected_stale.load(Ordering::Relaxed),
            rejected_future: self.rejected_future.load(Ordering::Relaxed),
            out_of_order_dropped: self.out_of_order_dropped.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            alert_transitions: self.alert_transitions.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            sink_drops: self.sink_drops.load(Ordering::Relaxed),
            missing_profiles: self.missing_profiles.load(Ordering::Relaxed),
        }
    }
}

/// Plain-data view of worker counters; summable across workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Readings fully processed
    pub processed: u64,
    /// Rejections: value outside the configured range
    pub rejected_out_of_range: u64,
    /// Rejections: missing fields, unknown metric, non-finite value
    pub rejected_malformed: u64,
    /// Rejections: older than the retention horizon
    pub rejected_stale: u64,
    /// Rejections: ahead of the ingest clock
    pub rejected_future: u64,
    /// Readings dropped past the reorder grace period
    pub out_of_order_dropped: u64,
    /// Anomaly flags produced
    pub anomalies: u64,
    /// Alert state transitions emitted
    pub alert_transitions: u64,
    /// Notification intents emitted
    pub notifications: u64,
    /// Sink events dropped under backpressure
    pub sink_drops: u64,
    /// Readings for metrics without a threshold profile
    pub missing_profiles: u64,
}

impl MetricsSnapshot {
    /// Fold another worker's snapshot into this one
    pub fn merge(&mut self, other: &MetricsSnapshot) {
        self.processed += other.processed;
        self.rejected_out_of_range += other.rejected_out_of_range;
        self.rejected_malformed += other.rejected_malformed;
        self.rejected_stale += other.rejected_stale;
        self.rejected_future += other.rejected_future;
        self.out_of_order_dropped += other.out_of_order_dropped;
        self.anomalies += other.anomalies;
        self.alert_transitions += other.alert_transitions;
        self.notifications += other.notifications;
        self.sink_drops += other.sink_drops;
        self.missing_profiles += other.missing_profiles;
    }

    /// Total rejected readings across all reasons
    pub fn rejected_total(&self) -> u64 {
        self.rejected_out_of_range
            + self.rejected_malformed
            + self.rejected_stale
            + self.rejected_future
            + self.out_of_order_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_counted_by_kind() {
        let m = WorkerMetrics::default();
        m.record_rejection(&ValidationError::OutOfRange {
            metric: "pm25".to_string(),
            value: 2000.0,
            min: 0.0,
            max: 1000.0,
        });
        m.record_rejection(&ValidationError::OutOfOrderDropped);

        let snap = m.snapshot();
        assert_eq!(snap.rejected_out_of_range, 1);
        assert_eq!(snap.out_of_order_dropped, 1);
        assert_eq!(snap.rejected_total(), 2);
    }

    #[test]
    fn test_merge_sums_counters() {
        let a = MetricsSnapshot {
            processed: 10,
            anomalies: 2,
            ..Default::default()
        };
        let mut b = MetricsSnapshot {
            processed: 5,
            sink_drops: 1,
            ..Default::default()
        };
        b.merge(&a);
        assert_eq!(b.processed, 15);
        assert_eq!(b.anomalies, 2);
        assert_eq!(b.sink_drops, 1);
    }
}
