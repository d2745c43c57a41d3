//! Statistical anomaly detection
//!
//! A fast, explainable detector over the count window's rolling statistics.
//! Stateless given the aggregate it is handed; all state lives in the window.

use crate::config::AnomalyConfig;
use crate::models::{Aggregate, AnomalyFlag, AnomalyReason, Reading, SensorType};

/// Z-scores are clamped so a zero-stddev window with a deviating value still
/// produces a finite score.
const MAX_SCORE: f64 = 1e6;

/// Classifies readings against rolling statistics
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    z_threshold: f64,
    min_samples: usize,
    spike_ratio: f64,
}

impl AnomalyDetector {
    /// Build a detector from configuration
    pub fn new(config: &AnomalyConfig) -> Self {
        Self {
            z_threshold: config.z_threshold,
            min_samples: config.min_samples,
            spike_ratio: config.spike_ratio,
        }
    }

    /// Classify one reading against the count window's aggregate.
    ///
    /// Returns `None` both for "normal" and for "insufficient data": fewer
    /// than `min_samples` readings is no verdict, not a clean bill.
    pub fn classify(&self, reading: &Reading, aggregate: &Aggregate) -> Option<AnomalyFlag> {
        if aggregate.count < self.min_samples {
            return None;
        }

        let stddev = aggregate.stddev.unwrap_or(0.0);
        let score = ((reading.value - aggregate.mean) / stddev.max(f64::MIN_POSITIVE))
            .clamp(-MAX_SCORE, MAX_SCORE);

        if score.abs() > self.z_threshold {
            return Some(self.flag(reading, score, AnomalyReason::ZScore));
        }

        // Absolute spike rule for traffic metrics: a reading more than
        // spike_ratio times the rolling mean is anomalous even when the
        // window variance is too high for the z-rule to fire.
        if reading.sensor_type == SensorType::Traffic
            && aggregate.mean > 0.0
            && reading.value > self.spike_ratio * aggregate.mean
        {
            let ratio = reading.value / aggregate.mean;
            return Some(self.flag(reading, ratio, AnomalyReason::TrafficSpike));
        }

        None
    }

    fn flag(&self, reading: &Reading, score: f64, reason: AnomalyReason) -> AnomalyFlag {
        AnomalyFlag {
            sensor_id: reading.sensor_id.clone(),
            metric: reading.metric.clone(),
            timestamp: reading.timestamp,
            score,
            reason,
        }
    }
}
