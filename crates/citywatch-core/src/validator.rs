//! Reading validation
//!
//! Rejects out-of-range and malformed readings before they can touch a
//! window. Rejections are counted by the owning worker and the stream
//! continues.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::config::{MetricRange, ValidationConfig};
use crate::error::ValidationError;
use crate::models::{Reading, SensorType};

/// Validates readings against a static per-sensor-type range table and the
/// timestamp bounds of the retention horizon.
#[derive(Debug, Clone)]
pub struct Validator {
    ranges: HashMap<SensorType, HashMap<String, MetricRange>>,
    retention_horizon: Duration,
    future_skew: Duration,
}

impl Validator {
    /// Build a validator from configuration
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            ranges: config.ranges.clone(),
            retention_horizon: Duration::from_std(config.retention_horizon)
                .unwrap_or_else(|_| Duration::hours(24)),
            future_skew: Duration::from_std(config.future_skew)
                .unwrap_or_else(|_| Duration::seconds(30)),
        }
    }

    /// Check a reading; `now` is the ingest clock.
    pub fn validate(&self, reading: &Reading, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if reading.sensor_id.is_empty() {
            return Err(ValidationError::MalformedPayload(
                "empty sensor_id".to_string(),
            ));
        }
        if reading.metric.is_empty() {
            return Err(ValidationError::MalformedPayload(
                "empty metric".to_string(),
            ));
        }
        if !reading.value.is_finite() {
            return Err(ValidationError::MalformedPayload(format!(
                "non-finite value for {}",
                reading.metric
            )));
        }

        if reading.timestamp < now - self.retention_horizon {
            return Err(ValidationError::StaleTimestamp {
                timestamp: reading.timestamp,
            });
        }
        if reading.timestamp > now + self.future_skew {
            return Err(ValidationError::FutureTimestamp {
                timestamp: reading.timestamp,
            });
        }

        let range = self
            .ranges
            .get(&reading.sensor_type)
            .and_then(|metrics| metrics.get(&reading.metric))
            .ok_or_else(|| {
                ValidationError::MalformedPayload(format!(
                    "unknown metric {} for {} sensor",
                    reading.metric, reading.sensor_type
                ))
            })?;

        if !range.contains(reading.value) {
            return Err(ValidationError::OutOfRange {
                metric: reading.metric.clone(),
                value: reading.value,
                min: range.min,
                max: range.max,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn reading(sensor_type: SensorType, metric: &str, value: f64) -> Reading {
        Reading {
            sensor_id: "Loop-01".to_string(),
            sensor_type,
            metric: metric.to_string(),
            value,
            timestamp: Utc::now(),
            ingest_sequence: 0,
        }
    }

    fn validator() -> Validator {
        Validator::new(&ValidationConfig::default())
    }

    #[rstest]
    #[case(SensorType::Traffic, "avg_speed", 0.0)]
    #[case(SensorType::Traffic, "avg_speed", 200.0)]
    #[case(SensorType::AirQuality, "pm25", 1000.0)]
    #[case(SensorType::Noise, "noise_db", 140.0)]
    fn test_boundary_values_accepted(
        #[case] sensor_type: SensorType,
        #[case] metric: &str,
        #[case] value: f64,
    ) {
        let v = validator();
        assert!(v.validate(&reading(sensor_type, metric, value), Utc::now()).is_ok());
    }

    #[rstest]
    #[case(SensorType::Traffic, "avg_speed", 201.0)]
    #[case(SensorType::Traffic, "avg_speed", -1.0)]
    #[case(SensorType::AirQuality, "pm25", 1001.0)]
    #[case(SensorType::Noise, "noise_db", 141.0)]
    fn test_one_past_boundary_rejected(
        #[case] sensor_type: SensorType,
        #[case] metric: &str,
        #[case] value: f64,
    ) {
        let v = validator();
        let err = v
            .validate(&reading(sensor_type, metric, value), Utc::now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_unknown_metric_is_malformed() {
        let v = validator();
        let err = v
            .validate(&reading(SensorType::Noise, "pm25", 10.0), Utc::now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::MalformedPayload(_)));
    }

    #[test]
    fn test_nan_value_is_malformed() {
        let v = validator();
        let err = v
            .validate(&reading(SensorType::Noise, "noise_db", f64::NAN), Utc::now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::MalformedPayload(_)));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let v = validator();
        let mut r = reading(SensorType::Noise, "noise_db", 50.0);
        let now = Utc::now();
        r.timestamp = now - Duration::hours(25);
        assert!(matches!(
            v.validate(&r, now).unwrap_err(),
            ValidationError::StaleTimestamp { .. }
        ));
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let v = validator();
        let mut r = reading(SensorType::Noise, "noise_db", 50.0);
        let now = Utc::now();
        r.timestamp = now + Duration::minutes(5);
        assert!(matches!(
            v.validate(&r, now).unwrap_err(),
            ValidationError::FutureTimestamp { .. }
        ));

        // Within the allowed skew is fine.
        r.timestamp = now + Duration::seconds(10);
        assert!(v.validate(&r, now).is_ok());
    }
}
