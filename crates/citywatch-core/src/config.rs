//! Configuration management for CityWatch

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{SensorType, ThresholdProfile};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Engine configuration (workers, queues, reconciliation cadence)
    pub engine: EngineConfig,

    /// Window configuration (time span, count capacity, reorder grace)
    pub windows: WindowConfig,

    /// Validation ranges and timestamp bounds
    pub validation: ValidationConfig,

    /// Anomaly detection configuration
    pub anomaly: AnomalyConfig,

    /// Alert threshold profiles
    pub alerting: AlertingConfig,

    /// Outbound persistence configuration
    pub persistence: PersistenceConfig,

    /// Notification dispatcher configuration
    pub notification: NotificationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from an optional JSON file. Missing sections fall
    /// back to the defaults; a missing or unreadable file is fatal.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {path}: {e}")))?;

        serde_json::from_str(&raw).map_err(|e| Error::config(format!("invalid config {path}: {e}")))
    }

    /// Look up the threshold profile for one sensor_type x metric pair
    pub fn profile(&self, sensor_type: SensorType, metric: &str) -> Option<&ThresholdProfile> {
        self.alerting
            .thresholds
            .get(&sensor_type)
            .and_then(|metrics| metrics.get(metric))
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-sensor worker inbox capacity
    pub worker_queue_size: usize,

    /// Sink writer queue capacity
    pub sink_queue_size: usize,

    /// How long a worker waits to enqueue a sink event before dropping it
    #[serde(with = "humantime_serde")]
    pub sink_enqueue_timeout: Duration,

    /// Run the aggregate reconciliation pass every N readings (0 disables)
    pub reconcile_every: u64,

    /// Drift above this triggers a reconciliation warning
    pub reconcile_tolerance: f64,

    /// How often the engine logs its processing counters (zero disables)
    #[serde(with = "humantime_serde")]
    pub stats_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_queue_size: 256,
            sink_queue_size: 4096,
            sink_enqueue_timeout: Duration::from_millis(250),
            reconcile_every: 1000,
            reconcile_tolerance: 1e-6,
            stats_interval: Duration::from_secs(60),
        }
    }
}

/// Window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Span of the time-bounded window
    #[serde(with = "humantime_serde")]
    pub time_window: Duration,

    /// Capacity of the count-bounded window
    pub count_window_size: usize,

    /// Grace period for out-of-order insertion into the time window
    #[serde(with = "humantime_serde")]
    pub reorder_grace: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            time_window: Duration::from_secs(600),
            count_window_size: 20,
            reorder_grace: Duration::from_secs(60),
        }
    }
}

/// Inclusive numeric range for one metric
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricRange {
    /// Inclusive lower bound
    pub min: f64,
    /// Inclusive upper bound
    pub max: f64,
}

impl MetricRange {
    /// Range from min to max, both accepted
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether a value falls inside the range (boundaries included)
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Readings older than this are rejected as stale
    #[serde(with = "humantime_serde")]
    pub retention_horizon: Duration,

    /// Allowed clock skew ahead of the ingest clock
    #[serde(with = "humantime_serde")]
    pub future_skew: Duration,

    /// Accepted value ranges per sensor type and metric
    pub ranges: HashMap<SensorType, HashMap<String, MetricRange>>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let mut ranges = HashMap::new();

        ranges.insert(
            SensorType::Traffic,
            HashMap::from([
                ("vehicle_count".to_string(), MetricRange::new(0.0, 100.0)),
                ("avg_speed".to_string(), MetricRange::new(0.0, 200.0)),
                ("wait_time_s".to_string(), MetricRange::new(0.0, 600.0)),
            ]),
        );
        ranges.insert(
            SensorType::AirQuality,
            HashMap::from([
                ("pm25".to_string(), MetricRange::new(0.0, 1000.0)),
                ("co".to_string(), MetricRange::new(0.0, 50.0)),
                ("temp_c".to_string(), MetricRange::new(-30.0, 50.0)),
            ]),
        );
        ranges.insert(
            SensorType::Noise,
            HashMap::from([("noise_db".to_string(), MetricRange::new(0.0, 140.0))]),
        );

        Self {
            retention_horizon: Duration::from_secs(24 * 3600),
            future_skew: Duration::from_secs(30),
            ranges,
        }
    }
}

/// Anomaly detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Z-score threshold for the deviation rule
    pub z_threshold: f64,

    /// Minimum count-window samples before any verdict
    pub min_samples: usize,

    /// Spike ratio over the rolling mean for traffic metrics
    pub spike_ratio: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            z_threshold: 2.5,
            min_samples: 5,
            spike_ratio: 2.0,
        }
    }
}

/// Alerting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Threshold profiles per sensor type and metric
    pub thresholds: HashMap<SensorType, HashMap<String, ThresholdProfile>>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        let mut thresholds = HashMap::new();

        thresholds.insert(
            SensorType::Traffic,
            HashMap::from([
                ("wait_time_s".to_string(), ThresholdProfile::new(8.0, 12.0)),
                (
                    "vehicle_count".to_string(),
                    ThresholdProfile::new(8.0, 12.0),
                ),
                (
                    "avg_speed".to_string(),
                    ThresholdProfile::new(40.0, 20.0).below(),
                ),
            ]),
        );
        thresholds.insert(
            SensorType::AirQuality,
            HashMap::from([
                ("pm25".to_string(), ThresholdProfile::new(15.0, 20.0)),
                ("co".to_string(), ThresholdProfile::new(5.0, 8.0)),
            ]),
        );
        thresholds.insert(
            SensorType::Noise,
            HashMap::from([("noise_db".to_string(), ThresholdProfile::new(50.0, 55.0))]),
        );

        Self { thresholds }
    }
}

/// Outbound persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Maximum write attempts before a write is dropped
    pub max_attempts: u32,

    /// Initial backoff between attempts (doubles per attempt)
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,

    /// Upper bound on the backoff
    #[serde(with = "humantime_serde")]
    pub backoff_cap: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(5),
        }
    }
}

/// Notification dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Webhook URL of the external dispatcher; None logs intents instead
    pub webhook_url: Option<String>,

    /// Request timeout for dispatches
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ranges_cover_all_sensor_types() {
        let cfg = Config::default();
        for sensor_type in [SensorType::Traffic, SensorType::AirQuality, SensorType::Noise] {
            assert!(cfg.validation.ranges.contains_key(&sensor_type));
        }
    }

    #[test]
    fn test_profile_lookup() {
        let cfg = Config::default();
        let profile = cfg.profile(SensorType::Noise, "noise_db").unwrap();
        assert_eq!(profile.warning_threshold, 50.0);
        assert_eq!(profile.critical_threshold, 55.0);
        assert!(cfg.profile(SensorType::Noise, "pm25").is_none());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("citywatch.json");
        std::fs::write(&path, r#"{"windows": {"count_window_size": 50}}"#).unwrap();

        let cfg = Config::load(path.to_str()).unwrap();
        assert_eq!(cfg.windows.count_window_size, 50);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.anomaly.min_samples, 5);
    }

    #[test]
    fn test_named_but_missing_file_is_fatal() {
        let err = Config::load(Some("/nonexistent/citywatch.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_survives_serde_round_trip() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.windows.count_window_size, 20);
        assert_eq!(back.windows.time_window, Duration::from_secs(600));
    }
}
