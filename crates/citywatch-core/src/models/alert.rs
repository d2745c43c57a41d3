//! Alert data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::SensorType;

/// Alert severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational (resolutions, de-escalations)
    Info,
    /// Warning
    #[default]
    Warning,
    /// Critical
    Critical,
}

/// State of a per-(sensor, metric) alert machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    /// No breach confirmed
    #[default]
    Normal,
    /// Warning threshold confirmed
    Warning,
    /// Critical threshold confirmed
    Critical,
    /// Breach cleared, waiting for enough consecutive ok samples
    Resolving,
}

impl AlertState {
    /// Escalation rank; RESOLVING sits between NORMAL and the elevated states
    pub(crate) fn rank(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Resolving => 1,
            Self::Warning => 2,
            Self::Critical => 3,
        }
    }

    /// Severity attached to a transition into this state
    pub fn severity(self) -> Severity {
        match self {
            Self::Normal | Self::Resolving => Severity::Info,
            Self::Warning => Severity::Warning,
            Self::Critical => Severity::Critical,
        }
    }
}

/// Which side of the thresholds counts as a breach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdDirection {
    /// Values at or above the threshold breach (most metrics)
    #[default]
    Above,
    /// Values at or below the threshold breach (e.g., average speed, where
    /// slow traffic is the problem)
    Below,
}

/// Two-level threshold profile for one sensor_type x metric pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdProfile {
    /// Warning-level threshold
    pub warning_threshold: f64,

    /// Critical-level threshold
    pub critical_threshold: f64,

    /// Breach direction
    #[serde(default)]
    pub direction: ThresholdDirection,

    /// Consecutive breaching samples required before escalating
    #[serde(default = "default_breach_count")]
    pub breach_count_to_escalate: u32,

    /// Consecutive ok samples required before resolving
    #[serde(default = "default_ok_count")]
    pub ok_count_to_resolve: u32,

    /// Minimum gap between two notifications for the same pair
    #[serde(with = "humantime_serde", default = "default_cooldown")]
    pub notify_cooldown: Duration,
}

fn default_breach_count() -> u32 {
    2
}

fn default_ok_count() -> u32 {
    3
}

fn default_cooldown() -> Duration {
    Duration::from_secs(300)
}

impl ThresholdProfile {
    /// Profile with default hysteresis counters and cooldown
    pub fn new(warning_threshold: f64, critical_threshold: f64) -> Self {
        Self {
            warning_threshold,
            critical_threshold,
            direction: ThresholdDirection::Above,
            breach_count_to_escalate: default_breach_count(),
            ok_count_to_resolve: default_ok_count(),
            notify_cooldown: default_cooldown(),
        }
    }

    /// Flip the breach direction
    pub fn below(mut self) -> Self {
        self.direction = ThresholdDirection::Below;
        self
    }
}

/// Audit record emitted on every alert-state transition, whether or not a
/// notification fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Unique identifier
    pub id: Uuid,

    /// Sensor the transition belongs to
    pub sensor_id: String,

    /// Kind of sensor
    pub sensor_type: SensorType,

    /// Metric the transition belongs to
    pub metric: String,

    /// State before the transition
    pub from_state: AlertState,

    /// State after the transition
    pub to_state: AlertState,

    /// Severity of the new state
    pub severity: Severity,

    /// Value that drove the transition
    pub value: f64,

    /// Threshold breached, when the transition was an escalation
    pub threshold: Option<f64>,

    /// Human-readable description
    pub message: String,

    /// When the transition happened
    pub timestamp: DateTime<Utc>,
}

/// Intent handed to the external dispatcher on qualifying CRITICAL
/// transitions. Delivery retries and provider formatting live downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationIntent {
    /// Sensor the alert belongs to
    pub sensor_id: String,

    /// Metric the alert belongs to
    pub metric: String,

    /// Severity of the alert
    pub severity: Severity,

    /// Short message suitable for SMS (kept under 160 characters)
    pub short_message: String,
}

/// Serializable snapshot of one alert machine, persisted across restarts so
/// hysteresis counters survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStateSnapshot {
    /// Owning sensor
    pub sensor_id: String,

    /// Owning metric
    pub metric: String,

    /// Current state
    pub state: AlertState,

    /// Elevated state held before entering RESOLVING
    pub prior_elevated: AlertState,

    /// Consecutive breaching samples seen
    pub consecutive_breaches: u32,

    /// Consecutive ok samples seen
    pub consecutive_oks: u32,

    /// When the last notification was emitted
    pub last_notified: Option<DateTime<Utc>>,
}

/// Human-readable message for an alert transition, in the style the city
/// dashboard expects.
pub fn alert_message(
    sensor_type: SensorType,
    sensor_id: &str,
    metric: &str,
    value: f64,
    threshold: Option<f64>,
    to_state: AlertState,
) -> String {
    if matches!(to_state, AlertState::Normal | AlertState::Resolving) {
        return format!("{metric} on {sensor_id} back within limits ({value:.2})");
    }

    let threshold = threshold.unwrap_or(0.0);
    match (sensor_type, metric) {
        (SensorType::Traffic, "vehicle_count") => format!(
            "High vehicle count on {sensor_id}. Vehicles: {value:.0} (limit: {threshold:.0})"
        ),
        (SensorType::Traffic, "wait_time_s") => format!(
            "Long wait time on {sensor_id}. Wait: {value:.1}s (limit: {threshold:.1}s)"
        ),
        (SensorType::Traffic, "avg_speed") => format!(
            "Slow traffic on {sensor_id}. Speed: {value:.1} km/h (limit: {threshold:.1} km/h)"
        ),
        (SensorType::AirQuality, "pm25") => format!(
            "High PM2.5 levels at {sensor_id}. PM2.5: {value:.1} \u{b5}g/m\u{b3} (limit: {threshold:.1})"
        ),
        (SensorType::AirQuality, "co") => {
            format!("High CO levels at {sensor_id}. CO: {value:.1} ppm (limit: {threshold:.1})")
        }
        (SensorType::Noise, _) => format!(
            "High noise levels at {sensor_id}. Noise: {value:.1} dB (limit: {threshold:.1} dB)"
        ),
        _ => format!("Alert for {sensor_id}: {metric} = {value:.2} (threshold: {threshold:.2})"),
    }
}

/// Short notification text for the dispatcher, kept under 160 characters.
pub fn short_message(sensor_type: SensorType, sensor_id: &str, metric: &str, value: f64) -> String {
    let label = match sensor_type {
        SensorType::Traffic => "TRAFFIC",
        SensorType::AirQuality => "AIR",
        SensorType::Noise => "NOISE",
    };

    let mut message = format!("{label} ALERT! {sensor_id}: {metric}={value:.1}");
    message.truncate(160);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_message_shape() {
        let msg = alert_message(
            SensorType::Traffic,
            "Loop-01",
            "vehicle_count",
            13.0,
            Some(12.0),
            AlertState::Critical,
        );
        assert_eq!(msg, "High vehicle count on Loop-01. Vehicles: 13 (limit: 12)");
    }

    #[test]
    fn test_resolution_message_ignores_threshold() {
        let msg = alert_message(
            SensorType::Noise,
            "Noise-02",
            "noise_db",
            42.0,
            None,
            AlertState::Normal,
        );
        assert!(msg.contains("back within limits"));
    }

    #[test]
    fn test_short_message_fits_sms() {
        let long_id = "Loop-".repeat(60);
        let msg = short_message(SensorType::Traffic, &long_id, "vehicle_count", 99.0);
        assert!(msg.len() <= 160);
        assert!(msg.starts_with("TRAFFIC ALERT!"));
    }

    #[test]
    fn test_profile_defaults() {
        let profile: ThresholdProfile =
            serde_json::from_str(r#"{"warning_threshold": 40.0, "critical_threshold": 60.0}"#)
                .unwrap();
        assert_eq!(profile.breach_count_to_escalate, 2);
        assert_eq!(profile.ok_count_to_resolve, 3);
        assert_eq!(profile.notify_cooldown, Duration::from_secs(300));
        assert_eq!(profile.direction, ThresholdDirection::Above);
    }
}
