//! Alert state machine
//!
//! One machine per (sensor, metric) pair, driven by each new sample and
//! optional anomaly flag. Escalation requires consecutive confirming
//! breaches; de-escalation passes through RESOLVING and requires more
//! consecutive ok samples than escalation does, so alerts clear slower than
//! they raise.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{
    alert_message, short_message, AlertRecord, AlertState, AlertStateSnapshot, AnomalyFlag,
    NotificationIntent, SensorType, Severity, ThresholdDirection, ThresholdProfile,
};

/// Which threshold level a sample breaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BreachLevel {
    None,
    Warning,
    Critical,
}

impl BreachLevel {
    fn target_state(self) -> AlertState {
        match self {
            Self::None => AlertState::Normal,
            Self::Warning => AlertState::Warning,
            Self::Critical => AlertState::Critical,
        }
    }
}

/// Result of evaluating one sample
#[derive(Debug, Default)]
pub struct Evaluation {
    /// One record per state transition, in order
    pub records: Vec<AlertRecord>,
    /// At most one notification intent per evaluation
    pub notification: Option<NotificationIntent>,
}

/// Per-(sensor, metric) alert state machine.
///
/// Created lazily on the first reading for a pair and never destroyed while
/// the sensor is configured. A machine without a threshold profile runs in
/// monitor-only mode: it stays NORMAL and emits nothing.
#[derive(Debug)]
pub struct AlertStateMachine {
    sensor_id: String,
    sensor_type: SensorType,
    metric: String,
    profile: Option<ThresholdProfile>,
    state: AlertState,
    prior_elevated: AlertState,
    consecutive_breaches: u32,
    consecutive_oks: u32,
    last_notified: Option<DateTime<Utc>>,
}

impl AlertStateMachine {
    /// New machine in NORMAL
    pub fn new(
        sensor_id: impl Into<String>,
        sensor_type: SensorType,
        metric: impl Into<String>,
        profile: Option<ThresholdProfile>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            sensor_type,
            metric: metric.into(),
            profile,
            state: AlertState::Normal,
            prior_elevated: AlertState::Normal,
            consecutive_breaches: 0,
            consecutive_oks: 0,
            last_notified: None,
        }
    }

    /// Restore a machine from a persisted snapshot so hysteresis counters
    /// survive restarts.
    pub fn from_snapshot(
        snapshot: AlertStateSnapshot,
        sensor_type: SensorType,
        profile: Option<ThresholdProfile>,
    ) -> Self {
        Self {
            sensor_id: snapshot.sensor_id,
            sensor_type,
            metric: snapshot.metric,
            profile,
            state: snapshot.state,
            prior_elevated: snapshot.prior_elevated,
            consecutive_breaches: snapshot.consecutive_breaches,
            consecutive_oks: snapshot.consecutive_oks,
            last_notified: snapshot.last_notified,
        }
    }

    /// Serializable snapshot of the machine
    pub fn snapshot(&self) -> AlertStateSnapshot {
        AlertStateSnapshot {
            sensor_id: self.sensor_id.clone(),
            metric: self.metric.clone(),
            state: self.state,
            prior_elevated: self.prior_elevated,
            consecutive_breaches: self.consecutive_breaches,
            consecutive_oks: self.consecutive_oks,
            last_notified: self.last_notified,
        }
    }

    /// Current state
    pub fn state(&self) -> AlertState {
        self.state
    }

    /// Whether this machine has a threshold profile
    pub fn has_profile(&self) -> bool {
        self.profile.is_some()
    }

    /// Feed one sample (plus its optional anomaly flag) into the machine.
    pub fn evaluate(
        &mut self,
        value: f64,
        anomaly: Option<&AnomalyFlag>,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let Some(profile) = self.profile.clone() else {
            return Evaluation::default();
        };

        let mut level = breach_level(&profile, value);
        // A pattern break is a distinct risk signal from a sustained
        // threshold breach: an anomaly counts as a warning-level sample even
        // when the plain threshold holds.
        if anomaly.is_some() && level < BreachLevel::Warning {
            level = BreachLevel::Warning;
        }

        let mut evaluation = Evaluation::default();

        if level == BreachLevel::None {
            self.observe_ok(&profile, value, now, &mut evaluation);
        } else {
            self.observe_breach(&profile, level, value, now, &mut evaluation);
        }

        evaluation
    }

    fn observe_ok(
        &mut self,
        profile: &ThresholdProfile,
        value: f64,
        now: DateTime<Utc>,
        evaluation: &mut Evaluation,
    ) {
        self.consecutive_breaches = 0;
        self.consecutive_oks += 1;

        if matches!(self.state, AlertState::Warning | AlertState::Critical) {
            self.prior_elevated = self.state;
            self.transition(AlertState::Resolving, value, None, now, evaluation);
        }

        if self.state == AlertState::Resolving && self.consecutive_oks >= profile.ok_count_to_resolve
        {
            self.transition(AlertState::Normal, value, None, now, evaluation);
            self.prior_elevated = AlertState::Normal;
        }
    }

    fn observe_breach(
        &mut self,
        profile: &ThresholdProfile,
        level: BreachLevel,
        value: f64,
        now: DateTime<Utc>,
        evaluation: &mut Evaluation,
    ) {
        self.consecutive_oks = 0;
        self.consecutive_breaches += 1;

        // A breach during resolution returns to the elevated state the
        // machine was trying to clear. Landing back on CRITICAL is an upward
        // transition, so it notifies like any other, gated by the cooldown.
        if self.state == AlertState::Resolving {
            let back_to = self.prior_elevated;
            self.transition(back_to, value, self.threshold_for(profile, back_to), now, evaluation);
            if back_to == AlertState::Critical {
                self.maybe_notify(profile, value, now, evaluation);
            }
        }

        if self.consecutive_breaches < profile.breach_count_to_escalate {
            return;
        }

        // Confirmed: step up one level at a time toward the sample's level,
        // emitting a record per step. A critical sample confirmed from
        // NORMAL passes through WARNING within the same evaluation.
        let target = level.target_state();
        while self.state.rank() < target.rank() {
            let next = match self.state {
                AlertState::Normal | AlertState::Resolving => AlertState::Warning,
                AlertState::Warning => AlertState::Critical,
                AlertState::Critical => break,
            };
            self.transition(next, value, self.threshold_for(profile, next), now, evaluation);

            if next == AlertState::Critical {
                self.maybe_notify(profile, value, now, evaluation);
            }
        }
    }

    fn threshold_for(&self, profile: &ThresholdProfile, state: AlertState) -> Option<f64> {
        match state {
            AlertState::Warning => Some(profile.warning_threshold),
            AlertState::Critical => Some(profile.critical_threshold),
            AlertState::Normal | AlertState::Resolving => None,
        }
    }

    fn transition(
        &mut self,
        to: AlertState,
        value: f64,
        threshold: Option<f64>,
        now: DateTime<Utc>,
        evaluation: &mut Evaluation,
    ) {
        let from = self.state;
        self.state = to;

        evaluation.records.push(AlertRecord {
            id: Uuid::new_v4(),
            sensor_id: self.sensor_id.clone(),
            sensor_type: self.sensor_type,
            metric: self.metric.clone(),
            from_state: from,
            to_state: to,
            severity: to.severity(),
            value,
            threshold,
            message: alert_message(
                self.sensor_type,
                &self.sensor_id,
                &self.metric,
                value,
                threshold,
                to,
            ),
            timestamp: now,
        });
    }

    fn maybe_notify(
        &mut self,
        profile: &ThresholdProfile,
        value: f64,
        now: DateTime<Utc>,
        evaluation: &mut Evaluation,
    ) {
        let cooldown =
            Duration::from_std(profile.notify_cooldown).unwrap_or_else(|_| Duration::minutes(5));

        let in_cooldown = self
            .last_notified
            .is_some_and(|last| now.signed_duration_since(last) < cooldown);
        if in_cooldown {
            return;
        }

        self.last_notified = Some(now);
        evaluation.notification = Some(NotificationIntent {
            sensor_id: self.sensor_id.clone(),
            metric: self.metric.clone(),
            severity: Severity::Critical,
            short_message: short_message(self.sensor_type, &self.sensor_id, &self.metric, value),
        });
    }
}

fn breach_level(profile: &ThresholdProfile, value: f64) -> BreachLevel {
    match profile.direction {
        ThresholdDirection::Above => {
            if value >= profile.critical_threshold {
                BreachLevel::Critical
            } else if value >= profile.warning_threshold {
                BreachLevel::Warning
            } else {
                BreachLevel::None
            }
        }
        ThresholdDirection::Below => {
            if value <= profile.critical_threshold {
                BreachLevel::Critical
            } else if value <= profile.warning_threshold {
                BreachLevel::Warning
            } else {
                BreachLevel::None
            }
        }
    }
}
