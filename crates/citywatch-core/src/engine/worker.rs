//! Per-sensor worker
//!
//! One worker owns all windows and alert machines for one sensor, so
//! readings for a sensor are processed strictly in arrival order and nothing
//! is shared between sensors. A worker blocks only on its inbox; outbound
//! writes go through the bounded sink queue.

use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::alerting::AlertStateMachine;
use crate::anomaly::AnomalyDetector;
use crate::config::Config;
use crate::engine::sink::{SinkEvent, SinkHandle};
use crate::error::ValidationError;
use crate::metrics::WorkerMetrics;
use crate::models::{minute_bucket, AggregateRow, AlertStateSnapshot, Reading};
use crate::validator::Validator;
use crate::window::WindowManager;

/// Windows plus alert machine for one metric of the worker's sensor
struct MetricState {
    windows: WindowManager,
    alerts: AlertStateMachine,
}

pub(crate) struct SensorWorker {
    sensor_id: String,
    config: Arc<Config>,
    validator: Arc<Validator>,
    detector: AnomalyDetector,
    metrics: Arc<WorkerMetrics>,
    sink: SinkHandle,
    states: HashMap<String, MetricState>,
    /// Snapshots restored at startup, consumed as metrics first appear
    restored: HashMap<String, AlertStateSnapshot>,
    readings_seen: u64,
}

impl SensorWorker {
    pub(crate) fn new(
        sensor_id: String,
        config: Arc<Config>,
        validator: Arc<Validator>,
        metrics: Arc<WorkerMetrics>,
        sink: SinkHandle,
        restored: Vec<AlertStateSnapshot>,
    ) -> Self {
        let detector = AnomalyDetector::new(&config.anomaly);
        let restored = restored
            .into_iter()
            .map(|s| (s.metric.clone(), s))
            .collect();

        Self {
            sensor_id,
            config,
            validator,
            detector,
            metrics,
            sink,
            states: HashMap::new(),
            restored,
            readings_seen: 0,
        }
    }

    /// Process readings until the inbox closes, then hand back the alert
    /// state snapshots for persistence.
    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<Reading>) -> Vec<AlertStateSnapshot> {
        while let Some(reading) = rx.recv().await {
            self.process(reading).await;
        }

        debug!(sensor_id = %self.sensor_id, "Worker drained");
        self.states
            .values()
            .map(|state| state.alerts.snapshot())
            .collect()
    }

    async fn process(&mut self, reading: Reading) {
        let now = Utc::now();

        if let Err(e) = self.validator.validate(&reading, now) {
            self.metrics.record_rejection(&e);
            debug!(
                sensor_id = %reading.sensor_id,
                metric = %reading.metric,
                error = %e,
                "Reading rejected"
            );
            return;
        }

        let next_seen = self.readings_seen + 1;
        let reconcile_every = self.config.engine.reconcile_every;
        let run_reconcile = reconcile_every > 0 && next_seen % reconcile_every == 0;
        let tolerance = self.config.engine.reconcile_tolerance;
        let detector = self.detector.clone();
        let metrics = Arc::clone(&self.metrics);

        let state = Self::metric_state(
            &mut self.states,
            &mut self.restored,
            &self.config,
            &self.metrics,
            &reading,
        );

        let applied = state.windows.apply(&reading, now);
        if applied.out_of_order_dropped {
            metrics.record_rejection(&ValidationError::OutOfOrderDropped);
            return;
        }

        if run_reconcile {
            let drift = state.windows.reconcile();
            if drift > tolerance {
                warn!(
                    sensor_id = %reading.sensor_id,
                    metric = %reading.metric,
                    drift,
                    "Aggregate drift corrected by reconciliation"
                );
            }
        }

        let count_aggregate = state.windows.count_view().aggregate;
        let anomaly = detector.classify(&reading, &count_aggregate);
        if let Some(flag) = &anomaly {
            metrics.record_anomaly();
            debug!(
                sensor_id = %flag.sensor_id,
                metric = %flag.metric,
                score = flag.score,
                reason = ?flag.reason,
                "Anomalous reading"
            );
        }

        let evaluation = state.alerts.evaluate(reading.value, anomaly.as_ref(), now);
        let time_aggregate = state.windows.time_view().aggregate;

        self.readings_seen = next_seen;
        self.metrics
            .record_alert_transitions(evaluation.records.len() as u64);
        self.metrics.record_processed();

        let row = AggregateRow {
            sensor_id: reading.sensor_id.clone(),
            metric: reading.metric.clone(),
            window_bucket: minute_bucket(reading.timestamp),
            aggregate: time_aggregate,
        };
        if !self.sink.enqueue(SinkEvent::Aggregate(row)).await {
            self.metrics.record_sink_drop();
        }

        for record in evaluation.records {
            if !self.sink.enqueue(SinkEvent::Alert(record)).await {
                self.metrics.record_sink_drop();
            }
        }

        if let Some(intent) = evaluation.notification {
            self.metrics.record_notification();
            if !self.sink.enqueue(SinkEvent::Notification(intent)).await {
                self.metrics.record_sink_drop();
            }
        }
    }

    /// Get or lazily create the per-metric state. Free-standing over the
    /// fields so the returned borrow does not lock the whole worker.
    fn metric_state<'a>(
        states: &'a mut HashMap<String, MetricState>,
        restored: &mut HashMap<String, AlertStateSnapshot>,
        config: &Config,
        metrics: &WorkerMetrics,
        reading: &Reading,
    ) -> &'a mut MetricState {
        match states.entry(reading.metric.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let profile = config.profile(reading.sensor_type, &reading.metric).cloned();
                if profile.is_none() {
                    // Monitor-only: windows and aggregates still run,
                    // alerting does not. Counted so the gap is visible.
                    metrics.record_missing_profile();
                    warn!(
                        sensor_id = %reading.sensor_id,
                        metric = %reading.metric,
                        "No threshold profile; monitoring without alerts"
                    );
                }

                let alerts = match restored.remove(&reading.metric) {
                    Some(snapshot) => {
                        AlertStateMachine::from_snapshot(snapshot, reading.sensor_type, profile)
                    }
                    None => AlertStateMachine::new(
                        reading.sensor_id.clone(),
                        reading.sensor_type,
                        reading.metric.clone(),
                        profile,
                    ),
                };

                entry.insert(MetricState {
                    windows: WindowManager::new(&config.windows),
                    alerts,
                })
            }
        }
    }
}
