//! Stream engine
//!
//! Readings are routed by sensor id to dedicated workers, spawned lazily on
//! first sight of a sensor. Each worker processes its stream strictly in
//! arrival order; the engine itself never touches window or alert state.

pub mod sink;
mod worker;

pub use sink::{
    AggregateSink, AlertSink, LogSink, RetryPolicy, SinkEvent, SinkHandle, SinkWriter, Sinks,
};

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::{MetricsSnapshot, WorkerMetrics};
use crate::models::{AlertStateSnapshot, Reading};
use crate::validator::Validator;
use worker::SensorWorker;

struct WorkerHandle {
    tx: mpsc::Sender<Reading>,
    join: JoinHandle<Vec<AlertStateSnapshot>>,
    metrics: Arc<WorkerMetrics>,
}

/// What a drained engine leaves behind
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Alert machine snapshots, one per live (sensor, metric)
    pub alert_states: Vec<AlertStateSnapshot>,
    /// Final counters merged across all workers
    pub metrics: MetricsSnapshot,
}

/// Routes readings to per-sensor workers and owns the sink writer
pub struct Engine {
    config: Arc<Config>,
    validator: Arc<Validator>,
    workers: Arc<DashMap<String, WorkerHandle>>,
    sink: SinkHandle,
    writer: JoinHandle<()>,
    stats: Option<JoinHandle<()>>,
    /// Alert states restored at startup, handed to workers as they spawn
    restored: Mutex<HashMap<String, Vec<AlertStateSnapshot>>>,
}

impl Engine {
    /// Start an engine with fresh alert state
    pub fn new(config: Config, sinks: Sinks) -> Self {
        Self::with_snapshots(config, sinks, Vec::new())
    }

    /// Start an engine, seeding alert machines from persisted snapshots
    pub fn with_snapshots(
        config: Config,
        sinks: Sinks,
        snapshots: Vec<AlertStateSnapshot>,
    ) -> Self {
        let config = Arc::new(config);
        let validator = Arc::new(Validator::new(&config.validation));

        let retry = RetryPolicy::new(&config.persistence);
        let (writer, sink) = SinkWriter::new(
            sinks,
            retry,
            config.engine.sink_queue_size,
            config.engine.sink_enqueue_timeout,
        );
        let writer = tokio::spawn(writer.run());

        let mut restored: HashMap<String, Vec<AlertStateSnapshot>> = HashMap::new();
        for snapshot in snapshots {
            restored
                .entry(snapshot.sensor_id.clone())
                .or_default()
                .push(snapshot);
        }
        if !restored.is_empty() {
            info!(sensors = restored.len(), "Restored alert state snapshots");
        }

        let workers = Arc::new(DashMap::new());
        let stats = (!config.engine.stats_interval.is_zero())
            .then(|| tokio::spawn(log_stats(Arc::clone(&workers), config.engine.stats_interval)));

        Self {
            config,
            validator,
            workers,
            sink,
            writer,
            stats,
            restored: Mutex::new(restored),
        }
    }

    /// Submit one reading for processing.
    ///
    /// Applies backpressure: awaits until the sensor's worker has inbox
    /// capacity. Errors only if the worker has stopped.
    pub async fn submit(&self, reading: Reading) -> Result<()> {
        let tx = match self.workers.get(&reading.sensor_id) {
            Some(handle) => handle.tx.clone(),
            None => self.spawn_worker(&reading.sensor_id),
        };

        tx.send(reading)
            .await
            .map_err(|_| Error::channel("sensor worker stopped"))
    }

    fn spawn_worker(&self, sensor_id: &str) -> mpsc::Sender<Reading> {
        let handle = self
            .workers
            .entry(sensor_id.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.config.engine.worker_queue_size.max(1));
                let metrics = Arc::new(WorkerMetrics::default());
                let restored = self
                    .restored
                    .lock()
                    .remove(sensor_id)
                    .unwrap_or_default();

                info!(sensor_id, "Spawning sensor worker");
                let worker = SensorWorker::new(
                    sensor_id.to_string(),
                    Arc::clone(&self.config),
                    Arc::clone(&self.validator),
                    Arc::clone(&metrics),
                    self.sink.clone(),
                    restored,
                );
                let join = tokio::spawn(worker.run(rx));

                WorkerHandle { tx, join, metrics }
            });

        handle.tx.clone()
    }

    /// Number of live sensor workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Merged counters across all workers
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let mut total = MetricsSnapshot::default();
        for handle in self.workers.iter() {
            total.merge(&handle.metrics.snapshot());
        }
        total
    }

    /// Stop accepting, drain every worker, flush the sink writer, and return
    /// the alert state snapshots and final counters.
    pub async fn shutdown(self) -> ShutdownReport {
        let Engine {
            workers,
            sink,
            writer,
            stats,
            ..
        } = self;

        if let Some(stats) = stats {
            stats.abort();
        }

        let mut report = ShutdownReport::default();
        let sensor_ids: Vec<String> = workers.iter().map(|e| e.key().clone()).collect();
        for sensor_id in sensor_ids {
            let Some((_, handle)) = workers.remove(&sensor_id) else {
                continue;
            };
            drop(handle.tx);
            match handle.join.await {
                Ok(mut snapshots) => report.alert_states.append(&mut snapshots),
                Err(e) => error!(sensor_id = %sensor_id, error = %e, "Worker task failed"),
            }
            report.metrics.merge(&handle.metrics.snapshot());
        }

        // All worker handles are gone; dropping ours closes the queue and
        // lets the writer drain.
        drop(sink);
        if let Err(e) = writer.await {
            error!(error = %e, "Sink writer task failed");
        }

        info!(
            alert_states = report.alert_states.len(),
            processed = report.metrics.processed,
            "Engine shut down"
        );
        report
    }
}

/// Periodic processing-stats log line, aborted at shutdown
async fn log_stats(workers: Arc<DashMap<String, WorkerHandle>>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        ticker.tick().await;
        let mut total = MetricsSnapshot::default();
        for handle in workers.iter() {
            total.merge(&handle.metrics.snapshot());
        }
        info!(
            sensors = workers.len(),
            processed = total.processed,
            rejected = total.rejected_total(),
            anomalies = total.anomalies,
            alert_transitions = total.alert_transitions,
            notifications = total.notifications,
            sink_drops = total.sink_drops,
            "Processing stats"
        );
    }
}
