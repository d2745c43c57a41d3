//! Outbound sinks
//!
//! Aggregates and alert records leave the engine through a single bounded
//! writer queue, so a slow store never blocks ingestion. Writes are retried
//! with bounded exponential backoff; exhaustion drops the write and counts
//! it, never the stream.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::alerting::NotificationSink;
use crate::config::PersistenceConfig;
use crate::error::Result;
use crate::models::{AggregateRow, AlertRecord, NotificationIntent};

/// Time-series store for aggregate refreshes.
///
/// Upserts are keyed by (sensor_id, metric, window_bucket): a retried write
/// overwrites rather than appends.
#[async_trait]
pub trait AggregateSink: Send + Sync {
    /// Upsert one aggregate row
    async fn upsert(&self, row: &AggregateRow) -> Result<()>;
}

/// Append-only alert history store
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Append one alert record
    async fn append(&self, record: &AlertRecord) -> Result<()>;
}

/// Bundle of the three outbound channels
#[derive(Clone)]
pub struct Sinks {
    /// Aggregate upserts
    pub aggregates: Arc<dyn AggregateSink>,
    /// Alert record appends
    pub alerts: Arc<dyn AlertSink>,
    /// Notification intents
    pub notifications: Arc<dyn NotificationSink>,
}

/// Logs writes instead of persisting them; useful for local runs and tests
pub struct LogSink;

#[async_trait]
impl AggregateSink for LogSink {
    async fn upsert(&self, row: &AggregateRow) -> Result<()> {
        debug!(
            sensor_id = %row.sensor_id,
            metric = %row.metric,
            bucket = %row.window_bucket,
            mean = row.aggregate.mean,
            count = row.aggregate.count,
            "Aggregate refresh"
        );
        Ok(())
    }
}

#[async_trait]
impl AlertSink for LogSink {
    async fn append(&self, record: &AlertRecord) -> Result<()> {
        info!(
            sensor_id = %record.sensor_id,
            metric = %record.metric,
            from = ?record.from_state,
            to = ?record.to_state,
            value = record.value,
            "Alert transition"
        );
        Ok(())
    }
}

/// An event bound for one of the sinks
#[derive(Debug, Clone)]
pub enum SinkEvent {
    /// Aggregate refresh for the time-series store
    Aggregate(AggregateRow),
    /// Alert transition for the alert store
    Alert(AlertRecord),
    /// Notification intent for the dispatcher
    Notification(NotificationIntent),
}

impl SinkEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Aggregate(_) => "aggregate",
            Self::Alert(_) => "alert",
            Self::Notification(_) => "notification",
        }
    }
}

/// Cloneable handle workers use to enqueue sink events.
///
/// Enqueueing blocks up to the configured timeout, then drops the event and
/// reports it so the loss is visible; it never blocks ingestion indefinitely.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<SinkEvent>,
    enqueue_timeout: Duration,
}

impl SinkHandle {
    /// Enqueue one event; returns false if it was dropped
    pub async fn enqueue(&self, event: SinkEvent) -> bool {
        let kind = event.kind();
        match tokio::time::timeout(self.enqueue_timeout, self.tx.send(event)).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                warn!(kind, "Sink writer stopped; event dropped");
                false
            }
            Err(_) => {
                warn!(kind, "Sink queue full; event dropped");
                false
            }
        }
    }
}

/// Bounded retry schedule for persistence writes
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    cap: Duration,
}

impl RetryPolicy {
    /// Build a policy from configuration
    pub fn new(config: &PersistenceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: config.backoff_base,
            cap: config.backoff_cap,
        }
    }

    /// Backoff before the given retry (0-based), doubling per attempt
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Consumes the writer queue and drives the sinks with retries
pub struct SinkWriter {
    rx: mpsc::Receiver<SinkEvent>,
    sinks: Sinks,
    retry: RetryPolicy,
}

impl SinkWriter {
    /// Build the writer and a handle for workers
    pub fn new(
        sinks: Sinks,
        retry: RetryPolicy,
        queue_size: usize,
        enqueue_timeout: Duration,
    ) -> (Self, SinkHandle) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let writer = Self { rx, sinks, retry };
        let handle = SinkHandle {
            tx,
            enqueue_timeout,
        };
        (writer, handle)
    }

    /// Drain the queue until every handle is dropped
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.write(event).await;
        }
        debug!("Sink writer drained");
    }

    async fn write(&self, event: SinkEvent) {
        let kind = event.kind();

        for attempt in 0..self.retry.max_attempts {
            let result = match &event {
                SinkEvent::Aggregate(row) => self.sinks.aggregates.upsert(row).await,
                SinkEvent::Alert(record) => self.sinks.alerts.append(record).await,
                SinkEvent::Notification(intent) => {
                    self.sinks.notifications.dispatch(intent).await
                }
            };

            match result {
                Ok(()) => return,
                Err(e) if attempt + 1 < self.retry.max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    debug!(kind, attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "Sink write failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    // Data loss is visible, never silent.
                    error!(kind, error = %e, "Sink write dropped after {} attempts", self.retry.max_attempts);
                    metrics::counter!("citywatch_persist_failures_total", "kind" => kind)
                        .increment(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::Aggregate;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySink {
        failures_left: AtomicU32,
        written: Mutex<Vec<AggregateRow>>,
    }

    #[async_trait]
    impl AggregateSink for FlakySink {
        async fn upsert(&self, row: &AggregateRow) -> Result<()> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::persistence("store unavailable"));
            }
            self.written.lock().push(row.clone());
            Ok(())
        }
    }

    fn row() -> AggregateRow {
        AggregateRow {
            sensor_id: "Loop-01".to_string(),
            metric: "vehicle_count".to_string(),
            window_bucket: Utc::now(),
            aggregate: Aggregate::empty(),
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(4),
        }
    }

    fn sinks_with(aggregates: Arc<dyn AggregateSink>) -> Sinks {
        Sinks {
            aggregates,
            alerts: Arc::new(LogSink),
            notifications: Arc::new(crate::alerting::LogNotifier),
        }
    }

    #[tokio::test]
    async fn test_write_retries_until_success() {
        let sink = Arc::new(FlakySink {
            failures_left: AtomicU32::new(2),
            written: Mutex::new(Vec::new()),
        });
        let (writer, handle) = SinkWriter::new(
            sinks_with(sink.clone()),
            policy(3),
            16,
            Duration::from_millis(100),
        );

        let task = tokio::spawn(writer.run());
        assert!(handle.enqueue(SinkEvent::Aggregate(row())).await);
        drop(handle);
        task.await.unwrap();

        assert_eq!(sink.written.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_drop_the_write() {
        let sink = Arc::new(FlakySink {
            failures_left: AtomicU32::new(10),
            written: Mutex::new(Vec::new()),
        });
        let (writer, handle) = SinkWriter::new(
            sinks_with(sink.clone()),
            policy(3),
            16,
            Duration::from_millis(100),
        );

        let task = tokio::spawn(writer.run());
        assert!(handle.enqueue(SinkEvent::Aggregate(row())).await);
        drop(handle);
        task.await.unwrap();

        // Three attempts burned, nothing written, writer still healthy.
        assert!(sink.written.lock().is_empty());
        assert_eq!(sink.failures_left.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_full_queue_drops_with_timeout() {
        let (_writer, handle) = SinkWriter::new(
            sinks_with(Arc::new(LogSink)),
            policy(1),
            1,
            Duration::from_millis(10),
        );

        // The writer task is never started, so the single slot fills and
        // the second enqueue times out.
        assert!(handle.enqueue(SinkEvent::Aggregate(row())).await);
        assert!(!handle.enqueue(SinkEvent::Aggregate(row())).await);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.backoff(0), Duration::from_millis(1));
        assert_eq!(p.backoff(1), Duration::from_millis(2));
        assert_eq!(p.backoff(2), Duration::from_millis(4));
        assert_eq!(p.backoff(3), Duration::from_millis(4));
    }
}
