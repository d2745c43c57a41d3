//! # CityWatch
//!
//! Stream aggregation and alert evaluation for urban sensor networks.
//!
//! CityWatch ingests readings from traffic loops, air-quality stations, and
//! noise meters, maintains sliding-window aggregates per sensor and metric,
//! flags anomalous readings, and drives threshold alerts through a hysteresis
//! state machine so one noisy sample never pages anyone.
//!
//! ## Architecture
//!
//! - **Engine**: routes readings to one worker per sensor; strictly ordered
//!   per-sensor processing
//! - **Windows**: a 10-minute time window and a last-20 count window per
//!   (sensor, metric), with O(1) running aggregates
//! - **Alerting**: NORMAL / WARNING / CRITICAL state machine with
//!   consecutive-breach escalation and cooldown-limited notifications
//! - **Sinks**: bounded writer queue with retries in front of the aggregate
//!   store, alert history, and notification dispatcher
//!
//! ## Quick Start
//!
//! ```bash
//! # Evaluate readings streamed as JSON lines on stdin
//! citywatch serve
//!
//! # Re-run a captured stream from a file
//! citywatch replay readings.jsonl
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod aggregate;
pub mod alerting;
pub mod anomaly;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod validator;
pub mod window;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::{Engine, LogSink, Sinks};
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
}
