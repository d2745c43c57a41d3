//! CityWatch CLI
//!
//! Command-line interface for the CityWatch sensor monitoring engine.

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use citywatch::alerting::{LogNotifier, NotificationSink, WebhookDispatcher};
use citywatch::engine::{Engine, LogSink, ShutdownReport, Sinks};
use citywatch::models::{AlertStateSnapshot, Reading};
use citywatch::Config;

/// CityWatch - sensor stream aggregation and alerting
#[derive(Parser)]
#[command(name = "citywatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long, global = true, env = "CITYWATCH_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate readings streamed as JSON lines on stdin
    Serve {
        /// Port for the Prometheus metrics endpoint
        #[arg(long, default_value = "9600", env = "CITYWATCH_METRICS_PORT")]
        metrics_port: u16,

        /// Disable the metrics endpoint
        #[arg(long)]
        no_metrics: bool,

        /// File to restore alert state from and persist it to on shutdown
        #[arg(long, env = "CITYWATCH_STATE_FILE")]
        state_file: Option<PathBuf>,
    },

    /// Re-run a captured stream of JSON-line readings from a file
    Replay {
        /// Path to the readings file
        file: PathBuf,

        /// File to restore alert state from and persist it to afterwards
        #[arg(long)]
        state_file: Option<PathBuf>,
    },

    /// Validate the configuration and print the effective values
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config, cli.verbose);

    let result = match cli.command {
        Commands::Serve {
            metrics_port,
            no_metrics,
            state_file,
        } => run_serve(config, metrics_port, no_metrics, state_file).await,
        Commands::Replay { file, state_file } => run_replay(config, &file, state_file).await,
        Commands::CheckConfig => run_check_config(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_sinks(config: &Config) -> anyhow::Result<Sinks> {
    let notifications: Arc<dyn NotificationSink> =
        match WebhookDispatcher::from_config(&config.notification)? {
            Some(dispatcher) => Arc::new(dispatcher),
            None => Arc::new(LogNotifier),
        };

    Ok(Sinks {
        aggregates: Arc::new(LogSink),
        alerts: Arc::new(LogSink),
        notifications,
    })
}

async fn run_serve(
    config: Config,
    metrics_port: u16,
    no_metrics: bool,
    state_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    if !no_metrics {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], metrics_port))
            .install()?;
        info!(port = metrics_port, "Prometheus endpoint up");
    }

    let sinks = build_sinks(&config)?;
    let snapshots = match &state_file {
        Some(path) => load_alert_states(path)?,
        None => Vec::new(),
    };
    let engine = Engine::with_snapshots(config, sinks, snapshots);

    info!("Reading JSON lines from stdin; Ctrl+C to stop");
    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = pump_readings(stdin, &engine) => {
            let submitted = result?;
            info!(submitted, "Input stream ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, draining");
        }
    }

    let report = engine.shutdown().await;
    finish(report, state_file.as_deref())
}

async fn run_replay(
    config: Config,
    file: &Path,
    state_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let sinks = build_sinks(&config)?;
    let snapshots = match &state_file {
        Some(path) => load_alert_states(path)?,
        None => Vec::new(),
    };
    let engine = Engine::with_snapshots(config, sinks, snapshots);

    let reader = BufReader::new(tokio::fs::File::open(file).await?);
    let submitted = pump_readings(reader, &engine).await?;
    info!(submitted, file = %file.display(), "Replay complete");

    let report = engine.shutdown().await;
    finish(report, state_file.as_deref())
}

fn run_check_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Decode JSON-line readings and feed them to the engine. Undecodable lines
/// are logged and skipped so one bad line never stops a replay.
async fn pump_readings<R>(reader: R, engine: &Engine) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut submitted = 0u64;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Reading>(line) {
            Ok(reading) => {
                engine.submit(reading).await?;
                submitted += 1;
            }
            Err(e) => warn!(error = %e, "Skipping undecodable line"),
        }
    }

    Ok(submitted)
}

fn finish(report: ShutdownReport, state_file: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = state_file {
        save_alert_states(path, &report.alert_states)?;
        info!(
            path = %path.display(),
            states = report.alert_states.len(),
            "Alert state persisted"
        );
    }

    println!("{}", serde_json::to_string_pretty(&report.metrics)?);
    Ok(())
}

fn load_alert_states(path: &Path) -> anyhow::Result<Vec<AlertStateSnapshot>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn save_alert_states(path: &Path, states: &[AlertStateSnapshot]) -> anyhow::Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(states)?)?;
    Ok(())
}
