//! Motor Sentinel - motor-health telemetry pipeline
//!
//! ## Usage
//!
//! ```bash
//! # Live feed (defaults to the public test broker)
//! motor-sentinel
//!
//! # Own broker, status API on :8080
//! motor-sentinel --broker-host 10.0.0.5 --addr 0.0.0.0:8080
//!
//! # Feed a JSON-lines capture through the same pipeline, no state on disk
//! motor-sentinel --replay readings.jsonl --ephemeral
//! ```
//!
//! Startup failures (configuration, model artifact, store, instance lock,
//! broker connection) exit non-zero.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use motor_sentinel::alert::AlertDispatcher;
use motor_sentinel::api::{self, ApiState};
use motor_sentinel::config::AppConfig;
use motor_sentinel::logging::{self, LogFormat};
use motor_sentinel::pipeline::{
    MessageProcessor, MessageSource, MqttSource, PipelineStats, ProcessingLoop, ReplaySource,
    SharedStats, WindowSmoother,
};
use motor_sentinel::scoring::{LogisticModel, ScoringOracle};
use motor_sentinel::storage::{InMemoryStore, ProcessLock, SledStore, TelemetryStore};

/// Upper bound on waiting for tasks to wind down after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "motor-sentinel")]
#[command(about = "Motor health monitoring: failure-risk scoring, smoothing, persistence and alerting")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (default: ./motor_sentinel.toml if present)
    #[arg(short, long, env = "MOTOR_SENTINEL_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the MQTT broker host
    #[arg(long, value_name = "HOST")]
    broker_host: Option<String>,

    /// Override the MQTT broker port
    #[arg(long, value_name = "PORT")]
    broker_port: Option<u16>,

    /// Override the model artifact path
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Override the data directory (store and lock file)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Serve the status API on this address (e.g. 0.0.0.0:8080)
    #[arg(short, long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Replay a JSON-lines file instead of subscribing to the broker
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Delay between replayed messages in milliseconds
    #[arg(long, default_value = "0")]
    replay_delay_ms: u64,

    /// Keep records in memory only (no data directory, no lock file)
    #[arg(long)]
    ephemeral: bool,

    /// Log output format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

impl CliArgs {
    /// Highest-precedence overrides.
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(host) = &self.broker_host {
            config.broker.host = host.clone();
        }
        if let Some(port) = self.broker_port {
            config.broker.port = port;
        }
        if let Some(model) = &self.model {
            config.scoring.model_path = model.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.storage.data_dir = dir.clone();
        }
        if let Some(addr) = &self.addr {
            config.server.addr = Some(addr.clone());
        }
    }
}

// ============================================================================
// Task Supervision
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    StatusApi,
    MessageProcessor,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::StatusApi => write!(f, "StatusApi"),
            TaskName::MessageProcessor => write!(f, "MessageProcessor"),
        }
    }
}

/// Wait for cancellation or the first task failure, then drain.
///
/// A task error or panic cancels every other task and becomes the process
/// exit error.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!(tasks = task_set.len(), "🔒 Supervisor watching tasks");

    let outcome = loop {
        let joined = tokio::select! {
            _ = cancel_token.cancelled() => break Ok(()),
            joined = task_set.join_next() => joined,
        };
        match joined {
            None => break Ok(()),
            Some(Ok(Ok(task))) => info!(task = %task, "🔒 Task finished"),
            Some(Ok(Err(e))) => {
                error!(error = %format!("{e:#}"), "🔒 Task failed, shutting down");
                break Err(e);
            }
            Some(Err(join_error)) => {
                error!(error = %join_error, "🔒 Task panicked, shutting down");
                break Err(anyhow::anyhow!("task panicked: {join_error}"));
            }
        }
    };
    cancel_token.cancel();

    // Let the processing loop finish its in-flight message and log final stats.
    let drain = async { while task_set.join_next().await.is_some() {} };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!(grace = ?SHUTDOWN_GRACE, "🔒 Tasks still running after grace period, aborting");
        task_set.abort_all();
    }

    outcome
}

/// Run the processing loop over `source`, then cancel everything else.
fn spawn_processor<S: MessageSource>(
    task_set: &mut JoinSet<Result<TaskName>>,
    processing_loop: ProcessingLoop,
    mut source: S,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[MessageProcessor] Task starting");
        let _stats = processing_loop.run(&mut source).await;
        source.shutdown().await;
        // The source is exhausted (replay) or we are shutting down anyway.
        cancel_token.cancel();
        Ok(TaskName::MessageProcessor)
    });
}

fn spawn_status_api(
    task_set: &mut JoinSet<Result<TaskName>>,
    addr: String,
    state: ApiState,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[StatusApi] Task starting");
        api::serve(&addr, state, cancel_token).await?;
        info!("[StatusApi] Graceful shutdown complete");
        Ok(TaskName::StatusApi)
    });
}

// ============================================================================
// Startup
// ============================================================================

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let mut config =
        AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_env()
        .context("Invalid environment override")?;
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Open the telemetry store. The lock guard must outlive the store.
fn open_store(
    config: &AppConfig,
    ephemeral: bool,
) -> Result<(Arc<dyn TelemetryStore>, Option<ProcessLock>)> {
    if ephemeral {
        info!("💾 Store: in-memory (ephemeral, records are discarded on exit)");
        return Ok((Arc::new(InMemoryStore::new()), None));
    }

    let lock = ProcessLock::acquire(&config.storage.data_dir)
        .context("Failed to acquire instance lock")?;
    let path = config.storage.store_path();
    let store = SledStore::open(&path)
        .with_context(|| format!("Failed to open telemetry store at {}", path.display()))?;
    info!("💾 Store: sled at {}", path.display());
    Ok((Arc::new(store), Some(lock)))
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before clap reads env-backed arguments.
    let dotenv = dotenvy::dotenv();

    let args = CliArgs::parse();
    logging::init(args.log_format);

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Motor Sentinel v{}", env!("CARGO_PKG_VERSION"));
    info!("  Motor Health Monitoring Pipeline");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("");

    let config = load_config(&args)?;

    // Scoring model
    let model = LogisticModel::load(&config.scoring.model_path).with_context(|| {
        format!(
            "Failed to load scoring model from {}",
            config.scoring.model_path.display()
        )
    })?;
    let model_description = model.describe();
    info!("🧮 Model: {}", model_description);

    // Store
    let (store, _process_lock) = open_store(&config, args.ephemeral)?;

    // Alerting
    let alerts =
        AlertDispatcher::from_config(&config.alert).context("Failed to build alert channel")?;
    let alerting_enabled = alerts.is_configured();
    info!(
        "🚨 Alerts: smoothed > {:.2} | channel: {}",
        config.alert.threshold,
        if alerting_enabled { "Telegram" } else { "log only" }
    );

    let smoother = WindowSmoother::new(config.smoothing.window_size);
    info!("📉 Smoothing window: {} predictions", smoother.window_size());

    let processor = MessageProcessor::new(Arc::new(model), Arc::clone(&store), smoother, alerts);
    let source_name = if args.replay.is_some() { "replay" } else { "MQTT" };
    let stats: SharedStats = PipelineStats::shared(source_name);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    info!("🔒 Supervisor: Initializing task monitoring");
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    if let Some(addr) = config.server.addr.clone() {
        let state = ApiState {
            stats: Arc::clone(&stats),
            store: Arc::clone(&store),
            model: model_description,
            alerting_enabled,
        };
        spawn_status_api(&mut task_set, addr, state, cancel_token.clone());
    }

    let processing_loop = ProcessingLoop::new(processor, Arc::clone(&stats), cancel_token.clone());

    if let Some(path) = &args.replay {
        info!("📥 Input: replay file {}", path.display());
        let source = ReplaySource::from_file(path, Duration::from_millis(args.replay_delay_ms))
            .context("Failed to load replay file")?;
        info!("📊 {} messages queued for replay", source.remaining());
        spawn_processor(&mut task_set, processing_loop, source, cancel_token.clone());
    } else {
        info!(
            "📥 Input: MQTT {}:{} topic '{}'",
            config.broker.host, config.broker.port, config.broker.topic
        );
        let source = match MqttSource::connect(&config.broker).await {
            Ok(source) => source,
            Err(e) => {
                cancel_token.cancel();
                return Err(e).context("Failed to connect to MQTT broker");
            }
        };
        spawn_processor(&mut task_set, processing_loop, source, cancel_token.clone());
    }

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("");
    info!("✓ Motor Sentinel shutdown complete");
    Ok(())
}
