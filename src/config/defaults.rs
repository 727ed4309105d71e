//! System-wide default constants.
//!
//! Grouped by subsystem. Every configurable value in
//! [`AppConfig`](super::AppConfig) takes its default from here.

// ============================================================================
// Broker
// ============================================================================

/// Public test broker used when `MQTT_BROKER` is not set.
pub const BROKER_HOST: &str = "test.mosquitto.org";

pub const BROKER_PORT: u16 = 1883;

/// The single topic readings arrive on.
pub const FEED_TOPIC: &str = "motor/health/data";

pub const CLIENT_ID: &str = "motor-sentinel";

/// MQTT keep-alive interval (seconds).
pub const KEEP_ALIVE_SECS: u64 = 60;

/// Minimum keep-alive the transport accepts (seconds).
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// How long startup waits for the broker's CONNACK (seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Inbound backlog depth at which a warning is logged (and every multiple of it).
pub const BACKLOG_WARNING: usize = 1_000;

// ============================================================================
// Scoring / Storage
// ============================================================================

pub const MODEL_PATH: &str = "ml-model/motor_model.json";

pub const DATA_DIR: &str = "./data";

/// Sled database directory name inside the data directory.
pub const STORE_DIR_NAME: &str = "telemetry.db";

// ============================================================================
// Smoothing / Alerting
// ============================================================================

/// Maximum raw scores averaged together, including the current one.
pub const WINDOW_SIZE: usize = 5;

/// Smoothed probability strictly above this raises an alert.
pub const ALERT_THRESHOLD: f64 = 0.7;

/// Notification send timeout (seconds).
pub const ALERT_TIMEOUT_SECS: u64 = 5;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

// ============================================================================
// Status API
// ============================================================================

/// Default page size for `/api/v1/predictions/recent`.
pub const RECENT_PREDICTIONS_LIMIT: usize = 20;

/// Upper bound on `/api/v1/predictions/recent?limit=`.
pub const RECENT_PREDICTIONS_MAX: usize = 500;

// ============================================================================
// Pipeline
// ============================================================================

/// Progress summary cadence (messages).
pub const PROGRESS_LOG_INTERVAL: u64 = 50;

// ============================================================================
// Simulation
// ============================================================================

/// Default delay between simulated publishes (seconds).
pub const SIMULATION_INTERVAL_SECS: u64 = 2;

/// Share of simulated readings drawn from the normal operating envelope.
pub const SIMULATION_NORMAL_RATIO: f64 = 0.8;
