//! Motor Sentinel: streaming motor-health monitoring
//!
//! Consumes motor telemetry from an MQTT feed, scores each reading for
//! failure risk, smooths the score over a rolling window of recent
//! predictions, persists every reading and prediction, and raises a
//! notification when the smoothed risk crosses the alert threshold.
//!
//! ## Architecture
//!
//! - **Acquisition**: MQTT subscriber and payload decoder
//! - **Scoring**: pluggable failure-risk oracle (logistic regression artifact)
//! - **Pipeline**: per-message sequencing, rolling-window smoothing, processing loop
//! - **Storage**: append-only sensor and prediction records (sled or in-memory)
//! - **Alert**: threshold check and Telegram delivery
//! - **API**: read-only status endpoints

pub mod acquisition;
pub mod alert;
pub mod api;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod scoring;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use types::{PredictionRecord, RecordId, SensorReading, SensorRecord};

pub use scoring::{LogisticModel, ScoringOracle};
pub use storage::{InMemoryStore, SledStore, TelemetryStore};
pub use alert::{AlertDispatcher, AlertOutcome, NotificationChannel};
pub use pipeline::{MessageProcessor, PipelineStats, ProcessingLoop, WindowSmoother};
