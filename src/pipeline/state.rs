//! Pipeline Statistics
//!
//! Counters shared between the processing loop and the status API, wrapped
//! in `Arc<RwLock<>>` for access across tasks.

use super::processor::{MessageOutcome, PipelineError};
use crate::alert::AlertOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedStats = Arc<RwLock<PipelineStats>>;

/// Messages dropped, by stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub decode: u64,
    pub scoring: u64,
    pub smoothing: u64,
    pub sensor_write: u64,
    /// Each of these left an orphaned sensor record.
    pub prediction_write: u64,
}

impl DropCounts {
    pub fn total(&self) -> u64 {
        self.decode + self.scoring + self.smoothing + self.sensor_write + self.prediction_write
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertCounts {
    pub sent: u64,
    pub failed: u64,
    pub unconfigured: u64,
}

/// Running totals for one process lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub messages_received: u64,
    pub messages_processed: u64,
    pub dropped: DropCounts,
    pub alerts: AlertCounts,
    /// Most recent fully processed message
    pub last_outcome: Option<MessageOutcome>,
    pub last_error: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new("")
    }
}

impl PipelineStats {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            started_at: Utc::now(),
            messages_received: 0,
            messages_processed: 0,
            dropped: DropCounts::default(),
            alerts: AlertCounts::default(),
            last_outcome: None,
            last_error: None,
            last_message_at: None,
        }
    }

    pub fn shared(source: impl Into<String>) -> SharedStats {
        Arc::new(RwLock::new(Self::new(source)))
    }

    /// Fold one message result into the totals.
    pub fn record(&mut self, result: &Result<MessageOutcome, PipelineError>) {
        self.messages_received += 1;
        self.last_message_at = Some(Utc::now());

        match result {
            Ok(outcome) => {
                self.messages_processed += 1;
                match outcome.alert {
                    AlertOutcome::NotTriggered => {}
                    AlertOutcome::Sent => self.alerts.sent += 1,
                    AlertOutcome::Unconfigured => self.alerts.unconfigured += 1,
                    AlertOutcome::Failed(_) => self.alerts.failed += 1,
                }
                self.last_outcome = Some(outcome.clone());
            }
            Err(e) => {
                let counter = match e {
                    PipelineError::Decode(_) => &mut self.dropped.decode,
                    PipelineError::Scoring { .. } => &mut self.dropped.scoring,
                    PipelineError::Smoothing { .. } => &mut self.dropped.smoothing,
                    PipelineError::SensorWrite { .. } => &mut self.dropped.sensor_write,
                    PipelineError::PredictionWrite { .. } => &mut self.dropped.prediction_write,
                };
                *counter += 1;
                self.last_error = Some(e.to_string());
            }
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
