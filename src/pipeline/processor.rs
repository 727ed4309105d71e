//! Per-message processing.
//!
//! ```text
//! decode → score → smooth → write sensor record → alert (conditional) → write prediction record
//! ```
//!
//! Each stage returns an explicit result. A failure drops only the current
//! message; the caller logs it and moves on. The two writes are not
//! transactional: a failed prediction write leaves the sensor record behind.

use crate::acquisition::{decode_at, DecodeError, InboundMessage};
use crate::alert::{AlertDispatcher, AlertOutcome};
use crate::scoring::{ScoringError, ScoringOracle};
use crate::storage::{StorageError, TelemetryStore};
use crate::types::{RecordId, SensorReading};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use super::smoothing::WindowSmoother;

/// Result of a fully processed message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageOutcome {
    pub reading: SensorReading,
    pub sensor_record_id: RecordId,
    pub prediction_record_id: RecordId,
    pub raw_probability: f64,
    pub smoothed_probability: f64,
    pub alert: AlertOutcome,
}

/// Why a message was dropped, by stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("scoring failed for {reading}: {source}")]
    Scoring {
        reading: SensorReading,
        source: ScoringError,
    },

    #[error("smoothing query failed for {reading}: {source}")]
    Smoothing {
        reading: SensorReading,
        source: StorageError,
    },

    #[error("sensor record write failed for {reading}: {source}")]
    SensorWrite {
        reading: SensorReading,
        source: StorageError,
    },

    #[error("prediction write failed for {reading}, sensor record {sensor_record_id} orphaned: {source}")]
    PredictionWrite {
        reading: SensorReading,
        sensor_record_id: RecordId,
        source: StorageError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Scoring { .. } => "scoring",
            Self::Smoothing { .. } => "smoothing",
            Self::SensorWrite { .. } => "sensor_write",
            Self::PredictionWrite { .. } => "prediction_write",
        }
    }

    /// The decoded reading, for every stage after decode.
    pub fn reading(&self) -> Option<&SensorReading> {
        match self {
            Self::Decode(_) => None,
            Self::Scoring { reading, .. }
            | Self::Smoothing { reading, .. }
            | Self::SensorWrite { reading, .. }
            | Self::PredictionWrite { reading, .. } => Some(reading),
        }
    }
}

/// Sequences the per-message stages over injected handles.
pub struct MessageProcessor {
    oracle: Arc<dyn ScoringOracle>,
    store: Arc<dyn TelemetryStore>,
    smoother: WindowSmoother,
    alerts: AlertDispatcher,
}

impl MessageProcessor {
    pub fn new(
        oracle: Arc<dyn ScoringOracle>,
        store: Arc<dyn TelemetryStore>,
        smoother: WindowSmoother,
        alerts: AlertDispatcher,
    ) -> Self {
        Self {
            oracle,
            store,
            smoother,
            alerts,
        }
    }

    pub fn store(&self) -> &Arc<dyn TelemetryStore> {
        &self.store
    }

    /// Process one message to completion.
    pub async fn handle(&self, msg: &InboundMessage) -> Result<MessageOutcome, PipelineError> {
        let reading = decode_at(&msg.payload, msg.received_at.timestamp())?;

        let raw_probability = self
            .oracle
            .score(&reading.features())
            .map_err(|source| PipelineError::Scoring { reading, source })?;

        let smoothed_probability = self
            .smoother
            .smooth(raw_probability, self.store.as_ref())
            .map_err(|source| PipelineError::Smoothing { reading, source })?;

        let sensor_record_id = self
            .store
            .append_sensor_record(&reading)
            .map_err(|source| PipelineError::SensorWrite { reading, source })?;

        let alert = self.alerts.dispatch(&reading, smoothed_probability).await;

        let prediction_record_id = self
            .store
            .append_prediction_record(sensor_record_id, raw_probability, smoothed_probability)
            .map_err(|source| PipelineError::PredictionWrite {
                reading,
                sensor_record_id,
                source,
            })?;

        Ok(MessageOutcome {
            reading,
            sensor_record_id,
            prediction_record_id,
            raw_probability,
            smoothed_probability,
            alert,
        })
    }
}
