//! Telemetry Storage
//!
//! Append-only persistence for sensor and prediction records behind the
//! [`TelemetryStore`] trait, so the pipeline is agnostic to the backend:
//! - [`SledStore`]: durable sled database, used in normal runs
//! - [`InMemoryStore`]: tests and `--ephemeral` runs
//!
//! Records are immutable once written. Ids are monotonically increasing and
//! double as the sort key, so "most recent" always means "highest id".

pub mod lockfile;
mod memory;
mod sled_store;

pub use lockfile::{LockError, ProcessLock};
pub use memory::InMemoryStore;
pub use sled_store::SledStore;

use crate::types::{is_probability, PredictionRecord, RecordId, SensorReading, SensorRecord};
use serde::Serialize;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Record totals, for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub sensor_records: usize,
    pub prediction_records: usize,
}

/// Pluggable persistence backend.
///
/// Implementations must be thread-safe (Send + Sync); the processing loop
/// writes while the status API reads.
pub trait TelemetryStore: Send + Sync {
    /// Append a sensor record and return its id.
    fn append_sensor_record(&self, reading: &SensorReading) -> Result<RecordId, StorageError>;

    /// Append a prediction record referencing `sensor_record_id`.
    fn append_prediction_record(
        &self,
        sensor_record_id: RecordId,
        raw_probability: f64,
        smoothed_probability: f64,
    ) -> Result<RecordId, StorageError>;

    /// Up to `limit` prediction records, most recently created first.
    fn recent_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>, StorageError>;

    /// Look up one sensor record.
    fn sensor_record(&self, id: RecordId) -> Result<Option<SensorRecord>, StorageError>;

    fn counts(&self) -> StoreCounts;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Reject prediction values that are not probabilities.
pub(crate) fn check_probabilities(raw: f64, smoothed: f64) -> Result<(), StorageError> {
    for (name, value) in [("raw_probability", raw), ("smoothed_probability", smoothed)] {
        if !is_probability(value) {
            return Err(StorageError::InvalidRecord(format!(
                "{name} {value} is outside [0, 1]"
            )));
        }
    }
    Ok(())
}
