//! Durable sled-backed telemetry store
//!
//! Two trees, `sensor_records` and `prediction_records`. Keys are record ids
//! as big-endian u64 bytes (natural chronological ordering); values are JSON.
//! Ids come from `Db::generate_id`, which is monotonic across restarts.
//!
//! `Tree::len` walks the whole tree, so record counts are taken once at open
//! and maintained on append.

use super::{check_probabilities, StorageError, StoreCounts, TelemetryStore};
use crate::types::{PredictionRecord, RecordId, SensorReading, SensorRecord};
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

const SENSOR_TREE: &str = "sensor_records";
const PREDICTION_TREE: &str = "prediction_records";

/// Sled telemetry store. Cheap to clone; clones share the database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    sensors: sled::Tree,
    predictions: sled::Tree,
    sensor_count: Arc<AtomicUsize>,
    prediction_count: Arc<AtomicUsize>,
}

impl SledStore {
    /// Open or create the store at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let sensors = db.open_tree(SENSOR_TREE)?;
        let predictions = db.open_tree(PREDICTION_TREE)?;

        let sensor_count = sensors.len();
        let prediction_count = predictions.len();
        info!(
            path = %path.display(),
            sensor_records = sensor_count,
            prediction_records = prediction_count,
            "Telemetry store opened"
        );

        Ok(Self {
            db,
            sensors,
            predictions,
            sensor_count: Arc::new(AtomicUsize::new(sensor_count)),
            prediction_count: Arc::new(AtomicUsize::new(prediction_count)),
        })
    }

    fn next_id(&self) -> Result<RecordId, StorageError> {
        Ok(RecordId(self.db.generate_id()?))
    }

    /// Database size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }
}

impl TelemetryStore for SledStore {
    fn append_sensor_record(&self, reading: &SensorReading) -> Result<RecordId, StorageError> {
        let record = SensorRecord {
            id: self.next_id()?,
            reading: *reading,
            ingestion_time: Utc::now(),
        };
        let value = serde_json::to_vec(&record)?;
        if self.sensors.insert(record.id.to_be_bytes(), value)?.is_none() {
            self.sensor_count.fetch_add(1, Ordering::Relaxed);
        }
        self.sensors.flush()?;
        Ok(record.id)
    }

    fn append_prediction_record(
        &self,
        sensor_record_id: RecordId,
        raw_probability: f64,
        smoothed_probability: f64,
    ) -> Result<RecordId, StorageError> {
        check_probabilities(raw_probability, smoothed_probability)?;
        let record = PredictionRecord {
            id: self.next_id()?,
            sensor_record_id,
            raw_probability: Some(raw_probability),
            smoothed_probability,
            created_time: Utc::now(),
        };
        let value = serde_json::to_vec(&record)?;
        if self.predictions.insert(record.id.to_be_bytes(), value)?.is_none() {
            self.prediction_count.fetch_add(1, Ordering::Relaxed);
        }
        self.predictions.flush()?;
        Ok(record.id)
    }

    fn recent_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>, StorageError> {
        let mut records = Vec::with_capacity(limit.min(64));

        // Newest first due to big-endian id keys
        for item in self.predictions.iter().rev() {
            if records.len() >= limit {
                break;
            }
            let (key, value) = item?;
            match serde_json::from_slice::<PredictionRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    key = ?RecordId::from_be_slice(&key),
                    error = %e,
                    "Skipping unreadable prediction record"
                ),
            }
        }

        Ok(records)
    }

    fn sensor_record(&self, id: RecordId) -> Result<Option<SensorRecord>, StorageError> {
        match self.sensors.get(id.to_be_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn counts(&self) -> StoreCounts {
        StoreCounts {
            sensor_records: self.sensor_count.load(Ordering::Relaxed),
            prediction_records: self.prediction_count.load(Ordering::Relaxed),
        }
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}
