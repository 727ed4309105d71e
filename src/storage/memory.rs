//! In-memory telemetry store
//!
//! Thread-safe via `RwLock`. Not durable - data lost on restart.

use super::{check_probabilities, StorageError, StoreCounts, TelemetryStore};
use crate::types::{PredictionRecord, RecordId, SensorReading, SensorRecord};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Vec-backed store. Ids come from one counter shared by both record kinds,
/// matching the durable backend.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    next_id: AtomicU64,
    sensors: RwLock<Vec<SensorRecord>>,
    predictions: RwLock<Vec<PredictionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> RecordId {
        RecordId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Append a prediction record exactly as given, bypassing id
    /// generation and validation. Used to seed legacy records that lack a
    /// raw score.
    pub fn insert_prediction(&self, record: PredictionRecord) -> Result<(), StorageError> {
        let mut predictions = self
            .predictions
            .write()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        self.next_id.fetch_max(record.id.0 + 1, Ordering::SeqCst);
        predictions.push(record);
        predictions.sort_by_key(|p| p.id);
        Ok(())
    }
}

impl TelemetryStore for InMemoryStore {
    fn append_sensor_record(&self, reading: &SensorReading) -> Result<RecordId, StorageError> {
        let mut sensors = self
            .sensors
            .write()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        let id = self.next_id();
        sensors.push(SensorRecord {
            id,
            reading: *reading,
            ingestion_time: Utc::now(),
        });
        Ok(id)
    }

    fn append_prediction_record(
        &self,
        sensor_record_id: RecordId,
        raw_probability: f64,
        smoothed_probability: f64,
    ) -> Result<RecordId, StorageError> {
        check_probabilities(raw_probability, smoothed_probability)?;
        let mut predictions = self
            .predictions
            .write()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        let id = self.next_id();
        predictions.push(PredictionRecord {
            id,
            sensor_record_id,
            raw_probability: Some(raw_probability),
            smoothed_probability,
            created_time: Utc::now(),
        });
        Ok(id)
    }

    fn recent_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>, StorageError> {
        let predictions = self
            .predictions
            .read()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(predictions.iter().rev().take(limit).cloned().collect())
    }

    fn sensor_record(&self, id: RecordId) -> Result<Option<SensorRecord>, StorageError> {
        let sensors = self
            .sensors
            .read()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(sensors
            .binary_search_by_key(&id, |s| s.id)
            .ok()
            .map(|idx| sensors[idx].clone()))
    }

    fn counts(&self) -> StoreCounts {
        StoreCounts {
            sensor_records: self.sensors.read().map(|s| s.len()).unwrap_or(0),
            prediction_records: self.predictions.read().map(|p| p.len()).unwrap_or(0),
        }
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(t: f64) -> SensorReading {
        SensorReading {
            temperature: t,
            vibration: 0.3,
            rpm: 2700.0,
            timestamp: 1_767_225_600,
        }
    }

    #[test]
    fn test_ids_increase_across_kinds() {
        let store = InMemoryStore::new();
        let s1 = store.append_sensor_record(&reading(25.0)).unwrap();
        let p1 = store.append_prediction_record(s1, 0.1, 0.1).unwrap();
        let s2 = store.append_sensor_record(&reading(26.0)).unwrap();
        assert!(s1 < p1 && p1 < s2);
    }

    #[test]
    fn test_recent_predictions_newest_first() {
        let store = InMemoryStore::new();
        for p in [0.1, 0.2, 0.3] {
            let s = store.append_sensor_record(&reading(25.0)).unwrap();
            store.append_prediction_record(s, p, p).unwrap();
        }
        let recent = store.recent_predictions(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].raw_probability, Some(0.3));
        assert_eq!(recent[1].raw_probability, Some(0.2));
        assert!(store.recent_predictions(0).unwrap().is_empty());
    }

    #[test]
    fn test_sensor_lookup() {
        let store = InMemoryStore::new();
        let id = store.append_sensor_record(&reading(41.5)).unwrap();
        let record = store.sensor_record(id).unwrap().unwrap();
        assert_eq!(record.reading.temperature, 41.5);
        assert!(store.sensor_record(RecordId(999)).unwrap().is_none());
    }

    #[test]
    fn test_rejects_out_of_range_probability() {
        let store = InMemoryStore::new();
        let s = store.append_sensor_record(&reading(25.0)).unwrap();
        let err = store.append_prediction_record(s, 1.5, 0.5).unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));
        assert_eq!(store.counts().prediction_records, 0);
    }

    #[test]
    fn test_trait_object() {
        let store: Box<dyn TelemetryStore> = Box::new(InMemoryStore::new());
        assert_eq!(store.backend_name(), "InMemory");
        let s = store.append_sensor_record(&reading(25.0)).unwrap();
        store.append_prediction_record(s, 0.4, 0.4).unwrap();
        assert_eq!(
            store.counts(),
            StoreCounts {
                sensor_records: 1,
                prediction_records: 1
            }
        );
    }
}
