//! Core data model for the motor-health pipeline.
//!
//! A [`SensorReading`] is built per inbound message and never stored on its
//! own: the Persistence Writer wraps it in a [`SensorRecord`], and the
//! scoring result is written as a [`PredictionRecord`] that points back at it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of features the scoring oracle consumes.
pub const FEATURE_COUNT: usize = 3;

/// Feature names in the order the scoring artifact was trained on.
///
/// The order is load-bearing: [`SensorReading::features`] must produce values
/// in exactly this sequence.
pub const FEATURE_ORDER: [&str; FEATURE_COUNT] = ["temperature", "vibration", "rpm"];

// ============================================================================
// Sensor Reading
// ============================================================================

/// One decoded telemetry sample from the motor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Motor temperature (°C)
    pub temperature: f64,
    /// Vibration magnitude (m/s²)
    pub vibration: f64,
    /// Shaft speed (rev/min)
    pub rpm: f64,
    /// Event time, Unix epoch seconds. Defaults to receipt time when the
    /// publisher omits it.
    pub timestamp: i64,
}

impl SensorReading {
    /// Feature vector in [`FEATURE_ORDER`].
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [self.temperature, self.vibration, self.rpm]
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Temp={} Vib={} RPM={}",
            self.temperature, self.vibration, self.rpm
        )
    }
}

// ============================================================================
// Persisted Records
// ============================================================================

/// Store-generated record identifier.
///
/// Ids are strictly increasing in creation order, so the highest id is the
/// most recently created record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_be_bytes(arr)))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable record of a raw reading as it entered the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub id: RecordId,
    pub reading: SensorReading,
    /// Wall-clock time the record was written
    pub ingestion_time: DateTime<Utc>,
}

/// Immutable record of one scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: RecordId,
    /// The [`SensorRecord`] written earlier in the same handling pass
    pub sensor_record_id: RecordId,
    /// Oracle output. Absent on records written before raw scores were kept.
    #[serde(default)]
    pub raw_probability: Option<f64>,
    pub smoothed_probability: f64,
    pub created_time: DateTime<Utc>,
}

impl PredictionRecord {
    /// Value this record contributes to the smoothing window.
    ///
    /// Older records carry only the smoothed value, which stands in for the
    /// missing raw score.
    pub fn window_value(&self) -> f64 {
        self.raw_probability.unwrap_or(self.smoothed_probability)
    }
}

/// Check that a value is a probability in [0, 1].
pub fn is_probability(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(raw: Option<f64>, smoothed: f64) -> PredictionRecord {
        PredictionRecord {
            id: RecordId(2),
            sensor_record_id: RecordId(1),
            raw_probability: raw,
            smoothed_probability: smoothed,
            created_time: Utc::now(),
        }
    }

    #[test]
    fn test_features_follow_training_order() {
        let reading = SensorReading {
            temperature: 30.0,
            vibration: 0.4,
            rpm: 2500.0,
            timestamp: 0,
        };
        assert_eq!(reading.features(), [30.0, 0.4, 2500.0]);
        assert_eq!(FEATURE_ORDER, ["temperature", "vibration", "rpm"]);
    }

    #[test]
    fn test_window_value_prefers_raw() {
        assert_eq!(record(Some(0.2), 0.6).window_value(), 0.2);
        assert_eq!(record(None, 0.6).window_value(), 0.6);
    }

    #[test]
    fn test_legacy_record_without_raw_deserializes() {
        let json = r#"{
            "id": 7,
            "sensor_record_id": 6,
            "smoothed_probability": 0.42,
            "created_time": "2026-01-01T00:00:00Z"
        }"#;
        let rec: PredictionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.raw_probability, None);
        assert_eq!(rec.window_value(), 0.42);
        assert_eq!(rec.id, RecordId(7));
    }

    #[test]
    fn test_record_id_byte_roundtrip_sorts() {
        let a = RecordId(5).to_be_bytes();
        let b = RecordId(300).to_be_bytes();
        assert!(a < b);
        assert_eq!(RecordId::from_be_slice(&b), Some(RecordId(300)));
        assert_eq!(RecordId::from_be_slice(&[1, 2, 3]), None);
    }

    #[test]
    fn test_is_probability_bounds() {
        assert!(is_probability(0.0));
        assert!(is_probability(1.0));
        assert!(!is_probability(1.0001));
        assert!(!is_probability(-0.1));
        assert!(!is_probability(f64::NAN));
    }
}
