//! Feed payload decoder
//!
//! Publishers send one JSON object per message:
//!
//! ```json
//! {"temperature": 31.2, "vibration": 0.214, "rpm": 2710, "timestamp": 1767225600}
//! ```
//!
//! `temperature`, `vibration` and `rpm` are required numbers. `timestamp` is
//! optional integer epoch seconds; when absent (or `null`) the receipt time is
//! used instead.

use crate::types::SensorReading;
use serde_json::{Map, Value};
use thiserror::Error;

/// Payload decoding errors. Recoverable: the message is dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    Utf8,

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be a number, got {found}")]
    NonNumeric { field: &'static str, found: &'static str },

    #[error("timestamp must be integer epoch seconds, got {0}")]
    InvalidTimestamp(String),
}

/// Decode a payload, using the current wall-clock time as the default timestamp.
pub fn decode(payload: &[u8]) -> Result<SensorReading, DecodeError> {
    decode_at(payload, chrono::Utc::now().timestamp())
}

/// Decode a payload with an explicit receipt time (epoch seconds) for the
/// timestamp default.
pub fn decode_at(payload: &[u8], received_at: i64) -> Result<SensorReading, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::Utf8)?;
    let value: Value = serde_json::from_str(text)?;
    let obj = match &value {
        Value::Object(map) => map,
        other => return Err(DecodeError::NotAnObject(json_type(other))),
    };

    let temperature = required_number(obj, "temperature")?;
    let vibration = required_number(obj, "vibration")?;
    let rpm = required_number(obj, "rpm")?;

    let timestamp = match obj.get("timestamp") {
        None | Some(Value::Null) => received_at,
        Some(v) => v
            .as_i64()
            .ok_or_else(|| DecodeError::InvalidTimestamp(v.to_string()))?,
    };

    Ok(SensorReading {
        temperature,
        vibration,
        rpm,
        timestamp,
    })
}

fn required_number(obj: &Map<String, Value>, field: &'static str) -> Result<f64, DecodeError> {
    match obj.get(field) {
        None => Err(DecodeError::MissingField(field)),
        Some(Value::Number(n)) => n.as_f64().ok_or(DecodeError::NonNumeric {
            field,
            found: "number",
        }),
        Some(other) => Err(DecodeError::NonNumeric {
            field,
            found: json_type(other),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
