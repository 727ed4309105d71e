//! Sensor data acquisition module
//!
//! Handles data ingestion from the MQTT feed and payload decoding.

pub mod decoder;
pub mod mqtt;

pub use decoder::{decode, decode_at, DecodeError};
pub use mqtt::{BrokerError, MqttSubscriber};

use chrono::{DateTime, Utc};

/// One message as delivered by the feed, before decoding.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Stamp a message with the current time.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}
