//! Message source abstraction for feed ingestion.
//!
//! Provides a unified trait for reading raw feed messages from different
//! sources: the live MQTT subscription and JSON-lines replay files.

use crate::acquisition::{BrokerError, InboundMessage, MqttSubscriber};
use crate::config::{defaults, BrokerConfig};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Events produced by a message source.
pub enum SourceEvent {
    /// A raw message arrived; it has not been decoded yet.
    Message(InboundMessage),
    /// No more messages (end of replay, or the network task stopped).
    Closed,
}

/// Trait abstracting where feed messages come from.
///
/// The processing loop calls [`next_message`](MessageSource::next_message)
/// in a `select!` with cancellation.
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Wait for the next message.
    ///
    /// Returns `SourceEvent::Closed` when no more data is available.
    async fn next_message(&mut self) -> Result<SourceEvent>;

    /// Human-readable name for logging (e.g. "MQTT", "replay").
    fn source_name(&self) -> &str;

    /// Release transport resources once the loop has stopped.
    async fn shutdown(&mut self) {}
}

/// Replay file errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read replay file {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
}

// ============================================================================
// MQTT Source
// ============================================================================

/// Live feed subscription.
pub struct MqttSource {
    subscriber: MqttSubscriber,
}

impl MqttSource {
    /// Connect and subscribe. Failure is a startup error.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        Ok(Self {
            subscriber: MqttSubscriber::connect(config).await?,
        })
    }

    pub fn backlog(&self) -> usize {
        self.subscriber.backlog()
    }
}

#[async_trait]
impl MessageSource for MqttSource {
    async fn next_message(&mut self) -> Result<SourceEvent> {
        Ok(match self.subscriber.recv().await {
            Some(msg) => SourceEvent::Message(msg),
            None => SourceEvent::Closed,
        })
    }

    fn source_name(&self) -> &str {
        "MQTT"
    }

    async fn shutdown(&mut self) {
        self.subscriber.shutdown().await;
    }
}

// ============================================================================
// Replay Source
// ============================================================================

/// Replays pre-loaded payloads with an optional inter-message delay.
///
/// Payloads go through the same decode path as live messages, so malformed
/// entries are dropped exactly like malformed publishes.
pub struct ReplaySource {
    payloads: std::vec::IntoIter<Vec<u8>>,
    delay: Duration,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(payloads: Vec<Vec<u8>>, delay: Duration) -> Self {
        Self {
            payloads: payloads.into_iter(),
            delay,
            yielded_first: false,
        }
    }

    /// Load a JSON-lines file: one payload per non-blank line.
    pub fn from_file(path: &Path, delay: Duration) -> Result<Self, SourceError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| SourceError::Io(path.to_path_buf(), e))?;
        let payloads = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.as_bytes().to_vec())
            .collect();
        Ok(Self::new(payloads, delay))
    }

    /// Payloads not yet yielded.
    pub fn remaining(&self) -> usize {
        self.payloads.len()
    }
}

#[async_trait]
impl MessageSource for ReplaySource {
    async fn next_message(&mut self) -> Result<SourceEvent> {
        // No delay before the first message.
        if self.yielded_first && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.payloads.next() {
            Some(payload) => {
                self.yielded_first = true;
                Ok(SourceEvent::Message(InboundMessage::new(
                    defaults::FEED_TOPIC,
                    payload,
                )))
            }
            None => Ok(SourceEvent::Closed),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}
