//! Alert Dispatch
//!
//! Best-effort notification when the smoothed failure probability crosses
//! the alert threshold. Delivery failure is reported in the outcome and
//! logged; it never stops the pipeline. No retry queue, no debounce: every
//! qualifying message produces one send attempt.

mod telegram;

pub use telegram::TelegramChannel;

use crate::config::AlertConfig;
use crate::types::SensorReading;
use async_trait::async_trait;
use chrono::DateTime;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("notification API returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Delivery backend for alert text.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver `text` to `destination` (a chat id for Telegram).
    async fn send(&self, destination: &str, text: &str) -> Result<(), NotifyError>;

    fn channel_name(&self) -> &'static str;
}

/// What happened to one message's alert decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOutcome {
    /// Smoothed probability at or below the threshold
    NotTriggered,
    Sent,
    /// Threshold crossed but no channel is configured
    Unconfigured,
    Failed(String),
}

struct Route {
    channel: Arc<dyn NotificationChannel>,
    destination: String,
}

/// Decides whether to alert and sends the formatted message.
pub struct AlertDispatcher {
    threshold: f64,
    timeout: Duration,
    route: Option<Route>,
}

impl AlertDispatcher {
    pub fn new(
        threshold: f64,
        timeout: Duration,
        channel: Arc<dyn NotificationChannel>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            threshold,
            timeout,
            route: Some(Route {
                channel,
                destination: destination.into(),
            }),
        }
    }

    /// A dispatcher that only logs when the threshold is crossed.
    pub fn unconfigured(threshold: f64) -> Self {
        Self {
            threshold,
            timeout: Duration::from_secs(crate::config::defaults::ALERT_TIMEOUT_SECS),
            route: None,
        }
    }

    /// Telegram dispatcher when credentials are present, otherwise unconfigured.
    pub fn from_config(config: &AlertConfig) -> Result<Self, NotifyError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        match config.credentials() {
            Some((token, chat_id)) => {
                let channel = TelegramChannel::new(&config.api_base, token, timeout)?;
                info!(threshold = config.threshold, "Telegram alerting enabled");
                Ok(Self::new(config.threshold, timeout, Arc::new(channel), chat_id))
            }
            None => {
                warn!("TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set, alerts will only be logged");
                Ok(Self::unconfigured(config.threshold))
            }
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_configured(&self) -> bool {
        self.route.is_some()
    }

    /// Strictly greater: a smoothed value equal to the threshold does not alert.
    pub fn should_alert(&self, smoothed: f64) -> bool {
        smoothed > self.threshold
    }

    /// Alert if `smoothed` crosses the threshold.
    pub async fn dispatch(&self, reading: &SensorReading, smoothed: f64) -> AlertOutcome {
        if !self.should_alert(smoothed) {
            return AlertOutcome::NotTriggered;
        }

        let Some(route) = &self.route else {
            warn!(
                smoothed,
                temperature = reading.temperature,
                vibration = reading.vibration,
                rpm = reading.rpm,
                "Failure risk above threshold but no alert channel configured"
            );
            return AlertOutcome::Unconfigured;
        };

        let text = format_alert(reading, smoothed);
        let send = route.channel.send(&route.destination, &text);
        let result = match tokio::time::timeout(self.timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.timeout)),
        };

        match result {
            Ok(()) => {
                info!(
                    channel = route.channel.channel_name(),
                    smoothed, "🚨 Failure alert sent"
                );
                AlertOutcome::Sent
            }
            Err(e) => {
                warn!(
                    channel = route.channel.channel_name(),
                    error = %e,
                    "Failed to send failure alert"
                );
                AlertOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Markdown alert text.
pub fn format_alert(reading: &SensorReading, smoothed: f64) -> String {
    let time = DateTime::from_timestamp(reading.timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| reading.timestamp.to_string());

    format!(
        "🚨 *CRITICAL WARNING: Motor Failure Detected* 🚨\n\n\
         ⏰ *Time:* {time}\n\
         ⚠️ *Failure Probability:* {:.1}%\n\n\
         📊 *Sensor Readings:*\n\
         • Temperature: {:.1} °C\n\
         • Vibration: {:.3} m/s²\n\
         • RPM: {:.0}\n\n\
         Please check the equipment immediately!",
        smoothed * 100.0,
        reading.temperature,
        reading.vibration,
        reading.rpm,
    )
}
