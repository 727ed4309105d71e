//! Telegram Bot API channel

use super::{NotificationChannel, NotifyError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Posts alerts through `sendMessage` with Markdown formatting.
#[derive(Clone)]
pub struct TelegramChannel {
    http: reqwest::Client,
    endpoint: String,
}

impl TelegramChannel {
    /// `api_base` is normally `https://api.telegram.org`.
    pub fn new(api_base: &str, bot_token: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NotifyError::Http)?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                bot_token
            ),
        })
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send(&self, destination: &str, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": destination,
            "text": text,
            "parse_mode": "Markdown",
        });

        // The endpoint embeds the bot token; keep it out of error messages.
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.without_url()))?;

        let status = resp.status();
        if status.is_success() {
            debug!(status = %status, "Telegram notification accepted");
            Ok(())
        } else {
            Err(NotifyError::Status(status))
        }
    }

    fn channel_name(&self) -> &'static str {
        "Telegram"
    }
}
