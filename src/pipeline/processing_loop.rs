//! Message processing loop shared across input modes.
//!
//! Pulls from any [`MessageSource`], runs each message through the
//! [`MessageProcessor`] to completion, logs the result, and folds it into the
//! shared [`PipelineStats`]. Per-message failures never stop the loop; it
//! ends on cancellation, a closed source, or a source error.

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::processor::{MessageOutcome, MessageProcessor, PipelineError};
use super::source::{MessageSource, SourceEvent};
use super::{PipelineStats, SharedStats};
use crate::alert::AlertOutcome;
use crate::config::defaults::PROGRESS_LOG_INTERVAL;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Owns everything needed to drain a source.
///
/// Built with [`new()`](ProcessingLoop::new), consumed by
/// [`run()`](ProcessingLoop::run).
pub struct ProcessingLoop {
    processor: MessageProcessor,
    stats: SharedStats,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    pub fn new(
        processor: MessageProcessor,
        stats: SharedStats,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            processor,
            stats,
            cancel_token,
        }
    }

    /// Run until the source closes or cancellation.
    ///
    /// Cancellation is only observed between messages; a message in flight
    /// is always finished. Returns final statistics.
    pub async fn run<S: MessageSource>(self, source: &mut S) -> PipelineStats {
        {
            let mut stats = self.stats.write().await;
            stats.source = source.source_name().to_string();
        }

        info!("📊 Processing motor telemetry from {}...", source.source_name());
        info!("{}", RULE);

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[ProcessingLoop] Shutdown signal received");
                    break;
                }
                result = source.next_message() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!("[ProcessingLoop] Source error: {}", e);
                            break;
                        }
                    }
                }
            };

            let msg = match event {
                SourceEvent::Message(msg) => msg,
                SourceEvent::Closed => {
                    info!("[ProcessingLoop] Source closed");
                    break;
                }
            };

            let result = self.processor.handle(&msg).await;
            log_result(&result);

            let received = {
                let mut stats = self.stats.write().await;
                stats.record(&result);
                stats.messages_received
            };

            if received % PROGRESS_LOG_INTERVAL == 0 {
                let stats = self.stats.read().await;
                let counts = self.processor.store().counts();
                info!(
                    "📈 Progress: {} messages | Processed: {} | Dropped: {} | Alerts: {} | Stored: {}/{}",
                    stats.messages_received,
                    stats.messages_processed,
                    stats.dropped.total(),
                    stats.alerts.sent,
                    counts.sensor_records,
                    counts.prediction_records
                );
            }
        }

        let stats = self.stats.read().await.clone();
        log_final_stats(&stats);
        stats
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn log_result(result: &Result<MessageOutcome, PipelineError>) {
    match result {
        Ok(outcome) => {
            let r = &outcome.reading;
            info!(
                sensor_id = %outcome.sensor_record_id,
                temperature = r.temperature,
                vibration = r.vibration,
                rpm = r.rpm,
                raw = outcome.raw_probability,
                smoothed = outcome.smoothed_probability,
                "Processed: {} | Raw={:.4} Smoothed={:.4}{}",
                r,
                outcome.raw_probability,
                outcome.smoothed_probability,
                if outcome.alert == AlertOutcome::NotTriggered { "" } else { " | ALERT" }
            );
        }
        Err(PipelineError::Decode(e)) => {
            warn!(error = %e, "Dropping malformed message");
        }
        Err(PipelineError::PredictionWrite {
            reading,
            sensor_record_id,
            source,
        }) => {
            error!(
                sensor_id = %sensor_record_id,
                temperature = reading.temperature,
                vibration = reading.vibration,
                rpm = reading.rpm,
                error = %source,
                "Prediction not stored, sensor record left without prediction"
            );
        }
        Err(e) => {
            // Every non-decode stage carries the reading.
            if let Some(r) = e.reading() {
                warn!(
                    stage = e.stage(),
                    temperature = r.temperature,
                    vibration = r.vibration,
                    rpm = r.rpm,
                    error = %e,
                    "Dropping message"
                );
            }
        }
    }
}

fn log_final_stats(stats: &PipelineStats) {
    info!("");
    info!("{}", RULE);
    info!("📊 FINAL STATISTICS");
    info!("{}", RULE);
    info!("   Source:               {}", stats.source);
    info!("   Messages Received:    {}", stats.messages_received);
    info!("   Messages Processed:   {}", stats.messages_processed);
    info!("   Dropped (decode):     {}", stats.dropped.decode);
    info!("   Dropped (scoring):    {}", stats.dropped.scoring);
    info!("   Dropped (smoothing):  {}", stats.dropped.smoothing);
    info!("   Dropped (storage):    {}", stats.dropped.sensor_write);
    info!("   Orphaned Sensor Recs: {}", stats.dropped.prediction_write);
    info!("   Alerts Sent:          {}", stats.alerts.sent);
    info!("   Alerts Failed:        {}", stats.alerts.failed);
    info!("   Alerts Unconfigured:  {}", stats.alerts.unconfigured);
    info!("   Uptime:               {}s", stats.uptime_secs());
    info!("{}", RULE);
}
