//! End-to-end pipeline scenarios
//!
//! Drives `MessageProcessor` and `ProcessingLoop` with scripted oracles,
//! recording notification channels and fault-injecting stores. No broker and
//! no network.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use motor_sentinel::acquisition::InboundMessage;
use motor_sentinel::alert::{AlertDispatcher, AlertOutcome, NotificationChannel, NotifyError};
use motor_sentinel::pipeline::{
    MessageProcessor, PipelineStats, ProcessingLoop, ReplaySource, WindowSmoother,
};
use motor_sentinel::scoring::{LogisticModel, ScoringError, ScoringOracle};
use motor_sentinel::storage::{
    InMemoryStore, SledStore, StorageError, StoreCounts, TelemetryStore,
};
use motor_sentinel::types::{PredictionRecord, RecordId, SensorReading, SensorRecord};

// ============================================================================
// Test doubles
// ============================================================================

/// Returns scores from a fixed script, then repeats the last one.
struct Scripted {
    scores: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
}

impl Scripted {
    fn new(scores: &[f64]) -> Self {
        Self {
            scores: Mutex::new(scores.iter().copied().collect()),
            last: Mutex::new(0.0),
        }
    }
}

impl ScoringOracle for Scripted {
    fn score(&self, _features: &[f64]) -> Result<f64, ScoringError> {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.scores.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(*last)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl NotificationChannel for Recorder {
    async fn send(&self, destination: &str, text: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), text.to_string()));
        Ok(())
    }

    fn channel_name(&self) -> &'static str {
        "recorder"
    }
}

/// Rejects every send, like a Bot API answering 502.
struct Rejecting;

#[async_trait]
impl NotificationChannel for Rejecting {
    async fn send(&self, _destination: &str, _text: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Status(reqwest::StatusCode::BAD_GATEWAY))
    }

    fn channel_name(&self) -> &'static str {
        "rejecting"
    }
}

/// Never answers.
struct Hanging;

#[async_trait]
impl NotificationChannel for Hanging {
    async fn send(&self, _destination: &str, _text: &str) -> Result<(), NotifyError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    fn channel_name(&self) -> &'static str {
        "hanging"
    }
}

/// Wraps an in-memory store; each operation fails while its flag is set.
#[derive(Default)]
struct FaultyStore {
    inner: InMemoryStore,
    fail_queries: AtomicBool,
    fail_sensor_writes: AtomicBool,
    fail_prediction_writes: AtomicBool,
}

fn unavailable() -> StorageError {
    StorageError::Unavailable("disk full".to_string())
}

impl TelemetryStore for FaultyStore {
    fn append_sensor_record(&self, reading: &SensorReading) -> Result<RecordId, StorageError> {
        if self.fail_sensor_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.append_sensor_record(reading)
    }

    fn append_prediction_record(
        &self,
        sensor_record_id: RecordId,
        raw_probability: f64,
        smoothed_probability: f64,
    ) -> Result<RecordId, StorageError> {
        if self.fail_prediction_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner
            .append_prediction_record(sensor_record_id, raw_probability, smoothed_probability)
    }

    fn recent_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>, StorageError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.recent_predictions(limit)
    }

    fn sensor_record(&self, id: RecordId) -> Result<Option<SensorRecord>, StorageError> {
        self.inner.sensor_record(id)
    }

    fn counts(&self) -> StoreCounts {
        self.inner.counts()
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

// ============================================================================
// Helpers
// ============================================================================

const HEALTHY: &str = r#"{"temperature": 30, "vibration": 0.4, "rpm": 2500, "timestamp": 1767225600}"#;
const HOT: &str = r#"{"temperature": 72.5, "vibration": 0.6, "rpm": 2400, "timestamp": 1767225602}"#;

fn message(payload: &str) -> InboundMessage {
    InboundMessage::new("motor/health/data", payload.as_bytes().to_vec())
}

fn reference_model() -> LogisticModel {
    LogisticModel::new([0.3, 20.0, -0.02], 13.0).unwrap()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn healthy_reading_on_empty_store_is_not_smoothed_and_does_not_alert() {
    let store = Arc::new(InMemoryStore::new());
    let recorder = Arc::new(Recorder::default());
    let processor = MessageProcessor::new(
        Arc::new(reference_model()),
        store.clone(),
        WindowSmoother::new(5),
        AlertDispatcher::new(0.7, Duration::from_secs(1), recorder.clone(), "chat-1"),
    );

    let outcome = processor.handle(&message(HEALTHY)).await.unwrap();

    // z = 13 + 9 + 8 - 50 = -20
    let expected = 1.0 / (1.0 + 20f64.exp());
    assert!(approx(outcome.raw_probability, expected));
    assert_eq!(outcome.smoothed_probability, outcome.raw_probability);
    assert_eq!(outcome.alert, AlertOutcome::NotTriggered);
    assert!(recorder.sent.lock().unwrap().is_empty());

    let counts = store.counts();
    assert_eq!(counts.sensor_records, 1);
    assert_eq!(counts.prediction_records, 1);
}

#[tokio::test]
async fn rising_risk_is_averaged_over_the_window_and_alerts() {
    let store = Arc::new(InMemoryStore::new());
    let recorder = Arc::new(Recorder::default());
    let processor = MessageProcessor::new(
        Arc::new(Scripted::new(&[0.9, 0.8, 0.85, 0.9, 0.95])),
        store.clone(),
        WindowSmoother::new(5),
        AlertDispatcher::new(0.7, Duration::from_secs(1), recorder.clone(), "chat-1"),
    );

    let mut last = None;
    for _ in 0..5 {
        last = Some(processor.handle(&message(HOT)).await.unwrap());
    }
    let fifth = last.unwrap();

    assert!(approx(fifth.raw_probability, 0.95));
    assert!(approx(fifth.smoothed_probability, 0.88));
    assert_eq!(fifth.alert, AlertOutcome::Sent);

    let sent = recorder.sent.lock().unwrap();
    assert_eq!(sent.len(), 5);
    let (destination, text) = sent.last().unwrap();
    assert_eq!(destination, "chat-1");
    assert!(text.contains("72.5"));
    assert!(text.contains("88.0%"));

    // Stored raw scores are what the window reads back.
    let recent = store.recent_predictions(5).unwrap();
    let raws: Vec<f64> = recent.iter().filter_map(|p| p.raw_probability).collect();
    assert_eq!(raws, vec![0.95, 0.9, 0.85, 0.8, 0.9]);
}

#[tokio::test]
async fn window_only_spans_the_most_recent_predictions() {
    let store = Arc::new(InMemoryStore::new());
    let processor = MessageProcessor::new(
        Arc::new(Scripted::new(&[1.0, 1.0, 0.0, 0.0, 0.0])),
        store,
        WindowSmoother::new(3),
        AlertDispatcher::unconfigured(0.7),
    );

    let mut smoothed = Vec::new();
    for _ in 0..5 {
        smoothed.push(processor.handle(&message(HOT)).await.unwrap().smoothed_probability);
    }
    assert!(approx(smoothed[0], 1.0));
    assert!(approx(smoothed[2], 2.0 / 3.0));
    assert!(approx(smoothed[3], 1.0 / 3.0));
    assert!(approx(smoothed[4], 0.0));
}

#[tokio::test]
async fn threshold_crossing_without_channel_is_unconfigured() {
    let store = Arc::new(InMemoryStore::new());
    let processor = MessageProcessor::new(
        Arc::new(Scripted::new(&[0.99])),
        store.clone(),
        WindowSmoother::new(5),
        AlertDispatcher::unconfigured(0.7),
    );

    let outcome = processor.handle(&message(HOT)).await.unwrap();
    assert_eq!(outcome.alert, AlertOutcome::Unconfigured);
    // Persistence is unaffected.
    assert_eq!(store.counts().prediction_records, 1);
}

#[tokio::test]
async fn smoothed_value_equal_to_threshold_does_not_alert() {
    let recorder = Arc::new(Recorder::default());
    let processor = MessageProcessor::new(
        Arc::new(Scripted::new(&[0.7])),
        Arc::new(InMemoryStore::new()),
        WindowSmoother::new(5),
        AlertDispatcher::new(0.7, Duration::from_secs(1), recorder.clone(), "chat-1"),
    );

    let outcome = processor.handle(&message(HOT)).await.unwrap();
    assert_eq!(outcome.alert, AlertOutcome::NotTriggered);
    assert!(recorder.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_prediction_write_orphans_sensor_record_and_pipeline_continues() {
    let store = Arc::new(FaultyStore::default());
    let processor = MessageProcessor::new(
        Arc::new(Scripted::new(&[0.2, 0.4])),
        store.clone(),
        WindowSmoother::new(5),
        AlertDispatcher::unconfigured(0.7),
    );

    store.fail_prediction_writes.store(true, Ordering::SeqCst);
    let err = processor.handle(&message(HEALTHY)).await.unwrap_err();
    assert_eq!(err.stage(), "prediction_write");
    assert_eq!(store.counts().sensor_records, 1);
    assert_eq!(store.counts().prediction_records, 0);

    store.fail_prediction_writes.store(false, Ordering::SeqCst);
    let outcome = processor.handle(&message(HEALTHY)).await.unwrap();
    // The failed pass left nothing in the window.
    assert!(approx(outcome.smoothed_probability, 0.4));

    let counts = store.counts();
    assert_eq!(counts.sensor_records, 2);
    assert_eq!(counts.prediction_records, 1);
}

#[tokio::test]
async fn rejected_notification_still_persists_prediction() {
    let store = Arc::new(InMemoryStore::new());
    let processor = MessageProcessor::new(
        Arc::new(Scripted::new(&[0.95])),
        store.clone(),
        WindowSmoother::new(5),
        AlertDispatcher::new(0.7, Duration::from_secs(1), Arc::new(Rejecting), "chat-1"),
    );

    let outcome = processor.handle(&message(HOT)).await.unwrap();
    match &outcome.alert {
        AlertOutcome::Failed(reason) => assert!(reason.contains("502"), "reason {reason}"),
        other => panic!("expected a failed alert, got {other:?}"),
    }

    let counts = store.counts();
    assert_eq!(counts.sensor_records, 1);
    assert_eq!(counts.prediction_records, 1);
    let latest = &store.recent_predictions(1).unwrap()[0];
    assert_eq!(latest.id, outcome.prediction_record_id);
    assert!(approx(latest.smoothed_probability, 0.95));
}

#[tokio::test]
async fn notification_timeout_is_bounded_and_still_persists_prediction() {
    let store = Arc::new(InMemoryStore::new());
    let processor = MessageProcessor::new(
        Arc::new(Scripted::new(&[0.95])),
        store.clone(),
        WindowSmoother::new(5),
        AlertDispatcher::new(0.7, Duration::from_millis(50), Arc::new(Hanging), "chat-1"),
    );

    let outcome = tokio::time::timeout(Duration::from_secs(5), processor.handle(&message(HOT)))
        .await
        .expect("alert timeout bounds the handler")
        .unwrap();
    assert!(
        matches!(outcome.alert, AlertOutcome::Failed(ref reason) if reason.contains("no response"))
    );
    assert_eq!(store.counts().prediction_records, 1);
}

#[tokio::test]
async fn smoothing_query_failure_writes_nothing_and_skips_alert() {
    let store = Arc::new(FaultyStore::default());
    let recorder = Arc::new(Recorder::default());
    let processor = MessageProcessor::new(
        Arc::new(Scripted::new(&[0.99, 0.3])),
        store.clone(),
        WindowSmoother::new(5),
        AlertDispatcher::new(0.7, Duration::from_secs(1), recorder.clone(), "chat-1"),
    );

    store.fail_queries.store(true, Ordering::SeqCst);
    let err = processor.handle(&message(HOT)).await.unwrap_err();
    assert_eq!(err.stage(), "smoothing");
    assert_eq!(err.reading().map(|r| r.temperature), Some(72.5));
    assert_eq!(store.counts(), StoreCounts::default());
    assert!(recorder.sent.lock().unwrap().is_empty());

    store.fail_queries.store(false, Ordering::SeqCst);
    let outcome = processor.handle(&message(HEALTHY)).await.unwrap();
    assert!(approx(outcome.smoothed_probability, 0.3));
    assert_eq!(store.counts().prediction_records, 1);
}

#[tokio::test]
async fn sensor_write_failure_writes_nothing_and_skips_alert() {
    let store = Arc::new(FaultyStore::default());
    let recorder = Arc::new(Recorder::default());
    let processor = MessageProcessor::new(
        Arc::new(Scripted::new(&[0.99])),
        store.clone(),
        WindowSmoother::new(5),
        AlertDispatcher::new(0.7, Duration::from_secs(1), recorder.clone(), "chat-1"),
    );

    store.fail_sensor_writes.store(true, Ordering::SeqCst);
    let err = processor.handle(&message(HOT)).await.unwrap_err();
    assert_eq!(err.stage(), "sensor_write");
    assert!(err.reading().is_some());
    assert_eq!(store.counts(), StoreCounts::default());
    assert!(recorder.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn processing_loop_keeps_running_through_store_failures() {
    let store = Arc::new(FaultyStore::default());
    store.fail_sensor_writes.store(true, Ordering::SeqCst);
    let processor = MessageProcessor::new(
        Arc::new(reference_model()),
        store.clone(),
        WindowSmoother::new(5),
        AlertDispatcher::unconfigured(0.7),
    );
    let processing_loop =
        ProcessingLoop::new(processor, PipelineStats::shared("replay"), CancellationToken::new());

    let payloads = vec![HEALTHY.as_bytes().to_vec(); 3];
    let final_stats = processing_loop
        .run(&mut ReplaySource::new(payloads, Duration::ZERO))
        .await;

    assert_eq!(final_stats.messages_received, 3);
    assert_eq!(final_stats.messages_processed, 0);
    assert_eq!(final_stats.dropped.sensor_write, 3);
    assert_eq!(store.counts(), StoreCounts::default());
}

#[tokio::test]
async fn malformed_payloads_are_dropped_without_side_effects() {
    let store = Arc::new(InMemoryStore::new());
    let recorder = Arc::new(Recorder::default());
    let processor = MessageProcessor::new(
        Arc::new(Scripted::new(&[0.99])),
        store.clone(),
        WindowSmoother::new(5),
        AlertDispatcher::new(0.7, Duration::from_secs(1), recorder.clone(), "chat-1"),
    );

    for payload in [
        "not json",
        r#"{"temperature": 30, "vibration": 0.4}"#,
        r#"{"temperature": "hot", "vibration": 0.4, "rpm": 2500}"#,
        r#"[30, 0.4, 2500]"#,
    ] {
        let err = processor.handle(&message(payload)).await.unwrap_err();
        assert_eq!(err.stage(), "decode", "payload {payload}");
    }

    assert_eq!(store.counts(), StoreCounts::default());
    assert!(recorder.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn every_prediction_references_an_earlier_sensor_record() {
    let store = Arc::new(InMemoryStore::new());
    let processor = MessageProcessor::new(
        Arc::new(reference_model()),
        store.clone(),
        WindowSmoother::new(5),
        AlertDispatcher::unconfigured(0.7),
    );

    for payload in [HEALTHY, HOT, HEALTHY, HOT] {
        processor.handle(&message(payload)).await.unwrap();
    }

    let predictions = store.recent_predictions(10).unwrap();
    assert_eq!(predictions.len(), 4);
    for prediction in &predictions {
        let sensor = store
            .sensor_record(prediction.sensor_record_id)
            .unwrap()
            .expect("referenced sensor record exists");
        assert!(sensor.id < prediction.id);
        assert!(prediction.created_time >= sensor.ingestion_time);
    }
    // Newest first
    assert!(predictions.windows(2).all(|w| w[0].id > w[1].id));
}

#[tokio::test]
async fn replay_through_processing_loop_persists_to_sled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.db");

    let payloads = vec![
        HEALTHY.as_bytes().to_vec(),
        b"{broken".to_vec(),
        HOT.as_bytes().to_vec(),
        HEALTHY.as_bytes().to_vec(),
    ];

    {
        let store: Arc<dyn TelemetryStore> = Arc::new(SledStore::open(&path).unwrap());
        let processor = MessageProcessor::new(
            Arc::new(reference_model()),
            Arc::clone(&store),
            WindowSmoother::new(5),
            AlertDispatcher::unconfigured(0.7),
        );
        let stats = PipelineStats::shared("replay");
        let processing_loop =
            ProcessingLoop::new(processor, stats.clone(), CancellationToken::new());

        let mut source = ReplaySource::new(payloads, Duration::ZERO);
        let final_stats = processing_loop.run(&mut source).await;

        assert_eq!(final_stats.messages_received, 4);
        assert_eq!(final_stats.messages_processed, 3);
        assert_eq!(final_stats.dropped.decode, 1);
        assert_eq!(stats.read().await.messages_processed, 3);
    }

    // Records survive reopening.
    let reopened = SledStore::open(&path).unwrap();
    let counts = reopened.counts();
    assert_eq!(counts.sensor_records, 3);
    assert_eq!(counts.prediction_records, 3);
}
