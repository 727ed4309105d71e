//! Rolling-window smoothing of raw failure probabilities.
//!
//! The window lives in the store, not in memory: the most recent prediction
//! records are re-read on every message, so continuity survives restarts and
//! every feed publisher shares one history.

use crate::storage::{StorageError, TelemetryStore};
use crate::types::PredictionRecord;

/// Averages the current raw score with up to `window_size - 1` prior scores.
#[derive(Debug, Clone, Copy)]
pub struct WindowSmoother {
    window_size: usize,
}

impl WindowSmoother {
    /// A window size of zero is treated as one (no smoothing).
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Smoothed probability for `current_raw`.
    ///
    /// Blocking read against the store; no side effects.
    pub fn smooth(
        &self,
        current_raw: f64,
        store: &dyn TelemetryStore,
    ) -> Result<f64, StorageError> {
        let history = if self.window_size > 1 {
            store.recent_predictions(self.window_size - 1)?
        } else {
            Vec::new()
        };
        Ok(window_mean(
            current_raw,
            history.iter().map(PredictionRecord::window_value),
        ))
    }
}

/// Arithmetic mean of `current` and `prior`, clamped to [0, 1].
pub fn window_mean(current: f64, prior: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = prior
        .into_iter()
        .fold((current, 1usize), |(sum, n), p| (sum + p, n + 1));
    (sum / count as f64).clamp(0.0, 1.0)
}
