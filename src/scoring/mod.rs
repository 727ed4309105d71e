//! Scoring Oracle
//!
//! The pipeline treats the failure classifier as opaque: it hands over a
//! feature vector in [`FEATURE_ORDER`](crate::types::FEATURE_ORDER) and gets
//! back a probability in [0, 1]. Everything else about the model lives behind
//! [`ScoringOracle`].
//!
//! - `logistic`: logistic regression artifact exported by the training job

pub mod logistic;

pub use logistic::{LogisticModel, ModelLoadError};

use thiserror::Error;

/// Per-message scoring failures. Recoverable: the message is dropped.
#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("expected {expected} features, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("feature {name} is not a finite number ({value})")]
    NonFinite { name: &'static str, value: f64 },
}

/// Stateless map from a fixed-order feature vector to a failure probability.
///
/// Implementations must be thread-safe; a single instance is shared by the
/// processing loop for the lifetime of the process.
pub trait ScoringOracle: Send + Sync {
    /// Probability of failure for one feature vector.
    fn score(&self, features: &[f64]) -> Result<f64, ScoringError>;

    /// Human-readable model description for logging
    fn describe(&self) -> String;
}
