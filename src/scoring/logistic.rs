//! Logistic regression scoring artifact.
//!
//! The training job exports the fitted model as JSON:
//!
//! ```json
//! {
//!   "model_type": "logistic_regression",
//!   "feature_names": ["temperature", "vibration", "rpm"],
//!   "coefficients": [0.3, 20.0, -0.02],
//!   "intercept": 13.0
//! }
//! ```
//!
//! Loading validates the feature order against
//! [`FEATURE_ORDER`](crate::types::FEATURE_ORDER). A model trained on a
//! different column order would silently produce wrong scores, so a mismatch
//! is a startup error.

use super::{ScoringError, ScoringOracle};
use crate::types::{FEATURE_COUNT, FEATURE_ORDER};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Only model family this loader understands.
const MODEL_TYPE: &str = "logistic_regression";

/// Artifact loading failures. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read model artifact {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse model artifact {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("unsupported model type '{0}' (expected 'logistic_regression')")]
    UnsupportedType(String),

    #[error("feature order {found:?} does not match expected {expected:?}")]
    FeatureOrder {
        found: Vec<String>,
        expected: Vec<String>,
    },

    #[error("model has {coefficients} coefficients for {features} features")]
    ShapeMismatch { coefficients: usize, features: usize },

    #[error("model parameters contain non-finite values")]
    NonFinite,
}

/// On-disk artifact shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelArtifact {
    model_type: String,
    feature_names: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
}

/// Binary logistic regression: `p = sigmoid(intercept + w · x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticModel {
    coefficients: [f64; FEATURE_COUNT],
    intercept: f64,
}

impl LogisticModel {
    /// Build a model directly from fitted parameters.
    pub fn new(
        coefficients: [f64; FEATURE_COUNT],
        intercept: f64,
    ) -> Result<Self, ModelLoadError> {
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelLoadError::NonFinite);
        }
        Ok(Self {
            coefficients,
            intercept,
        })
    }

    /// Load and validate an artifact file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ModelLoadError::Io(path.to_path_buf(), e))?;
        let model = Self::from_json(&json).map_err(|e| match e {
            ModelLoadError::Parse(_, err) => ModelLoadError::Parse(path.to_path_buf(), err),
            other => other,
        })?;

        info!(
            path = %path.display(),
            intercept = model.intercept,
            "Scoring model loaded"
        );
        Ok(model)
    }

    /// Parse and validate artifact JSON.
    pub fn from_json(json: &str) -> Result<Self, ModelLoadError> {
        let artifact: ModelArtifact = serde_json::from_str(json)
            .map_err(|e| ModelLoadError::Parse(PathBuf::new(), e))?;

        if artifact.model_type != MODEL_TYPE {
            return Err(ModelLoadError::UnsupportedType(artifact.model_type));
        }

        if artifact.feature_names.iter().map(String::as_str).ne(FEATURE_ORDER) {
            return Err(ModelLoadError::FeatureOrder {
                found: artifact.feature_names,
                expected: FEATURE_ORDER.iter().map(|s| (*s).to_string()).collect(),
            });
        }

        let coefficients: [f64; FEATURE_COUNT] =
            artifact.coefficients.as_slice().try_into().map_err(|_| {
                ModelLoadError::ShapeMismatch {
                    coefficients: artifact.coefficients.len(),
                    features: FEATURE_COUNT,
                }
            })?;

        Self::new(coefficients, artifact.intercept)
    }

    fn logit(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        self.coefficients
            .iter()
            .zip(features)
            .fold(self.intercept, |acc, (w, x)| acc + w * x)
    }
}

impl ScoringOracle for LogisticModel {
    fn score(&self, features: &[f64]) -> Result<f64, ScoringError> {
        let features: &[f64; FEATURE_COUNT] =
            features.try_into().map_err(|_| ScoringError::Arity {
                expected: FEATURE_COUNT,
                actual: features.len(),
            })?;

        for (name, value) in FEATURE_ORDER.into_iter().zip(features) {
            if !value.is_finite() {
                return Err(ScoringError::NonFinite {
                    name,
                    value: *value,
                });
            }
        }

        Ok(sigmoid(self.logit(features)).clamp(0.0, 1.0))
    }

    fn describe(&self) -> String {
        format!(
            "logistic regression (w={:?}, b={})",
            self.coefficients, self.intercept
        )
    }
}

/// Numerically stable logistic function.
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
