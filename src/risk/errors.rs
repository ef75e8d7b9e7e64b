//! Risk engine error types
//!
//! Training failures are never fatal for the service: the model cache turns
//! every variant here into "no model" and the scorer falls back to the
//! amount-threshold rule.

use thiserror::Error;

/// Errors raised while loading a dataset, training, or running the pipeline
#[derive(Debug, Error)]
pub enum RiskError {
    /// Dataset is missing, unreadable, or not tabular
    #[error("Dataset unavailable: {0}")]
    DatasetUnavailable(String),

    /// Not enough labelled rows to fit a model
    #[error("Insufficient data: {rows} rows, at least {required} required")]
    InsufficientData { rows: usize, required: usize },

    /// Anything else that went wrong while fitting
    #[error("Training error: {0}")]
    TrainingError(String),

    /// Inference vector does not match the fitted pipeline
    #[error("Feature mismatch: expected {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },
}

/// Risk engine result type
pub type Result<T> = std::result::Result<T, RiskError>;

impl RiskError {
    /// Whether a later attempt could succeed without a code change
    /// (e.g. the dataset shows up or grows).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DatasetUnavailable(_) | Self::InsufficientData { .. }
        )
    }

    /// Short, stable label for logs and status payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatasetUnavailable(_) => "dataset_unavailable",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::TrainingError(_) => "training_error",
            Self::FeatureMismatch { .. } => "feature_mismatch",
        }
    }
}

impl From<arrow::error::ArrowError> for RiskError {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::DatasetUnavailable(err.to_string())
    }
}
