//! Transaction risk engine
//!
//! ## Components
//! - `dataset` - CSV loading into typed columns
//! - `features` - label inference, feature schema, one-hot encoding
//! - `model` - imputer + scaler + logistic regression pipeline
//! - `trainer` - end-to-end training run
//! - `cache` - lazily trained, process-wide model holder
//! - `scorer` - amount scoring with the threshold-rule fallback

pub mod cache;
pub mod dataset;
pub mod errors;
pub mod features;
pub mod model;
pub mod scorer;
pub mod trainer;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use cache::{CacheLookup, CacheStatus, ModelCache};
pub use errors::{Result, RiskError};
pub use features::{FeatureSchema, AMOUNT_ALIASES, LABEL_PRIORITY};
pub use scorer::Scorer;
pub use trainer::{CsvTrainer, ModelTrainer, TrainedModel, TrainerConfig, TrainingReport};

/// Risk decision for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Fraud,
    Legit,
    /// Neither the model nor the rule could be evaluated
    Unknown,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fraud => "FRAUD",
            Self::Legit => "LEGIT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the rule was used instead of the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradedReason {
    NoModel,
    SchemaMismatch { expected: String, actual: String },
    AmountNotInSchema,
    Inference { message: String },
    NonFiniteProbability,
    NonFiniteAmount,
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoModel => write!(f, "no trained model available"),
            Self::SchemaMismatch { expected, actual } => {
                write!(f, "feature schema mismatch (model {}, request {})", expected, actual)
            }
            Self::AmountNotInSchema => write!(f, "no amount column in the trained schema"),
            Self::Inference { message } => write!(f, "inference failed: {}", message),
            Self::NonFiniteProbability => write!(f, "model returned a non-finite probability"),
            Self::NonFiniteAmount => write!(f, "amount is not a finite number"),
        }
    }
}

/// Scoring result that keeps nominal and fallback decisions apart
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    /// The trained model produced the verdict
    Scored { verdict: Verdict, probability: f64 },
    /// The amount rule produced the verdict
    Degraded {
        verdict: Verdict,
        reason: DegradedReason,
    },
}

impl ScoreOutcome {
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::Scored { verdict, .. } | Self::Degraded { verdict, .. } => *verdict,
        }
    }

    pub fn is_nominal(&self) -> bool {
        matches!(self, Self::Scored { .. })
    }

    pub fn probability(&self) -> Option<f64> {
        match self {
            Self::Scored { probability, .. } => Some(*probability),
            Self::Degraded { .. } => None,
        }
    }

    pub fn degraded_reason(&self) -> Option<&DegradedReason> {
        match self {
            Self::Scored { .. } => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_serialization() {
        assert_eq!(serde_json::to_string(&Verdict::Fraud).unwrap(), "\"FRAUD\"");
        assert_eq!(serde_json::to_string(&Verdict::Legit).unwrap(), "\"LEGIT\"");
        assert_eq!(Verdict::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn test_outcome_accessors() {
        let scored = ScoreOutcome::Scored {
            verdict: Verdict::Fraud,
            probability: 0.9,
        };
        assert!(scored.is_nominal());
        assert_eq!(scored.probability(), Some(0.9));
        assert_eq!(scored.degraded_reason(), None);

        let degraded = ScoreOutcome::Degraded {
            verdict: Verdict::Legit,
            reason: DegradedReason::NoModel,
        };
        assert!(!degraded.is_nominal());
        assert_eq!(degraded.verdict(), Verdict::Legit);
        assert_eq!(degraded.probability(), None);
    }

    #[test]
    fn test_degraded_reason_serialization() {
        let json = serde_json::to_value(DegradedReason::AmountNotInSchema).unwrap();
        assert_eq!(json["kind"], "amount_not_in_schema");
    }
}
