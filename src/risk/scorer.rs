//! Amount scoring with rule fallback
//!
//! A usable model scores the amount through its own feature schema. Every
//! unusable-model condition falls back to the fixed amount threshold and is
//! reported as [`ScoreOutcome::Degraded`] with the reason.

use tracing::{debug, warn};

use super::cache::CacheLookup;
use super::{DegradedReason, ScoreOutcome, Verdict};

/// Default fallback threshold
pub const DEFAULT_FALLBACK_THRESHOLD: f64 = 10_000.0;

/// Probability at or above which a transaction is fraud
pub const FRAUD_PROBABILITY_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    fallback_threshold: f64,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_THRESHOLD)
    }
}

impl Scorer {
    pub fn new(fallback_threshold: f64) -> Self {
        Self { fallback_threshold }
    }

    pub fn fallback_threshold(&self) -> f64 {
        self.fallback_threshold
    }

    /// The rule used whenever no model can be used
    pub fn fallback_verdict(&self, amount: f64) -> Verdict {
        if !amount.is_finite() {
            Verdict::Unknown
        } else if amount >= self.fallback_threshold {
            Verdict::Fraud
        } else {
            Verdict::Legit
        }
    }

    pub fn score(&self, amount: f64, lookup: &CacheLookup) -> ScoreOutcome {
        if !amount.is_finite() {
            return ScoreOutcome::Degraded {
                verdict: Verdict::Unknown,
                reason: DegradedReason::NonFiniteAmount,
            };
        }

        match self.score_with_model(amount, lookup) {
            Ok(probability) => {
                let verdict = if probability >= FRAUD_PROBABILITY_THRESHOLD {
                    Verdict::Fraud
                } else {
                    Verdict::Legit
                };
                debug!("Model scored amount={} probability={:.4}", amount, probability);
                ScoreOutcome::Scored {
                    verdict,
                    probability,
                }
            }
            Err(reason) => {
                let verdict = self.fallback_verdict(amount);
                if reason == DegradedReason::NoModel {
                    debug!("No model available, rule verdict {:?}", verdict);
                } else {
                    warn!("⚠️ Scoring degraded to amount rule: {}", reason);
                }
                ScoreOutcome::Degraded { verdict, reason }
            }
        }
    }

    fn score_with_model(
        &self,
        amount: f64,
        lookup: &CacheLookup,
    ) -> std::result::Result<f64, DegradedReason> {
        let model = lookup.model.as_ref().ok_or(DegradedReason::NoModel)?;

        if model.schema().fingerprint() != lookup.schema.fingerprint() {
            return Err(DegradedReason::SchemaMismatch {
                expected: model.schema().fingerprint(),
                actual: lookup.schema.fingerprint(),
            });
        }
        if lookup.schema.amount_slot().is_none() {
            return Err(DegradedReason::AmountNotInSchema);
        }

        let row = lookup.schema.align_amount(amount);
        let probability = model
            .predict_proba(&row)
            .map_err(|e| DegradedReason::Inference {
                message: e.to_string(),
            })?;
        if !probability.is_finite() {
            return Err(DegradedReason::NonFiniteProbability);
        }
        Ok(probability)
    }
}
