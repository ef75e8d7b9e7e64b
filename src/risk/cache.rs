//! Process-wide model cache
//!
//! Holds the most recent successfully trained model. Training runs under a
//! mutex, so concurrent cold callers share a single run instead of each
//! fitting their own. A failed run leaves the slot empty and the next cold
//! call trains again (optionally after a cooldown).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::features::FeatureSchema;
use super::trainer::{ModelTrainer, TrainedModel, TrainingReport};

/// Result of [`ModelCache::get_or_train`]
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub model: Option<Arc<TrainedModel>>,
    /// Schema of `model`, or empty when there is none
    pub schema: FeatureSchema,
}

impl CacheLookup {
    fn miss() -> Self {
        Self {
            model: None,
            schema: FeatureSchema::empty(),
        }
    }

    fn hit(model: Arc<TrainedModel>) -> Self {
        Self {
            schema: model.schema().clone(),
            model: Some(model),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }
}

/// Snapshot for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub ready: bool,
    pub source: String,
    pub features: Vec<String>,
    pub schema_fingerprint: Option<String>,
    pub schema_version: Option<u32>,
    pub training_attempts: u64,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub report: Option<TrainingReport>,
}

#[derive(Default)]
struct Slot {
    model: Option<Arc<TrainedModel>>,
    attempts: u64,
    last_error: Option<String>,
    last_failure: Option<Instant>,
    last_attempt_at: Option<DateTime<Utc>>,
}

/// Lazily trained model holder
pub struct ModelCache {
    trainer: Box<dyn ModelTrainer>,
    slot: Mutex<Slot>,
    retry_cooldown: Duration,
}

impl ModelCache {
    /// Cache that retries training on every cold call.
    pub fn new(trainer: Box<dyn ModelTrainer>) -> Self {
        Self::with_retry_cooldown(trainer, Duration::ZERO)
    }

    /// Cache that skips retraining for `retry_cooldown` after a failure.
    pub fn with_retry_cooldown(trainer: Box<dyn ModelTrainer>, retry_cooldown: Duration) -> Self {
        Self {
            trainer,
            slot: Mutex::new(Slot::default()),
            retry_cooldown,
        }
    }

    /// Return the cached model, training one first if none exists.
    ///
    /// Blocks for the full training run on a cold cache; call from a
    /// blocking context.
    pub fn get_or_train(&self) -> CacheLookup {
        let mut slot = self.slot.lock();
        if let Some(model) = &slot.model {
            return CacheLookup::hit(model.clone());
        }

        if let Some(failed_at) = slot.last_failure {
            if failed_at.elapsed() < self.retry_cooldown {
                debug!("Skipping retrain, last failure {:?} ago", failed_at.elapsed());
                return CacheLookup::miss();
            }
        }

        slot.attempts += 1;
        slot.last_attempt_at = Some(Utc::now());
        match self.trainer.train() {
            Ok(model) => {
                let model = Arc::new(model);
                info!(
                    "Model cached after {} attempt(s), {} features",
                    slot.attempts,
                    model.schema().len()
                );
                slot.model = Some(model.clone());
                slot.last_error = None;
                slot.last_failure = None;
                CacheLookup::hit(model)
            }
            Err(e) => {
                if e.is_recoverable() {
                    warn!(
                        "⚠️ Training failed ({}): {}. Falling back to amount rule",
                        e.kind(),
                        e
                    );
                } else {
                    error!("Training failed ({}): {}. Falling back to amount rule", e.kind(), e);
                }
                slot.last_error = Some(e.to_string());
                slot.last_failure = Some(Instant::now());
                CacheLookup::miss()
            }
        }
    }

    /// Cached model without triggering training
    pub fn peek(&self) -> CacheLookup {
        match &self.slot.lock().model {
            Some(model) => CacheLookup::hit(model.clone()),
            None => CacheLookup::miss(),
        }
    }

    /// Train eagerly; returns whether a model is now available.
    pub fn warm_up(&self) -> bool {
        self.get_or_train().is_ready()
    }

    pub fn status(&self) -> CacheStatus {
        let slot = self.slot.lock();
        CacheStatus {
            ready: slot.model.is_some(),
            source: self.trainer.source(),
            features: slot
                .model
                .as_ref()
                .map(|m| m.schema().names().to_vec())
                .unwrap_or_default(),
            schema_fingerprint: slot.model.as_ref().map(|m| m.schema().fingerprint()),
            schema_version: slot.model.as_ref().map(|m| m.schema().version()),
            training_attempts: slot.attempts,
            last_error: slot.last_error.clone(),
            last_attempt_at: slot.last_attempt_at,
            report: slot.model.as_ref().map(|m| m.report().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::dataset::{Column, Table};
    use crate::risk::errors::{Result, RiskError};
    use crate::risk::trainer::{train_table, TrainerConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails until `fail_times` calls have been made, then trains on a
    /// small synthetic table.
    struct FlakyTrainer {
        calls: Arc<AtomicUsize>,
        fail_times: usize,
    }

    impl ModelTrainer for FlakyTrainer {
        fn train(&self) -> Result<TrainedModel> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(RiskError::DatasetUnavailable("not yet".to_string()));
            }
            let table = Table::new(vec![
                Column::numeric("amount", (0..60).map(|i| Some(i as f64 * 200.0)).collect()),
                Column::numeric("is_fraud", (0..60).map(|i| Some((i >= 30) as u8 as f64)).collect()),
            ])?;
            train_table(&table, &TrainerConfig::default())
        }

        fn source(&self) -> String {
            "flaky".to_string()
        }
    }

    fn flaky(fail_times: usize) -> (ModelCache, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let trainer = FlakyTrainer {
            calls: calls.clone(),
            fail_times,
        };
        (ModelCache::new(Box::new(trainer)), calls)
    }

    #[test]
    fn test_failure_is_retried_on_next_call() {
        let (cache, calls) = flaky(2);

        assert!(!cache.get_or_train().is_ready());
        assert!(cache.get_or_train().schema.is_empty());
        let lookup = cache.get_or_train();
        assert!(lookup.is_ready());
        assert_eq!(lookup.schema.names(), &["amount".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // cached from here on
        cache.get_or_train();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.status().training_attempts, 3);
    }

    #[test]
    fn test_status_records_last_error() {
        let (cache, _) = flaky(usize::MAX);
        cache.get_or_train();
        let status = cache.status();
        assert!(!status.ready);
        assert!(status.last_error.unwrap().contains("not yet"));
        assert!(status.last_attempt_at.is_some());
    }

    #[test]
    fn test_retry_cooldown_suppresses_training() {
        let calls = Arc::new(AtomicUsize::new(0));
        let trainer = FlakyTrainer {
            calls: calls.clone(),
            fail_times: usize::MAX,
        };
        let cache = ModelCache::with_retry_cooldown(Box::new(trainer), Duration::from_secs(3600));

        cache.get_or_train();
        cache.get_or_train();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_cold_start_trains_once() {
        let (cache, calls) = flaky(0);
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.get_or_train().is_ready())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_peek_does_not_train() {
        let (cache, calls) = flaky(0);
        assert!(!cache.peek().is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
