//! Model training
//!
//! Dataset → label inference → feature encoding → stratified split →
//! pipeline fit. Nothing here touches the cache; callers decide what to do
//! with a failure.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::dataset::{self, ColumnValues, Table};
use super::errors::{Result, RiskError};
use super::features::{infer_label_column, FeatureEncoder, FeatureSchema};
use super::model::{LogisticConfig, Pipeline};

/// Default minimum number of labelled rows
pub const DEFAULT_MIN_ROWS: usize = 50;

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub min_rows: usize,
    /// Share of each class held out from fitting
    pub holdout_fraction: f64,
    pub seed: u64,
    pub logistic: LogisticConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            min_rows: DEFAULT_MIN_ROWS,
            holdout_fraction: 0.2,
            seed: 42,
            logistic: LogisticConfig::default(),
        }
    }
}

/// What a training run saw and produced. Informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub label_column: String,
    pub positive_class: String,
    pub rows: usize,
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub holdout_accuracy: Option<f64>,
    pub iterations: usize,
    pub trained_at: DateTime<Utc>,
}

/// A fitted pipeline together with the schema it was fitted on
#[derive(Debug, Clone)]
pub struct TrainedModel {
    schema: FeatureSchema,
    pipeline: Pipeline,
    report: TrainingReport,
}

impl TrainedModel {
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    /// Fraud probability for a vector laid out per [`Self::schema`].
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        self.pipeline.predict_proba(row)
    }
}

/// Anything that can produce a trained model on demand
pub trait ModelTrainer: Send + Sync {
    fn train(&self) -> Result<TrainedModel>;

    /// Human-readable description of the data source
    fn source(&self) -> String;
}

/// Trains from a CSV file on disk
#[derive(Debug, Clone)]
pub struct CsvTrainer {
    path: PathBuf,
    config: TrainerConfig,
}

impl CsvTrainer {
    pub fn new(path: impl Into<PathBuf>, config: TrainerConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Train on an in-memory table.
    pub fn train_table(&self, table: &Table) -> Result<TrainedModel> {
        train_table(table, &self.config)
    }
}

impl ModelTrainer for CsvTrainer {
    fn train(&self) -> Result<TrainedModel> {
        info!("🧠 Training fraud model from {}", self.path.display());
        let table = dataset::read_csv(&self.path)?;
        self.train_table(&table)
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }
}

/// Fit a model on `table` using `config`.
pub fn train_table(table: &Table, config: &TrainerConfig) -> Result<TrainedModel> {
    if table.row_count() < config.min_rows {
        return Err(RiskError::InsufficientData {
            rows: table.row_count(),
            required: config.min_rows,
        });
    }

    let names = table.column_names();
    let label_idx = infer_label_column(&names)
        .ok_or_else(|| RiskError::DatasetUnavailable("dataset has no columns".to_string()))?;
    let label_column = names[label_idx].to_string();
    debug!("Using '{}' as label column", label_column);

    let (labels, positive_class) = encode_labels(&table.columns()[label_idx].values)?;
    let labelled: Vec<usize> = (0..labels.len()).filter(|&i| labels[i].is_some()).collect();
    if labelled.len() < config.min_rows {
        return Err(RiskError::InsufficientData {
            rows: labelled.len(),
            required: config.min_rows,
        });
    }

    let encoder = FeatureEncoder::fit(table, label_idx)?;
    let matrix = encoder.transform(table);

    let (train_idx, holdout_idx) = stratified_split(&labelled, &labels, config);
    let train_rows: Vec<Vec<f64>> = train_idx.iter().map(|&i| matrix[i].clone()).collect();
    let train_labels: Vec<bool> = train_idx.iter().filter_map(|&i| labels[i]).collect();

    let pipeline = Pipeline::fit(&train_rows, &train_labels, &config.logistic)?;

    let holdout_accuracy = if holdout_idx.is_empty() {
        None
    } else {
        let mut correct = 0usize;
        for &i in &holdout_idx {
            let predicted = pipeline.predict_proba(&matrix[i])? >= 0.5;
            if Some(predicted) == labels[i] {
                correct += 1;
            }
        }
        Some(correct as f64 / holdout_idx.len() as f64)
    };

    let report = TrainingReport {
        label_column,
        positive_class,
        rows: labelled.len(),
        train_rows: train_idx.len(),
        holdout_rows: holdout_idx.len(),
        holdout_accuracy,
        iterations: pipeline.classifier().iterations(),
        trained_at: Utc::now(),
    };
    info!(
        "✅ Model trained: features={:?}, rows={}, holdout_accuracy={:?}",
        encoder.schema().names(),
        report.rows,
        report.holdout_accuracy
    );

    Ok(TrainedModel {
        schema: encoder.schema().clone(),
        pipeline,
        report,
    })
}

/// Map the label column to booleans (missing stays `None`) and name the
/// positive class. Exactly two classes are required; the greater one is
/// positive.
fn encode_labels(values: &ColumnValues) -> Result<(Vec<Option<bool>>, String)> {
    match values {
        ColumnValues::Numeric(values) => {
            let mut classes: Vec<f64> = values.iter().flatten().copied().collect();
            classes.sort_by(|a, b| a.total_cmp(b));
            classes.dedup();
            let positive = two_classes(&classes)?;
            let encoded = values.iter().map(|v| v.map(|v| v == positive)).collect();
            Ok((encoded, format_class(positive)))
        }
        ColumnValues::Categorical(values) => {
            let mut classes: Vec<&str> = values.iter().flatten().map(String::as_str).collect();
            classes.sort_unstable();
            classes.dedup();
            let positive = two_classes(&classes)?.to_string();
            let encoded = values
                .iter()
                .map(|v| v.as_ref().map(|v| *v == positive))
                .collect();
            Ok((encoded, positive))
        }
    }
}

fn two_classes<T: Copy + std::fmt::Debug>(classes: &[T]) -> Result<T> {
    match classes {
        [_, positive] => Ok(*positive),
        _ => Err(RiskError::TrainingError(format!(
            "label must have exactly two classes, found {:?}",
            classes
        ))),
    }
}

fn format_class(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Split labelled row indices per class with a seeded shuffle.
fn stratified_split(
    labelled: &[usize],
    labels: &[Option<bool>],
    config: &TrainerConfig,
) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut train = Vec::with_capacity(labelled.len());
    let mut holdout = Vec::new();

    for class in [false, true] {
        let mut members: Vec<usize> = labelled
            .iter()
            .copied()
            .filter(|&i| labels[i] == Some(class))
            .collect();
        members.shuffle(&mut rng);
        let take = ((members.len() as f64) * config.holdout_fraction).round() as usize;
        let take = take.min(members.len().saturating_sub(1));
        holdout.extend_from_slice(&members[..take]);
        train.extend_from_slice(&members[take..]);
    }

    train.sort_unstable();
    holdout.sort_unstable();
    (train, holdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::dataset::Column;

    fn synthetic_table(rows: usize) -> Table {
        let mut amount = Vec::new();
        let mut region = Vec::new();
        let mut label = Vec::new();
        for i in 0..rows {
            let fraud = i % 2 == 0;
            amount.push(Some(if fraud { 7000.0 + (i * 13 % 3000) as f64 } else { 100.0 + (i * 37 % 6800) as f64 }));
            region.push(Some(if i % 3 == 0 { "north" } else { "south" }.to_string()));
            label.push(Some(if fraud { 1.0 } else { 0.0 }));
        }
        Table::new(vec![
            Column::numeric("amount", amount),
            Column::categorical("region", region),
            Column::numeric("fraud_label", label),
        ])
        .unwrap()
    }

    #[test]
    fn test_train_rejects_small_dataset() {
        let err = train_table(&synthetic_table(10), &TrainerConfig::default()).unwrap_err();
        assert!(matches!(err, RiskError::InsufficientData { rows: 10, required: 50 }));
    }

    #[test]
    fn test_train_label_falls_back_to_last_column() {
        let model = train_table(&synthetic_table(200), &TrainerConfig::default()).unwrap();
        assert_eq!(model.report().label_column, "fraud_label");
        assert_eq!(model.report().positive_class, "1");
        assert_eq!(
            model.schema().names(),
            &["amount".to_string(), "region_south".to_string()]
        );
    }

    #[test]
    fn test_trained_model_scores_amounts() {
        let model = train_table(&synthetic_table(300), &TrainerConfig::default()).unwrap();
        let high = model.predict_proba(&model.schema().align_amount(9500.0)).unwrap();
        let low = model.predict_proba(&model.schema().align_amount(500.0)).unwrap();
        assert!(high >= 0.5, "high amount scored {high}");
        assert!(low < 0.5, "low amount scored {low}");
        assert!(model.report().holdout_accuracy.unwrap() > 0.8);
    }

    #[test]
    fn test_single_class_label_is_training_error() {
        let table = Table::new(vec![
            Column::numeric("amount", (0..60).map(|i| Some(i as f64)).collect()),
            Column::numeric("is_fraud", vec![Some(0.0); 60]),
        ])
        .unwrap();
        let err = train_table(&table, &TrainerConfig::default()).unwrap_err();
        assert!(matches!(err, RiskError::TrainingError(_)));
    }

    #[test]
    fn test_categorical_labels() {
        let (encoded, positive) = encode_labels(&ColumnValues::Categorical(vec![
            Some("yes".to_string()),
            None,
            Some("no".to_string()),
        ]))
        .unwrap();
        assert_eq!(positive, "yes");
        assert_eq!(encoded, vec![Some(true), None, Some(false)]);
    }

    #[test]
    fn test_stratified_split_keeps_both_classes() {
        let labels: Vec<Option<bool>> = (0..100).map(|i| Some(i % 4 == 0)).collect();
        let labelled: Vec<usize> = (0..100).collect();
        let (train, holdout) = stratified_split(&labelled, &labels, &TrainerConfig::default());

        assert_eq!(train.len() + holdout.len(), 100);
        assert_eq!(holdout.len(), 20);
        assert_eq!(holdout.iter().filter(|&&i| labels[i] == Some(true)).count(), 5);
    }
}
