//! Preprocessing + classification pipeline
//!
//! Median imputation → standardization → L2-regularised logistic regression.
//! Everything is plain `f64` math; the model is small enough that fitting a
//! few hundred rows by batch gradient descent takes milliseconds.

use serde::{Deserialize, Serialize};

use super::errors::{Result, RiskError};

/// Fitting hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticConfig {
    /// Inverse regularisation strength (sklearn's `C`)
    pub c: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
    /// Stop once the largest gradient component falls below this
    pub tolerance: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            learning_rate: 0.5,
            max_iter: 2000,
            tolerance: 1e-6,
        }
    }
}

/// Replaces NaN with the per-column median of the training data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Vec<f64>,
}

impl MedianImputer {
    pub fn fit(rows: &[Vec<f64>], width: usize) -> Self {
        let medians = (0..width)
            .map(|col| {
                let mut present: Vec<f64> = rows
                    .iter()
                    .map(|r| r[col])
                    .filter(|v| !v.is_nan())
                    .collect();
                median(&mut present).unwrap_or(0.0)
            })
            .collect();
        Self { medians }
    }

    pub fn apply(&self, row: &mut [f64]) {
        for (value, median) in row.iter_mut().zip(&self.medians) {
            if value.is_nan() {
                *value = *median;
            }
        }
    }

    pub fn medians(&self) -> &[f64] {
        &self.medians
    }
}

/// Zero mean, unit variance; constant columns keep scale 1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>], width: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let means: Vec<f64> = (0..width)
            .map(|col| rows.iter().map(|r| r[col]).sum::<f64>() / n)
            .collect();
        let scales = (0..width)
            .map(|col| {
                let var = rows
                    .iter()
                    .map(|r| (r[col] - means[col]).powi(2))
                    .sum::<f64>()
                    / n;
                let std = var.sqrt();
                if std > f64::EPSILON {
                    std
                } else {
                    1.0
                }
            })
            .collect();
        Self { means, scales }
    }

    pub fn apply(&self, row: &mut [f64]) {
        for ((value, mean), scale) in row.iter_mut().zip(&self.means).zip(&self.scales) {
            *value = (*value - mean) / scale;
        }
    }
}

/// Binary logistic regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    weights: Vec<f64>,
    bias: f64,
    iterations: usize,
}

impl LogisticRegression {
    /// Fit on already preprocessed rows. Minimises mean log-loss plus
    /// `||w||² / (2·C·n)`, which has the same optimum as sklearn's objective.
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], config: &LogisticConfig) -> Result<Self> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(RiskError::TrainingError(format!(
                "cannot fit on {} rows with {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if config.c <= 0.0 {
            return Err(RiskError::TrainingError("C must be positive".to_string()));
        }

        let width = rows[0].len();
        let n = rows.len() as f64;
        let l2 = 1.0 / (config.c * n);
        let mut weights = vec![0.0; width];
        let mut bias = 0.0;
        let mut iterations = 0;

        for _ in 0..config.max_iter {
            iterations += 1;
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;
            for (row, &label) in rows.iter().zip(labels) {
                let err = sigmoid(dot(&weights, row) + bias) - if label { 1.0 } else { 0.0 };
                for (g, x) in grad_w.iter_mut().zip(row) {
                    *g += err * x;
                }
                grad_b += err;
            }

            let mut max_grad = (grad_b / n).abs();
            for (g, w) in grad_w.iter_mut().zip(&weights) {
                *g = *g / n + l2 * w;
                max_grad = max_grad.max(g.abs());
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= config.learning_rate * g;
            }
            bias -= config.learning_rate * grad_b / n;

            if max_grad < config.tolerance {
                break;
            }
        }

        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            return Err(RiskError::TrainingError("optimisation diverged".to_string()));
        }

        Ok(Self {
            weights,
            bias,
            iterations,
        })
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(dot(&self.weights, row) + self.bias)
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

/// Fitted imputer + scaler + classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    imputer: MedianImputer,
    scaler: StandardScaler,
    classifier: LogisticRegression,
    width: usize,
}

impl Pipeline {
    /// Fit every stage on the given raw rows (NaN marks missing values).
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], config: &LogisticConfig) -> Result<Self> {
        let width = rows
            .first()
            .map(Vec::len)
            .ok_or_else(|| RiskError::TrainingError("no training rows".to_string()))?;
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(RiskError::FeatureMismatch {
                expected: width,
                actual: bad.len(),
            });
        }

        let imputer = MedianImputer::fit(rows, width);
        let mut prepared: Vec<Vec<f64>> = rows.to_vec();
        for row in prepared.iter_mut() {
            imputer.apply(row);
        }
        let scaler = StandardScaler::fit(&prepared, width);
        for row in prepared.iter_mut() {
            scaler.apply(row);
        }
        let classifier = LogisticRegression::fit(&prepared, labels, config)?;

        Ok(Self {
            imputer,
            scaler,
            classifier,
            width,
        })
    }

    /// Probability of the positive (fraud) class for one raw row.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.width {
            return Err(RiskError::FeatureMismatch {
                expected: self.width,
                actual: row.len(),
            });
        }
        let mut prepared = row.to_vec();
        self.imputer.apply(&mut prepared);
        self.scaler.apply(&mut prepared);
        Ok(self.classifier.predict_proba(&prepared))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn classifier(&self) -> &LogisticRegression {
        &self.classifier
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
