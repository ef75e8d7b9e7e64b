//! Feature schema and encoding
//!
//! The schema is fixed when a model is trained and travels with it. Inference
//! never re-derives columns from the request: it builds a vector over the
//! trained schema and fills only the amount slot.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::dataset::{ColumnValues, Table};
use super::errors::{Result, RiskError};

/// Label column candidates, highest priority first (case-insensitive)
pub const LABEL_PRIORITY: [&str; 5] = ["is_fraud", "fraud", "class", "label", "target"];

/// Schema names that can carry the requested amount, first match wins
pub const AMOUNT_ALIASES: [&str; 5] = ["amount", "transaction_amount", "amt", "TransactionAmt", "Amount"];

/// Bumped whenever the encoding rules below change
pub const SCHEMA_VERSION: u32 = 1;

/// Pick the label column.
///
/// Heuristic, not a contract with whoever produced the data: the first entry
/// of [`LABEL_PRIORITY`] matching a column name wins, otherwise the last
/// column is used. Returns `None` only for an empty header.
pub fn infer_label_column(names: &[&str]) -> Option<usize> {
    LABEL_PRIORITY
        .iter()
        .find_map(|candidate| {
            names
                .iter()
                .position(|name| name.eq_ignore_ascii_case(candidate))
        })
        .or_else(|| names.len().checked_sub(1))
}

/// Ordered, distinct feature names fixed at training time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    version: u32,
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(names.len());
        if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(RiskError::TrainingError(format!(
                "duplicate feature name '{}'",
                dup
            )));
        }
        Ok(Self {
            version: SCHEMA_VERSION,
            names,
        })
    }

    /// Schema reported when no model is available
    pub fn empty() -> Self {
        Self {
            version: SCHEMA_VERSION,
            names: Vec::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Content hash over version and ordered names
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version.to_le_bytes());
        for name in &self.names {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Index of the slot that receives the requested amount
    pub fn amount_slot(&self) -> Option<usize> {
        AMOUNT_ALIASES
            .iter()
            .find_map(|alias| self.names.iter().position(|n| n == alias))
    }

    /// Zero vector over the schema with only the amount slot set.
    ///
    /// With no amount alias in the schema the result is all zeros.
    pub fn align_amount(&self, amount: f64) -> Vec<f64> {
        let mut row = vec![0.0; self.names.len()];
        if let Some(slot) = self.amount_slot() {
            row[slot] = amount;
        }
        row
    }
}

#[derive(Debug, Clone)]
enum EncodedColumn {
    Numeric { source: usize },
    /// Levels kept after dropping the first sorted level
    OneHot { source: usize, levels: Vec<String> },
}

/// Turns the non-label columns of a table into a numeric matrix
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    columns: Vec<EncodedColumn>,
    schema: FeatureSchema,
}

impl FeatureEncoder {
    /// Learn the encoding: numeric columns first in file order, then the
    /// drop-first one-hot expansion of each categorical column.
    pub fn fit(table: &Table, label_idx: usize) -> Result<Self> {
        let mut numeric = Vec::new();
        let mut one_hot = Vec::new();
        let mut names = Vec::new();
        let mut dummy_names = Vec::new();

        for (idx, column) in table.columns().iter().enumerate() {
            if idx == label_idx {
                continue;
            }
            match &column.values {
                ColumnValues::Numeric(_) => {
                    numeric.push(EncodedColumn::Numeric { source: idx });
                    names.push(column.name.clone());
                }
                ColumnValues::Categorical(values) => {
                    let distinct: BTreeSet<&str> =
                        values.iter().flatten().map(String::as_str).collect();
                    let levels: Vec<String> =
                        distinct.into_iter().skip(1).map(str::to_string).collect();
                    dummy_names.extend(levels.iter().map(|l| format!("{}_{}", column.name, l)));
                    one_hot.push(EncodedColumn::OneHot { source: idx, levels });
                }
            }
        }

        names.extend(dummy_names);
        if names.is_empty() {
            return Err(RiskError::TrainingError(
                "no feature columns besides the label".to_string(),
            ));
        }

        numeric.extend(one_hot);
        Ok(Self {
            columns: numeric,
            schema: FeatureSchema::new(names)?,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Row-major matrix; missing numeric values become NaN, a missing
    /// categorical value encodes as all zeros.
    pub fn transform(&self, table: &Table) -> Vec<Vec<f64>> {
        let mut rows = vec![Vec::with_capacity(self.schema.len()); table.row_count()];
        for encoded in &self.columns {
            match encoded {
                EncodedColumn::Numeric { source } => {
                    if let ColumnValues::Numeric(values) = &table.columns()[*source].values {
                        for (row, value) in rows.iter_mut().zip(values) {
                            row.push(value.unwrap_or(f64::NAN));
                        }
                    }
                }
                EncodedColumn::OneHot { source, levels } => {
                    if let ColumnValues::Categorical(values) = &table.columns()[*source].values {
                        for (row, value) in rows.iter_mut().zip(values) {
                            row.extend(levels.iter().map(|level| {
                                if value.as_deref() == Some(level.as_str()) {
                                    1.0
                                } else {
                                    0.0
                                }
                            }));
                        }
                    }
                }
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::dataset::Column;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(&["amt", "is_fraud", "region"], 1 ; "priority match")]
    #[test_case(&["amt", "region", "outcome"], 2 ; "falls back to last column")]
    #[test_case(&["Class", "amount"], 0 ; "case insensitive")]
    #[test_case(&["target", "fraud"], 1 ; "priority order beats column order")]
    fn test_infer_label_column(names: &[&str], expected: usize) {
        assert_eq!(infer_label_column(names), Some(expected));
    }

    #[test]
    fn test_infer_label_column_empty() {
        assert_eq!(infer_label_column(&[]), None);
    }

    #[test]
    fn test_align_amount_sets_single_slot() {
        let schema = FeatureSchema::new(vec![
            "biometric_verified".to_string(),
            "amount".to_string(),
            "foreign".to_string(),
        ])
        .unwrap();
        assert_eq!(schema.align_amount(1234.0), vec![0.0, 1234.0, 0.0]);
    }

    #[test]
    fn test_align_amount_without_alias_is_all_zero() {
        let schema = FeatureSchema::new(vec!["foo".to_string(), "bar".to_string()]).unwrap();
        assert_eq!(schema.amount_slot(), None);
        assert_eq!(schema.align_amount(99.0), vec![0.0, 0.0]);
    }

    #[test]
    fn test_amount_alias_priority() {
        let schema = FeatureSchema::new(vec!["Amount".to_string(), "amt".to_string()]).unwrap();
        assert_eq!(schema.amount_slot(), Some(1));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        assert!(FeatureSchema::new(vec!["a".to_string(), "a".to_string()]).is_err());
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = FeatureSchema::new(vec!["x".to_string(), "y".to_string()]).unwrap();
        let b = FeatureSchema::new(vec!["y".to_string(), "x".to_string()]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn test_encoder_one_hot_drop_first() {
        let table = Table::new(vec![
            Column::categorical(
                "region",
                vec![
                    Some("south".to_string()),
                    Some("east".to_string()),
                    None,
                    Some("north".to_string()),
                ],
            ),
            Column::numeric("amount", vec![Some(10.0), None, Some(30.0), Some(40.0)]),
            Column::numeric("is_fraud", vec![Some(0.0), Some(1.0), Some(0.0), Some(1.0)]),
        ])
        .unwrap();

        let encoder = FeatureEncoder::fit(&table, 2).unwrap();
        assert_eq!(
            encoder.schema().names(),
            &["amount".to_string(), "region_north".to_string(), "region_south".to_string()]
        );

        let rows = encoder.transform(&table);
        assert_eq!(rows[0], vec![10.0, 0.0, 1.0]);
        assert_eq!(rows[2], vec![30.0, 0.0, 0.0]);
        assert_eq!(rows[3], vec![40.0, 1.0, 0.0]);
        assert!(rows[1][0].is_nan());
        assert_eq!(&rows[1][1..], &[0.0, 0.0]);
    }

    #[test]
    fn test_encoder_requires_features() {
        let table = Table::new(vec![Column::numeric("label", vec![Some(1.0)])]).unwrap();
        assert!(matches!(
            FeatureEncoder::fit(&table, 0),
            Err(RiskError::TrainingError(_))
        ));
    }
}
