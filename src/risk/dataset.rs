//! Tabular dataset loading
//!
//! Reads a headed CSV file into typed columns. Column types come from arrow's
//! CSV schema inference: integer, float, boolean and all-empty columns are
//! numeric, everything else is categorical text. Empty cells are missing
//! values in both cases.

use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Float64Type};
use tracing::debug;

use super::errors::{Result, RiskError};

const BATCH_SIZE: usize = 1024;

/// Values of a single column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Categorical(values),
        }
    }
}

/// Column-major table with equal-length columns
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Build a table, checking that every column has the same length.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if columns.is_empty() {
            return Err(RiskError::DatasetUnavailable("dataset has no columns".to_string()));
        }
        let rows = columns[0].values.len();
        if let Some(bad) = columns.iter().find(|c| c.values.len() != rows) {
            return Err(RiskError::DatasetUnavailable(format!(
                "column '{}' has {} rows, expected {}",
                bad.name,
                bad.values.len(),
                rows
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }
}

/// Read a CSV file with a header row.
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut file = File::open(path).map_err(|e| {
        RiskError::DatasetUnavailable(format!("cannot open {}: {}", path.display(), e))
    })?;

    let format = Format::default().with_header(true);
    let (schema, _) = format.infer_schema(&mut file, None)?;
    if schema.fields().is_empty() {
        return Err(RiskError::DatasetUnavailable(format!(
            "{} has no header columns",
            path.display()
        )));
    }
    file.rewind()
        .map_err(|e| RiskError::DatasetUnavailable(e.to_string()))?;

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(BATCH_SIZE)
        .build(file)?;

    let mut columns: Vec<Column> = schema
        .fields()
        .iter()
        .map(|field| {
            if is_numeric_type(field.data_type()) {
                Column::numeric(field.name().clone(), Vec::new())
            } else {
                Column::categorical(field.name().clone(), Vec::new())
            }
        })
        .collect();

    for batch in reader {
        let batch = batch?;
        for (idx, column) in columns.iter_mut().enumerate() {
            let array = batch.column(idx);
            match &mut column.values {
                ColumnValues::Numeric(values) => {
                    let floats = cast(array, &DataType::Float64)?;
                    values.extend(floats.as_primitive::<Float64Type>().iter());
                }
                ColumnValues::Categorical(values) => {
                    let strings = cast(array, &DataType::Utf8)?;
                    values.extend(
                        strings
                            .as_string::<i32>()
                            .iter()
                            .map(|v| v.filter(|s| !s.is_empty()).map(str::to_string)),
                    );
                }
            }
        }
    }

    let table = Table::new(columns)?;
    debug!(
        "Loaded dataset {}: {} rows, columns={:?}",
        path.display(),
        table.row_count(),
        table.column_names()
    );
    Ok(table)
}

fn is_numeric_type(data_type: &DataType) -> bool {
    data_type.is_numeric() || matches!(data_type, DataType::Boolean | DataType::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_mixed_columns() {
        let file = write_csv("amount,region,is_fraud\n100.5,north,0\n,south,1\n300,east,0\n");
        let table = read_csv(file.path()).unwrap();

        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column_names(), vec!["amount", "region", "is_fraud"]);
        assert_eq!(
            table.columns()[0].values,
            ColumnValues::Numeric(vec![Some(100.5), None, Some(300.0)])
        );
        assert_eq!(
            table.columns()[1].values,
            ColumnValues::Categorical(vec![
                Some("north".to_string()),
                Some("south".to_string()),
                Some("east".to_string())
            ])
        );
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = read_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, RiskError::DatasetUnavailable(_)));
    }

    #[test]
    fn test_ragged_table_rejected() {
        let err = Table::new(vec![
            Column::numeric("a", vec![Some(1.0)]),
            Column::numeric("b", vec![Some(1.0), Some(2.0)]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("column 'b'"));
    }
}
