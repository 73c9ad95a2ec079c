//! # Data Loading and Validation Module
//!
//! Reads tab-separated survival tables into the `ndarray` structures used by
//! the learner.
//!
//! - Training files need a `time` column (float) and an `event` column
//!   (0 = censored, 1 = event). Every other column except `sample_id` is a
//!   numeric feature, taken in file order.
//! - Prediction files need the feature columns a model was trained on. They
//!   are looked up by name, so column order in the file does not matter, and
//!   `time`/`event` are ignored when present.
//! - `sample_id` is optional. Missing ids are replaced with 1-based row numbers.

use crate::learner::{LearnerError, SurvivalTargets};
use ahash::AHashMap;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::File;
use thiserror::Error;

const TIME_COLUMN: &str = "time";
const EVENT_COLUMN: &str = "event";
const SAMPLE_ID_COLUMN: &str = "sample_id";

/// A validated training table.
#[derive(Debug)]
pub struct TrainingTable {
    /// Shape: [n_samples, feature_names.len()].
    pub features: Array2<f64>,
    pub feature_names: Vec<String>,
    pub targets: SurvivalTargets,
    pub sample_ids: Vec<String>,
}

/// A validated prediction table, with columns in model order.
#[derive(Debug)]
pub struct PredictionTable {
    pub features: Array2<f64>,
    pub sample_ids: Vec<String>,
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "Column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing or null values were found in the column '{0}'.")]
    MissingValuesFound(String),
    #[error("Non-finite values (NaN or infinity) were found in the column '{0}'.")]
    NonFiniteValuesFound(String),
    #[error("Column 'event' must contain only 0 or 1, but row {row} holds {value}.")]
    InvalidEventFlag { row: usize, value: f64 },
    #[error("The reserved column '{0}' appears more than once (column names are matched case-insensitively).")]
    DuplicateReservedColumn(String),
    #[error("The training file has no feature columns besides 'time', 'event' and 'sample_id'.")]
    NoFeatureColumns,
    #[error("The input file contains no data rows.")]
    EmptyTable,
    #[error("Survival targets are invalid: {0}")]
    Targets(#[from] LearnerError),
}

/// Loads a training table, treating every column other than `time`, `event`
/// and `sample_id` as a feature.
pub fn load_training_table(path: &str) -> Result<TrainingTable, DataError> {
    let df = read_tsv(path)?;
    let names = ColumnNames::new(&df)?;

    let time_column = names.resolve(TIME_COLUMN)?;
    let event_column = names.resolve(EVENT_COLUMN)?;
    let time = extract_f64_column(&df, &time_column)?;
    let event = extract_event_column(&df, &event_column)?;

    let feature_names: Vec<String> = names
        .original
        .iter()
        .filter(|name| !names.is_reserved(name))
        .cloned()
        .collect();
    if feature_names.is_empty() {
        return Err(DataError::NoFeatureColumns);
    }
    let features = extract_feature_matrix(&df, &feature_names)?;
    let sample_ids = build_sample_ids(&df, &names)?;

    log::info!(
        "Loaded {} training samples with {} features from {path}",
        df.height(),
        feature_names.len()
    );

    Ok(TrainingTable {
        features,
        feature_names,
        targets: SurvivalTargets::new(time, event)?,
        sample_ids,
    })
}

/// Loads a prediction table, pulling `feature_names` in the given order.
pub fn load_prediction_table(
    path: &str,
    feature_names: &[String],
) -> Result<PredictionTable, DataError> {
    let df = read_tsv(path)?;
    let names = ColumnNames::new(&df)?;
    for name in feature_names {
        if !names.original.contains(name) {
            return Err(DataError::ColumnNotFound(name.clone()));
        }
    }
    let features = extract_feature_matrix(&df, feature_names)?;
    let sample_ids = build_sample_ids(&df, &names)?;

    log::info!(
        "Loaded {} samples for prediction from {path}",
        df.height()
    );

    Ok(PredictionTable {
        features,
        sample_ids,
    })
}

fn read_tsv(path: &str) -> Result<DataFrame, DataError> {
    let file = File::open(path)?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .map_parse_options(|options| options.with_separator(b'\t'))
        .into_reader_with_file_handle(file)
        .finish()?;
    if df.height() == 0 {
        return Err(DataError::EmptyTable);
    }
    Ok(df)
}

/// Header names in file order, with a case-insensitive index for the
/// reserved columns.
struct ColumnNames {
    original: Vec<String>,
    lowercase: AHashMap<String, String>,
}

impl ColumnNames {
    fn new(df: &DataFrame) -> Result<Self, DataError> {
        let original: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.as_str().to_string())
            .collect();
        let mut lowercase = AHashMap::with_capacity(original.len());
        for name in &original {
            let key = name.to_ascii_lowercase();
            let reserved = Self::is_reserved_key(&key);
            if lowercase.insert(key, name.clone()).is_some() && reserved {
                return Err(DataError::DuplicateReservedColumn(name.to_ascii_lowercase()));
            }
        }
        Ok(Self {
            original,
            lowercase,
        })
    }

    fn resolve(&self, key: &str) -> Result<String, DataError> {
        self.lowercase
            .get(key)
            .cloned()
            .ok_or_else(|| DataError::ColumnNotFound(key.to_string()))
    }

    fn is_reserved(&self, name: &str) -> bool {
        Self::is_reserved_key(&name.to_ascii_lowercase())
    }

    fn is_reserved_key(lower: &str) -> bool {
        lower == TIME_COLUMN || lower == EVENT_COLUMN || lower == SAMPLE_ID_COLUMN
    }
}

fn extract_f64_column(df: &DataFrame, name: &str) -> Result<Array1<f64>, DataError> {
    let column = df
        .column(name)
        .map_err(|_| DataError::ColumnNotFound(name.to_string()))?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(name.to_string()));
    }
    let dtype = column.dtype().clone();
    let casted = column
        .cast(&DataType::Float64)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: dtype.to_string(),
        })?;
    let values = casted.f64()?;
    // Strings that fail to parse become nulls during the cast.
    if values.null_count() > 0 {
        return Err(DataError::ColumnWrongType {
            column_name: name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: dtype.to_string(),
        });
    }
    let array = Array1::from_iter(values.into_no_null_iter());
    if array.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(name.to_string()));
    }
    Ok(array)
}

fn extract_event_column(df: &DataFrame, name: &str) -> Result<Array1<bool>, DataError> {
    let column = df
        .column(name)
        .map_err(|_| DataError::ColumnNotFound(name.to_string()))?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(name.to_string()));
    }
    let dtype = column.dtype().clone();
    let wrong_type = || DataError::ColumnWrongType {
        column_name: name.to_string(),
        expected_type: "0 or 1",
        found_type: dtype.to_string(),
    };
    // Float64 keeps fractional flags intact so they can be rejected below.
    let casted = column.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    let values = casted.f64()?;
    if values.null_count() > 0 {
        return Err(wrong_type());
    }
    values
        .into_no_null_iter()
        .enumerate()
        .map(|(row, value)| {
            if value == 0.0 {
                Ok(false)
            } else if value == 1.0 {
                Ok(true)
            } else {
                Err(DataError::InvalidEventFlag { row, value })
            }
        })
        .collect()
}

fn extract_feature_matrix(df: &DataFrame, names: &[String]) -> Result<Array2<f64>, DataError> {
    let columns = names
        .iter()
        .map(|name| extract_f64_column(df, name))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Array2::from_shape_fn((df.height(), names.len()), |(i, j)| {
        columns[j][i]
    }))
}

fn build_sample_ids(df: &DataFrame, names: &ColumnNames) -> Result<Vec<String>, DataError> {
    let n = df.height();
    let Ok(actual) = names.resolve(SAMPLE_ID_COLUMN) else {
        return Ok((1..=n).map(|i| i.to_string()).collect());
    };
    let casted = df.column(&actual)?.cast(&DataType::String)?;
    let ids = casted.str()?;
    Ok(ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| match id {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => (i + 1).to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_tsv(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.tsv");
        fs::write(&path, contents).unwrap();
        let path = path.to_str().unwrap().to_string();
        (dir, path)
    }

    #[test]
    fn training_table_splits_targets_and_features() {
        let (dir, path) = write_tsv(
            "sample_id\tTime\tage\tEvent\tdose\n\
             a\t5.0\t61\t1\t0.5\n\
             \t7.5\t54\t0\t1.5\n\
             c\t2.0\t70\t1.0\t0.0\n",
        );
        let table = load_training_table(&path).unwrap();
        assert_eq!(table.feature_names, vec!["age", "dose"]);
        assert_eq!(
            table.features,
            ndarray::array![[61.0, 0.5], [54.0, 1.5], [70.0, 0.0]]
        );
        assert_eq!(table.targets.time(), ndarray::array![5.0, 7.5, 2.0]);
        assert_eq!(table.targets.event(), ndarray::array![true, false, true]);
        // the empty id falls back to its 1-based row number
        assert_eq!(table.sample_ids, vec!["a", "2", "c"]);
        drop(dir);
    }

    #[test]
    fn prediction_table_follows_model_column_order() {
        let (dir, path) = write_tsv("dose\tage\n0.5\t61\n1.5\t54\n");
        let names = vec!["age".to_string(), "dose".to_string()];
        let table = load_prediction_table(&path, &names).unwrap();
        assert_eq!(table.features, ndarray::array![[61.0, 0.5], [54.0, 1.5]]);
        assert_eq!(table.sample_ids, vec!["1", "2"]);
        drop(dir);
    }

    #[test]
    fn missing_columns_are_reported() {
        let (dir, path) = write_tsv("time\tage\n1.0\t3.0\n");
        assert!(matches!(
            load_training_table(&path),
            Err(DataError::ColumnNotFound(name)) if name == "event"
        ));
        let names = vec!["dose".to_string()];
        assert!(matches!(
            load_prediction_table(&path, &names),
            Err(DataError::ColumnNotFound(name)) if name == "dose"
        ));
        drop(dir);
    }

    #[test]
    fn event_flags_must_be_binary() {
        let (dir, path) = write_tsv("time\tevent\tage\n1.0\t2\t3.0\n");
        assert!(matches!(
            load_training_table(&path),
            Err(DataError::InvalidEventFlag { row: 0, value }) if value == 2.0
        ));
        drop(dir);

        let (dir, path) = write_tsv("time\tevent\tage\n1.0\t1\t3.0\n2.0\t0.5\t4.0\n");
        assert!(matches!(
            load_training_table(&path),
            Err(DataError::InvalidEventFlag { row: 1, value }) if value == 0.5
        ));
        drop(dir);
    }

    #[test]
    fn duplicate_reserved_columns_are_rejected() {
        let (dir, path) = write_tsv("Time\ttime\tevent\tage\n1.0\t2.0\t1\t3.0\n");
        assert!(matches!(
            load_training_table(&path),
            Err(DataError::DuplicateReservedColumn(name)) if name == "time"
        ));
        drop(dir);
    }

    #[test]
    fn table_without_features_is_rejected() {
        let (dir, path) = write_tsv("time\tevent\n1.0\t1\n");
        assert!(matches!(
            load_training_table(&path),
            Err(DataError::NoFeatureColumns)
        ));
        drop(dir);
    }

    #[test]
    fn negative_times_are_rejected() {
        let (dir, path) = write_tsv("time\tevent\tage\n-1.0\t1\t3.0\n");
        assert!(matches!(
            load_training_table(&path),
            Err(DataError::Targets(LearnerError::InvalidTime(_)))
        ));
        drop(dir);
    }

    #[test]
    fn header_only_file_is_empty() {
        let (dir, path) = write_tsv("time\tevent\tage\n");
        assert!(matches!(
            load_training_table(&path),
            Err(DataError::EmptyTable)
        ));
        drop(dir);
    }
}
