//! Feature extraction for error groups
//!
//! Each group collapses to a fixed vector of nine small-count
//! features. The error-rate feature has two forms: a scaled integer
//! (errors per 1000 time units) for the hardware-targeted pipeline,
//! and a raw ratio for the float pipeline. The two forms pair with
//! different refresh thresholds and must never be mixed within one
//! pipeline instance.

use memtriage_data::{DataError, ErrorGroup, ErrorType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::label::{label, Action};

/// Number of features in the fixed-size vector
pub const NUM_FEATURES: usize = 9;

/// Feature names in vector order; also the port names of the generated
/// hardware module
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "total_errors",
    "read_errors",
    "write_errors",
    "scrub_errors",
    "unique_rows",
    "unique_cols",
    "max_row_hits",
    "max_col_hits",
    "error_rate_int",
];

/// Form of the error-rate feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateForm {
    /// `floor(total_errors / time_span * 1000)` — integer-valued, used
    /// by the hardware path so the generated logic needs no division
    ScaledInt,
    /// `total_errors / time_span` — raw ratio, float/training-only path
    Ratio,
}

/// Features extracted from one error group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Group size
    pub total_errors: u32,
    /// Records with error_type read (code 1)
    pub read_errors: u32,
    /// Records with error_type write (code 3)
    pub write_errors: u32,
    /// Records with error_type scrub (code 2)
    pub scrub_errors: u32,
    /// Distinct row addresses in the group
    pub unique_rows: u32,
    /// Distinct column addresses in the group
    pub unique_cols: u32,
    /// Largest per-row occurrence count
    pub max_row_hits: u32,
    /// Largest per-column occurrence count
    pub max_col_hits: u32,
    /// Error rate in the form chosen for this pipeline instance; under
    /// `RateForm::ScaledInt` this always holds an exact integer value
    pub error_rate_metric: f64,
}

impl FeatureVector {
    /// Flatten to the training representation, in `FEATURE_NAMES` order
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [
            self.total_errors as f64,
            self.read_errors as f64,
            self.write_errors as f64,
            self.scrub_errors as f64,
            self.unique_rows as f64,
            self.unique_cols as f64,
            self.max_row_hits as f64,
            self.max_col_hits as f64,
            self.error_rate_metric,
        ]
    }
}

/// Extract the feature vector for one error group
///
/// The group must be non-empty; grouping never produces an empty group,
/// so hitting `DataError::EmptyGroup` here indicates a caller bug.
pub fn extract_features(group: &ErrorGroup, form: RateForm) -> Result<FeatureVector, DataError> {
    if group.records.is_empty() {
        return Err(DataError::EmptyGroup);
    }

    let total_errors = group.records.len() as u32;
    let mut read_errors = 0;
    let mut write_errors = 0;
    let mut scrub_errors = 0;
    let mut row_hits: HashMap<u32, u32> = HashMap::new();
    let mut col_hits: HashMap<u32, u32> = HashMap::new();
    let mut min_time = u64::MAX;
    let mut max_time = 0u64;

    for record in &group.records {
        match record.error_type {
            ErrorType::Read => read_errors += 1,
            ErrorType::Scrub => scrub_errors += 1,
            ErrorType::Write => write_errors += 1,
        }
        *row_hits.entry(record.row).or_insert(0) += 1;
        *col_hits.entry(record.col).or_insert(0) += 1;
        min_time = min_time.min(record.time_idx);
        max_time = max_time.max(record.time_idx);
    }

    // Always >= 1, so the rate is defined for every valid group.
    let time_span = max_time - min_time + 1;
    let error_rate_metric = match form {
        RateForm::ScaledInt => (total_errors as f64 / time_span as f64 * 1000.0).floor(),
        RateForm::Ratio => total_errors as f64 / time_span as f64,
    };

    Ok(FeatureVector {
        total_errors,
        read_errors,
        write_errors,
        scrub_errors,
        unique_rows: row_hits.len() as u32,
        unique_cols: col_hits.len() as u32,
        max_row_hits: row_hits.values().copied().max().unwrap_or(0),
        max_col_hits: col_hits.values().copied().max().unwrap_or(0),
        error_rate_metric,
    })
}

/// Extract and label every group, producing the training dataset
pub fn build_dataset(
    groups: &[ErrorGroup],
    form: RateForm,
) -> Result<(Vec<FeatureVector>, Vec<Action>), DataError> {
    let mut features = Vec::with_capacity(groups.len());
    let mut labels = Vec::with_capacity(groups.len());
    for group in groups {
        let fv = extract_features(group, form)?;
        labels.push(label(&fv, form));
        features.push(fv);
    }
    Ok((features, labels))
}
