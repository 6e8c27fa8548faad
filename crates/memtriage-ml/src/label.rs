//! The deterministic labeling rule
//!
//! Maps a feature vector to a maintenance action. The same rule, with
//! the same constants and boolean structure, is emitted by the codegen
//! crate as the hardware safety override; keep the two in lockstep.
//!
//! Rule order matters and the first match wins:
//!
//! 1. row hammered (`max_row_hits >= 64`) or errors densely packed in
//!    few rows (`unique_rows * 5 < total_errors`) -> SCRUB
//! 2. high error rate across many columns -> REFRESH
//! 3. otherwise NO_ACTION

use serde::{Deserialize, Serialize};

use crate::features::{FeatureVector, RateForm};

/// Number of action classes
pub const NUM_CLASSES: usize = 3;

/// Row-hammer hit threshold for the SCRUB rule
pub const SCRUB_ROW_HITS_MIN: u32 = 64;

/// Integer-safe density factor: `unique_rows * 5 < total_errors` is
/// exactly `unique_rows / total_errors < 0.2` for all positive totals
pub const SCRUB_DENSITY_FACTOR: u32 = 5;

/// Refresh rate threshold paired with the scaled-integer rate form
pub const REFRESH_RATE_MIN_SCALED: u32 = 50;

/// Refresh rate threshold paired with the raw-ratio rate form
pub const REFRESH_RATE_MIN_RATIO: f64 = 0.05;

/// Column-spread threshold for the REFRESH rule
pub const REFRESH_COLS_MIN: u32 = 8;

/// Maintenance action for one error group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    NoAction,
    Scrub,
    Refresh,
}

impl Action {
    /// Class index, also the 2-bit encoding in generated hardware
    pub fn to_index(self) -> usize {
        match self {
            Self::NoAction => 0,
            Self::Scrub => 1,
            Self::Refresh => 2,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index {
            1 => Self::Scrub,
            2 => Self::Refresh,
            _ => Self::NoAction,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NoAction => "NO_ACTION",
            Self::Scrub => "SCRUB",
            Self::Refresh => "REFRESH",
        }
    }
}

/// The integer-safe rule over named feature inputs
///
/// This is the exact decision network the codegen crate emits as the
/// hardware override: same thresholds, same comparison order. The rate
/// must be in the scaled-integer form.
pub fn hard_rule(
    total_errors: u32,
    unique_rows: u32,
    unique_cols: u32,
    max_row_hits: u32,
    error_rate_int: u64,
) -> Action {
    if max_row_hits >= SCRUB_ROW_HITS_MIN
        || (unique_rows as u64 * SCRUB_DENSITY_FACTOR as u64) < total_errors as u64
    {
        Action::Scrub
    } else if error_rate_int >= REFRESH_RATE_MIN_SCALED as u64 && unique_cols >= REFRESH_COLS_MIN {
        Action::Refresh
    } else {
        Action::NoAction
    }
}

/// Label a feature vector
///
/// Total and deterministic for every vector with `total_errors >= 1`.
/// The rate form must match the form the vector was extracted with:
/// scaled-integer pairs with threshold 50, raw ratio with 0.05.
pub fn label(features: &FeatureVector, form: RateForm) -> Action {
    match form {
        RateForm::ScaledInt => hard_rule(
            features.total_errors,
            features.unique_rows,
            features.unique_cols,
            features.max_row_hits,
            features.error_rate_metric as u64,
        ),
        RateForm::Ratio => {
            if features.max_row_hits >= SCRUB_ROW_HITS_MIN
                || (features.unique_rows as u64 * SCRUB_DENSITY_FACTOR as u64)
                    < features.total_errors as u64
            {
                Action::Scrub
            } else if features.error_rate_metric >= REFRESH_RATE_MIN_RATIO
                && features.unique_cols >= REFRESH_COLS_MIN
            {
                Action::Refresh
            } else {
                Action::NoAction
            }
        }
    }
}
