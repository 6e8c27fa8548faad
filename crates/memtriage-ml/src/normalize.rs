//! Normalization constants for the float-feature pipeline
//!
//! The float pipeline rescales features to [0, 1] before training.
//! The per-feature min/max vectors are persisted alongside the model
//! so new feature vectors can be rescaled the same way at inference
//! time. The scaled-integer hardware pipeline never normalizes.

use crate::TrainResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Guard against zero-range features
const RANGE_EPS: f64 = 1e-6;

/// Per-feature min/max rescaling constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl Normalization {
    /// Fit min/max over a dataset of feature rows
    pub fn fit(samples: &[Vec<f64>]) -> Option<Self> {
        let first = samples.first()?;
        let mut min = first.clone();
        let mut max = first.clone();
        for row in &samples[1..] {
            for (i, &v) in row.iter().enumerate() {
                min[i] = min[i].min(v);
                max[i] = max[i].max(v);
            }
        }
        Some(Self { min, max })
    }

    /// Rescale one feature row: `(x - min) / (max - min + eps)`
    pub fn rescale(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(i, &v)| (v - self.min[i]) / (self.max[i] - self.min[i] + RANGE_EPS))
            .collect()
    }

    /// Persist the constants as JSON next to the model artifact
    pub fn save(&self, path: &Path) -> TrainResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> TrainResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_min_max() {
        let samples = vec![vec![1.0, 10.0], vec![3.0, 0.0], vec![2.0, 5.0]];
        let norm = Normalization::fit(&samples).unwrap();
        assert_eq!(norm.min, vec![1.0, 0.0]);
        assert_eq!(norm.max, vec![3.0, 10.0]);
    }

    #[test]
    fn test_rescale_range() {
        let norm = Normalization {
            min: vec![0.0, 100.0],
            max: vec![10.0, 200.0],
        };
        let scaled = norm.rescale(&[5.0, 150.0]);
        assert!((scaled[0] - 0.5).abs() < 1e-6);
        assert!((scaled[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_range_is_finite() {
        let norm = Normalization {
            min: vec![7.0],
            max: vec![7.0],
        };
        let scaled = norm.rescale(&[7.0]);
        assert!(scaled[0].is_finite());
        assert_eq!(scaled[0], 0.0);
    }

    #[test]
    fn test_empty_dataset() {
        assert!(Normalization::fit(&[]).is_none());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let norm = Normalization {
            min: vec![0.0, 1.0],
            max: vec![9.0, 8.0],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("norm.json");

        norm.save(&path).unwrap();
        assert_eq!(Normalization::load(&path).unwrap(), norm);
    }
}
