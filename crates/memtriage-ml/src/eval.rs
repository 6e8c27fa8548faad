//! Train/test split and evaluation
//!
//! Accuracy reporting is glue around the trained ensemble, but the
//! per-class breakdown matters for this dataset: NO_ACTION dominates
//! and a high overall accuracy can hide a REFRESH recall of zero.

use crate::forest::RandomForest;
use crate::label::{Action, NUM_CLASSES};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dataset halves produced by [`train_test_split`]
pub struct Split {
    pub train_x: Vec<Vec<f64>>,
    pub train_y: Vec<Action>,
    pub test_x: Vec<Vec<f64>>,
    pub test_y: Vec<Action>,
}

/// Shuffle and split the dataset, reserving `test_fraction` for
/// evaluation. The split is seeded for reproducible runs.
pub fn train_test_split(
    samples: &[Vec<f64>],
    labels: &[Action],
    test_fraction: f64,
    seed: u64,
) -> Split {
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let test_len = ((samples.len() as f64) * test_fraction).round() as usize;
    let (test_idx, train_idx) = order.split_at(test_len.min(samples.len()));

    let take = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<Action>) {
        (
            idx.iter().map(|&i| samples[i].clone()).collect(),
            idx.iter().map(|&i| labels[i]).collect(),
        )
    };
    let (test_x, test_y) = take(test_idx);
    let (train_x, train_y) = take(train_idx);

    Split {
        train_x,
        train_y,
        test_x,
        test_y,
    }
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of true instances of this class in the test set
    pub support: usize,
}

/// Evaluation summary over a held-out test set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub accuracy: f64,
    pub per_class: [ClassMetrics; NUM_CLASSES],
    pub total: usize,
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "accuracy: {:.4} ({} samples)", self.accuracy, self.total)?;
        writeln!(
            f,
            "{:<10} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1", "support"
        )?;
        for (i, m) in self.per_class.iter().enumerate() {
            writeln!(
                f,
                "{:<10} {:>9.4} {:>9.4} {:>9.4} {:>9}",
                Action::from_index(i).name(),
                m.precision,
                m.recall,
                m.f1,
                m.support
            )?;
        }
        Ok(())
    }
}

/// Evaluate a trained ensemble on a held-out test set
pub fn evaluate(forest: &RandomForest, test_x: &[Vec<f64>], test_y: &[Action]) -> EvalReport {
    // confusion[truth][predicted]
    let mut confusion = [[0usize; NUM_CLASSES]; NUM_CLASSES];
    for (x, &truth) in test_x.iter().zip(test_y) {
        let predicted = forest.predict(x);
        confusion[truth.to_index()][predicted.to_index()] += 1;
    }

    let total: usize = test_y.len();
    let correct: usize = (0..NUM_CLASSES).map(|c| confusion[c][c]).sum();

    let mut per_class: [ClassMetrics; NUM_CLASSES] = Default::default();
    for c in 0..NUM_CLASSES {
        let support: usize = confusion[c].iter().sum();
        let predicted_as: usize = (0..NUM_CLASSES).map(|t| confusion[t][c]).sum();
        let tp = confusion[c][c];

        let precision = if predicted_as > 0 {
            tp as f64 / predicted_as as f64
        } else {
            0.0
        };
        let recall = if support > 0 { tp as f64 / support as f64 } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        per_class[c] = ClassMetrics {
            precision,
            recall,
            f1,
            support,
        };
    }

    EvalReport {
        accuracy: if total > 0 { correct as f64 / total as f64 } else { 0.0 },
        per_class,
        total,
    }
}
