//! Decision tree ensemble
//!
//! A small CART implementation: gini-split trees over bootstrap
//! samples with optional balanced class weights and per-split feature
//! subsampling. Trees are stored as index-based arenas so the codegen
//! crate can walk them without pointer chasing; leaves keep their
//! weighted class counts so the emitted vote is the argmax of the
//! training-time distribution.

use crate::features::FeatureVector;
use crate::label::{hard_rule, Action, NUM_CLASSES};
use crate::{TrainError, TrainResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// One node in a tree arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Internal split: left subtree when `feature <= threshold`
    Internal {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Leaf with the weighted class distribution seen during training
    Leaf { class_counts: [f64; NUM_CLASSES] },
}

/// An immutable trained decision tree, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
    pub root: usize,
}

/// Index of the winning class in a leaf distribution (ties go to the
/// lowest index, matching the emitted hardware vote)
pub fn argmax_class(class_counts: &[f64; NUM_CLASSES]) -> usize {
    let mut best = 0;
    for (i, &count) in class_counts.iter().enumerate() {
        if count > class_counts[best] {
            best = i;
        }
    }
    best
}

impl DecisionTree {
    /// Predict the action for one feature row
    pub fn predict(&self, x: &[f64]) -> Action {
        let mut node = self.root;
        loop {
            match &self.nodes[node] {
                TreeNode::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { class_counts } => {
                    return Action::from_index(argmax_class(class_counts))
                }
            }
        }
    }
}

/// Training configuration for the ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of independently trained trees
    pub num_trees: usize,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples required to attempt a split
    pub min_samples_split: usize,
    /// Weight samples inversely to class frequency
    pub balanced_weights: bool,
    /// Features considered per split; `None` means `sqrt(n_features)`
    pub feature_subsample: Option<usize>,
    /// RNG seed for bootstrap and feature sampling
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: 5,
            max_depth: 6,
            min_samples_split: 2,
            balanced_weights: true,
            feature_subsample: None,
            seed: 42,
        }
    }
}

/// A majority-vote ensemble of decision trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit an ensemble on labeled feature rows
    ///
    /// Each tree trains on its own bootstrap sample; splits consider a
    /// random feature subset and minimize weighted gini impurity.
    pub fn fit(samples: &[Vec<f64>], labels: &[Action], config: &ForestConfig) -> TrainResult<Self> {
        if samples.is_empty() || samples.len() != labels.len() || config.num_trees == 0 {
            return Err(TrainError::EmptyDataset);
        }

        let n = samples.len();
        let n_features = samples[0].len();
        let class_idx: Vec<usize> = labels.iter().map(|a| a.to_index()).collect();
        let weights = if config.balanced_weights {
            balanced_weights(&class_idx)
        } else {
            vec![1.0; n]
        };
        let subsample = config
            .feature_subsample
            .unwrap_or_else(|| ((n_features as f64).sqrt().floor() as usize).max(1))
            .min(n_features);

        let ctx = BuildCtx {
            samples,
            class_idx: &class_idx,
            weights: &weights,
            n_features,
            subsample,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split.max(2),
        };

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut trees = Vec::with_capacity(config.num_trees);
        for t in 0..config.num_trees {
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let mut nodes = Vec::new();
            let root = build_node(&ctx, &bootstrap, 0, &mut nodes, &mut rng);
            debug!("tree {} trained with {} nodes", t, nodes.len());
            trees.push(DecisionTree { nodes, root });
        }

        Ok(Self { trees })
    }

    /// Per-class vote tally across all trees
    pub fn votes(&self, x: &[f64]) -> [u32; NUM_CLASSES] {
        let mut counts = [0u32; NUM_CLASSES];
        for tree in &self.trees {
            counts[tree.predict(x).to_index()] += 1;
        }
        counts
    }

    /// Ensemble prediction by plurality with the fixed tie-break order
    pub fn predict(&self, x: &[f64]) -> Action {
        majority_action(&self.votes(x))
    }

    /// Persist the trained ensemble as JSON
    pub fn save(&self, path: &Path) -> TrainResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a previously saved ensemble
    pub fn load(path: &Path) -> TrainResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Resolve a vote tally with the documented tie-break priority:
/// SCRUB beats REFRESH beats NO_ACTION. This mirrors the generated
/// majority-voter logic exactly.
pub fn majority_action(counts: &[u32; NUM_CLASSES]) -> Action {
    if counts[1] >= counts[0] && counts[1] >= counts[2] {
        Action::Scrub
    } else if counts[2] >= counts[0] && counts[2] >= counts[1] {
        Action::Refresh
    } else {
        Action::NoAction
    }
}

/// Full decision: the hard rule overrides the learned vote whenever it
/// fires, so a misclassification cannot suppress a known-necessary
/// action. The feature vector must be in the scaled-integer rate form.
pub fn predict_with_override(forest: &RandomForest, features: &FeatureVector) -> Action {
    let hard = hard_rule(
        features.total_errors,
        features.unique_rows,
        features.unique_cols,
        features.max_row_hits,
        features.error_rate_metric as u64,
    );
    if hard != Action::NoAction {
        hard
    } else {
        forest.predict(&features.to_array())
    }
}

fn balanced_weights(class_idx: &[usize]) -> Vec<f64> {
    let mut counts = [0usize; NUM_CLASSES];
    for &c in class_idx {
        counts[c] += 1;
    }
    let n = class_idx.len() as f64;
    let per_class: Vec<f64> = counts
        .iter()
        .map(|&c| if c > 0 { n / (NUM_CLASSES as f64 * c as f64) } else { 0.0 })
        .collect();
    class_idx.iter().map(|&c| per_class[c]).collect()
}

struct BuildCtx<'a> {
    samples: &'a [Vec<f64>],
    class_idx: &'a [usize],
    weights: &'a [f64],
    n_features: usize,
    subsample: usize,
    max_depth: usize,
    min_samples_split: usize,
}

fn weighted_counts(ctx: &BuildCtx, indices: &[usize]) -> [f64; NUM_CLASSES] {
    let mut counts = [0.0; NUM_CLASSES];
    for &i in indices {
        counts[ctx.class_idx[i]] += ctx.weights[i];
    }
    counts
}

fn gini(counts: &[f64; NUM_CLASSES]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let mut impurity = 1.0;
    for &c in counts {
        let p = c / total;
        impurity -= p * p;
    }
    impurity
}

struct Split {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

/// Build one node and its subtrees, returning the node's arena index.
/// The first call for a tree lands the root at index 0.
fn build_node(
    ctx: &BuildCtx,
    indices: &[usize],
    depth: usize,
    nodes: &mut Vec<TreeNode>,
    rng: &mut StdRng,
) -> usize {
    let counts = weighted_counts(ctx, indices);
    let idx = nodes.len();
    nodes.push(TreeNode::Leaf {
        class_counts: counts,
    });

    if depth >= ctx.max_depth || indices.len() < ctx.min_samples_split || gini(&counts) <= 0.0 {
        return idx;
    }

    let Some(split) = best_split(ctx, indices, &counts, rng) else {
        return idx;
    };

    let (left_set, right_set): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| ctx.samples[i][split.feature] <= split.threshold);
    if left_set.is_empty() || right_set.is_empty() {
        return idx;
    }

    let left = build_node(ctx, &left_set, depth + 1, nodes, rng);
    let right = build_node(ctx, &right_set, depth + 1, nodes, rng);
    nodes[idx] = TreeNode::Internal {
        feature: split.feature,
        threshold: split.threshold,
        left,
        right,
    };
    idx
}

fn best_split(
    ctx: &BuildCtx,
    indices: &[usize],
    parent_counts: &[f64; NUM_CLASSES],
    rng: &mut StdRng,
) -> Option<Split> {
    let total_weight: f64 = parent_counts.iter().sum();
    let parent_gini = gini(parent_counts);

    let mut features: Vec<usize> = (0..ctx.n_features).collect();
    features.shuffle(rng);
    features.truncate(ctx.subsample);

    let mut best: Option<Split> = None;
    for &feature in &features {
        let mut column: Vec<(f64, usize, f64)> = indices
            .iter()
            .map(|&i| (ctx.samples[i][feature], ctx.class_idx[i], ctx.weights[i]))
            .collect();
        column.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut left = [0.0; NUM_CLASSES];
        let mut right = *parent_counts;
        for i in 0..column.len() - 1 {
            let (value, class, weight) = column[i];
            left[class] += weight;
            right[class] -= weight;
            if value == column[i + 1].0 {
                continue;
            }

            let wl: f64 = left.iter().sum();
            let wr: f64 = right.iter().sum();
            let impurity = (wl * gini(&left) + wr * gini(&right)) / total_weight;
            let bar = best.as_ref().map_or(parent_gini, |b| b.impurity);
            if impurity + 1e-12 < bar {
                best = Some(Split {
                    feature,
                    threshold: (value + column[i + 1].0) / 2.0,
                    impurity,
                });
            }
        }
    }
    best
}
