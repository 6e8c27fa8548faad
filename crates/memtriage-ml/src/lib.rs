//! Maintenance-Action Classification for DRAM Error Groups
//!
//! This crate turns time-ordered error groups into labeled feature
//! vectors and trains a majority-vote ensemble of decision trees on
//! them. It provides:
//!
//! - **Feature extraction**: a fixed 9-field vector per error group
//! - **Labeling rule**: the deterministic scrub/refresh/no-action
//!   decision, shared with the generated hardware's safety override
//! - **Ensemble training**: CART trees with gini splits, bootstrap
//!   sampling and balanced class weights
//! - **Evaluation**: train/test split and a per-class report
//! - **Normalization constants**: min/max rescaling for the
//!   float-feature pipeline, persisted alongside the model
//!
//! # Pipeline position
//!
//! ```text
//! records → groups → [extract_features] → [label] → [RandomForest::fit]
//!                                                        │
//!                                            trees → codegen (RTL)
//! ```
//!
//! The labeling rule and the hardware override emitted by the codegen
//! crate share the constants in [`label`]; divergence between the two
//! is a correctness bug.

pub mod eval;
pub mod features;
pub mod forest;
pub mod label;
pub mod normalize;

pub use eval::{evaluate, train_test_split, ClassMetrics, EvalReport};
pub use features::{build_dataset, extract_features, FeatureVector, RateForm, FEATURE_NAMES, NUM_FEATURES};
pub use forest::{
    majority_action, predict_with_override, DecisionTree, ForestConfig, RandomForest, TreeNode,
};
pub use label::{hard_rule, label, Action, NUM_CLASSES};
pub use normalize::Normalization;

use thiserror::Error;

/// Errors from training and artifact persistence
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("cannot train on an empty or mismatched dataset")]
    EmptyDataset,

    #[error("artifact i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type for training operations
pub type TrainResult<T> = Result<T, TrainError>;
