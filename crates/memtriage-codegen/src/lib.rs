//! Hardware Generation for the Triage Decision Engine
//!
//! This crate translates a trained tree ensemble into a combinational
//! SystemVerilog module:
//!
//! - one `always_comb` block per tree, mirroring the tree's decision
//!   structure as nested conditionals
//! - a majority voter tallying per-tree votes with dynamically sized
//!   counters
//! - the hard-rule safety override, emitted from the same constants as
//!   the software labeling rule
//! - a final multiplexer giving the override precedence over the
//!   learned vote
//!
//! The generated module is a build artifact judged by simulation
//! equivalence to the labeling rule and the trained ensemble, not a
//! runtime API.

pub mod systemverilog;

pub use systemverilog::{
    generate_forest_module, vote_counter_width, write_forest_module, DEFAULT_MODULE_NAME,
};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from hardware generation
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("tree {tree} is malformed at node {node}")]
    MalformedTree { tree: usize, node: usize },

    #[error("ensemble has no trees")]
    EmptyForest,

    #[error("expected {expected} feature names, got {got}")]
    FeatureNames { expected: usize, got: usize },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for generation operations
pub type CodegenResult<T> = Result<T, CodegenError>;
