//! DRAM Error Record Ingestion
//!
//! This crate owns the input side of the memtriage pipeline:
//!
//! - **Record model**: immutable error records with physical location,
//!   row/column address and error type
//! - **Record sources**: a CSV-backed source and a synthetic generator
//!   behind a common trait, so the pipeline never halts for lack of data
//! - **Grouping**: partitioning records by physical location into
//!   time-ordered error groups
//!
//! The pipeline is a single deterministic batch pass; every stage here
//! fully consumes its input and produces an immutable output.

pub mod group;
pub mod record;
pub mod source;

pub use group::{group_records, ErrorGroup, GroupKey};
pub use record::{ErrorRecord, ErrorType};
pub use source::{select_source, CsvSource, RecordSource, SyntheticConfig, SyntheticSource};

use thiserror::Error;

/// Errors from record loading and grouping
#[derive(Error, Debug)]
pub enum DataError {
    #[error("missing required column '{0}' in input header")]
    MissingColumn(String),

    #[error("bad field '{column}' on line {line}: {value:?}")]
    BadField {
        line: usize,
        column: String,
        value: String,
    },

    #[error("error group is empty")]
    EmptyGroup,

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for data operations
pub type DataResult<T> = Result<T, DataError>;
