//! Error record model
//!
//! Records are immutable once loaded. The `error_type` wire codes are
//! fixed by the logging format: read = 1, scrub = 2, write = 3.

use serde::{Deserialize, Serialize};

/// Type of the memory access that observed the error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    /// Error observed by a read access (code 1)
    Read,
    /// Error observed by a patrol scrub (code 2)
    Scrub,
    /// Error observed by a write access (code 3)
    Write,
}

impl ErrorType {
    /// Decode the wire representation. Unknown codes are rejected.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Read),
            2 => Some(Self::Scrub),
            3 => Some(Self::Write),
            _ => None,
        }
    }

    /// Wire representation of this error type
    pub fn code(&self) -> u32 {
        match self {
            Self::Read => 1,
            Self::Scrub => 2,
            Self::Write => 3,
        }
    }
}

/// A single DRAM error event
///
/// `time_idx` is the position of the record in the time-sorted input,
/// monotonic within a group after grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Socket identifier
    pub sid: u32,
    /// Memory controller identifier
    pub memoryid: u32,
    /// Rank identifier
    pub rankid: u32,
    /// Bank identifier
    pub bankid: u32,
    /// Row address
    pub row: u32,
    /// Column address
    pub col: u32,
    /// Kind of access that observed the error
    pub error_type: ErrorType,
    /// Ordering key assigned after the time sort
    pub time_idx: u64,
}
