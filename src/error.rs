//! Error types for the storage engine.
//!
//! Absence is never an error: lookups return `Ok(None)` when a probe chain
//! ends without a match, and a slot whose marker or blob cannot be read is
//! treated the same way. Everything here aborts the current flush, merge or
//! query and is handed back to the caller.

use std::io;

use thiserror::Error;

/// Errors raised by the dictionary, data store, merger and reader.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Disk read/write failure on a dictionary, data or docInfo file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A segment or merge destination ran out of dictionary slots
    #[error("dictionary capacity exceeded: {terms} unique terms for a table of {capacity} slots")]
    CapacityExceeded { terms: u64, capacity: u64 },

    /// Terms must be non-empty and free of whitespace
    #[error("invalid term: {0:?}")]
    InvalidTerm(String),

    /// Document names end up on a single docInfo line
    #[error("invalid document name: {0:?}")]
    InvalidDocName(String),

    /// A postings blob that had to be decoded is malformed
    #[error("corrupt postings: {0}")]
    CorruptPostings(String),

    /// A line of a docInfo or score table could not be parsed
    #[error("corrupt {table} line {line}: {reason}")]
    CorruptTable {
        table: &'static str,
        line: usize,
        reason: String,
    },

    /// The background merge worker did not finish normally
    #[error("merge failed: {0}")]
    MergeFailed(String),

    /// Invalid index configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Index metadata could not be read or written
    #[error("metadata error: {0}")]
    Meta(#[from] serde_json::Error),
}

impl IndexError {
    pub fn corrupt_postings<S: Into<String>>(msg: S) -> Self {
        IndexError::CorruptPostings(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        IndexError::Config(msg.into())
    }
}

/// Result type for storage engine operations.
pub type Result<T> = std::result::Result<T, IndexError>;
