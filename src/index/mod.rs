//! The storage engine: segment buffering, on-disk hashtables, merging and
//! the read side of a committed index.

pub mod build;
pub mod data;
pub mod dictionary;
pub mod docinfo;
pub mod merge;
pub mod postings;
pub mod reader;
pub mod scores;
pub mod segment;
pub mod stats;
pub mod types;
pub mod writer;

pub use reader::IndexReader;
pub use types::*;
pub use writer::Indexer;
