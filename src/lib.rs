//! # hashdex - segmented hashed inverted index
//!
//! A persistent inverted index for a small search-engine backend. Terms are
//! buffered in memory and flushed into immutable segments, each an on-disk
//! open-addressed hashtable pointing into an append-only postings file. A
//! background worker folds segments one at a time into the main index.
//!
//! ## Architecture
//!
//! - [`index`] - Dictionary, data store, postings codec, segments, merging
//!   and the reader
//! - [`output`] - Terminal formatting of lookups
//! - [`utils`] - Tokenizer, app data directory, progress bars
//! - [`error`] - Storage error type
//!
//! ## Quick Start
//!
//! ```no_run
//! use hashdex::index::{IndexConfig, Indexer};
//! use std::path::Path;
//!
//! # fn main() -> hashdex::error::Result<()> {
//! let mut indexer = Indexer::create(Path::new("/tmp/idx"), IndexConfig::default())?;
//! indexer.open_document(1, "cats.txt")?;
//! indexer.insert("cat", 1, 0)?;
//! indexer.insert("dog", 1, 1)?;
//! let reader = indexer.cleanup()?;
//!
//! let cat = reader.get_postings("cat")?.expect("indexed");
//! assert_eq!(cat.doc_ids().collect::<Vec<_>>(), vec![1]);
//! # Ok(())
//! # }
//! ```
//!
//! ## On-disk layout
//!
//! An index directory holds `dictionary` (fixed 13-byte slots), `data`
//! (postings text such as `cat 1:0,4.7:2`), `docInfo` (`docID;name;length`
//! lines), `meta.json` and optionally `scores`. While indexing, segment
//! files carry their generation number (`dictionary3`, `data3`, `docInfo3`).

pub mod error;
pub mod index;
pub mod output;
pub mod utils;
