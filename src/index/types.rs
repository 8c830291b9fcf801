use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Unique identifier for a document in the index
pub type DocId = u32;

/// Token offset of a term inside a document
pub type Position = u32;

/// Segment generation number (1 for the first flushed segment)
pub type Generation = u32;

/// Dictionary hashtable file name (segments append their generation)
pub const DICTIONARY_FNAME: &str = "dictionary";
/// Postings data file name (segments append their generation)
pub const DATA_FNAME: &str = "data";
/// Document info file name (segments append their generation)
pub const DOCINFO_FNAME: &str = "docInfo";
/// Index metadata file
pub const META_FNAME: &str = "meta.json";
/// Authority score table written by the external batch job
pub const SCORES_FNAME: &str = "scores";

/// Current on-disk format version
pub const INDEX_VERSION: u32 = 1;

/// Path of a per-generation file, e.g. `dictionary3`
pub fn generation_path(dir: &Path, base: &str, generation: Generation) -> PathBuf {
    dir.join(format!("{}{}", base, generation))
}

/// One document's group inside a postings list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingsEntry {
    pub doc_id: DocId,
    /// Positions in insertion order
    pub positions: Vec<Position>,
}

impl PostingsEntry {
    pub fn new(doc_id: DocId, positions: Vec<Position>) -> Self {
        Self { doc_id, positions }
    }

    /// Term frequency in this document
    pub fn frequency(&self) -> usize {
        self.positions.len()
    }
}

/// Postings for one term, one entry per document, docIDs strictly ascending
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingsList {
    entries: Vec<PostingsEntry>,
}

impl PostingsList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from entries that are already strictly ascending by docID.
    /// Returns `None` when the ordering invariant does not hold.
    pub fn from_sorted(entries: Vec<PostingsEntry>) -> Option<Self> {
        let ascending = entries.windows(2).all(|w| w[0].doc_id < w[1].doc_id);
        ascending.then_some(Self { entries })
    }

    /// Build a list the caller already knows to be strictly ascending
    pub(crate) fn from_sorted_unchecked(entries: Vec<PostingsEntry>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].doc_id < w[1].doc_id));
        Self { entries }
    }

    /// Record `position` for `doc_id`.
    ///
    /// Appending to the last document is the hot path: documents arrive in
    /// ascending order. An out-of-order docID is placed by binary search so
    /// the list stays sorted regardless of the caller.
    pub fn add_posting(&mut self, doc_id: DocId, position: Position) {
        let last_doc = self.entries.last().map(|e| e.doc_id);
        match last_doc {
            Some(last) if last == doc_id => {
                if let Some(entry) = self.entries.last_mut() {
                    entry.positions.push(position);
                }
            }
            Some(last) if last < doc_id => {
                self.entries.push(PostingsEntry::new(doc_id, vec![position]))
            }
            None => self.entries.push(PostingsEntry::new(doc_id, vec![position])),
            Some(_) => match self.entries.binary_search_by_key(&doc_id, |e| e.doc_id) {
                Ok(i) => self.entries[i].positions.push(position),
                Err(i) => self
                    .entries
                    .insert(i, PostingsEntry::new(doc_id, vec![position])),
            },
        }
    }

    /// Number of documents in the list
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PostingsEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PostingsEntry> {
        self.entries.iter()
    }

    /// Entry for a document, if present
    pub fn get(&self, doc_id: DocId) -> Option<&PostingsEntry> {
        self.entries
            .binary_search_by_key(&doc_id, |e| e.doc_id)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.entries.iter().map(|e| e.doc_id)
    }

    pub fn into_entries(self) -> Vec<PostingsEntry> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a PostingsList {
    type Item = &'a PostingsEntry;
    type IntoIter = std::slice::Iter<'a, PostingsEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Document record in the docInfo table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRecord {
    pub doc_id: DocId,
    pub name: String,
    /// Number of tokens indexed for the document
    pub length: u32,
}

impl DocRecord {
    pub fn new(doc_id: DocId, name: impl Into<String>) -> Self {
        Self {
            doc_id,
            name: name.into(),
            length: 0,
        }
    }
}

/// Configuration for building an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Number of slots in every dictionary hashtable
    #[serde(default = "default_table_size")]
    pub table_size: u64,
    /// Unique buffered terms that trigger a segment flush
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Decoded postings lists kept by a reader
    #[serde(default = "default_postings_cache")]
    pub postings_cache: usize,
    /// Files larger than this are skipped by the crawler
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_table_size() -> u64 {
    3_500_017 // prime
}

fn default_flush_threshold() -> usize {
    75_000
}

fn default_postings_cache() -> usize {
    1024
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            table_size: default_table_size(),
            flush_threshold: default_flush_threshold(),
            postings_cache: default_postings_cache(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl IndexConfig {
    /// Small tables and thresholds, handy for tests and tiny corpora
    pub fn with_sizes(table_size: u64, flush_threshold: usize) -> Self {
        Self {
            table_size,
            flush_threshold,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_size == 0 {
            return Err(IndexError::config("table_size must be at least 1"));
        }
        if self.flush_threshold == 0 {
            return Err(IndexError::config("flush_threshold must be at least 1"));
        }
        Ok(())
    }
}

/// Index metadata stored in meta.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub table_size: u64,
    pub flush_threshold: usize,
    pub doc_count: u32,
    pub term_count: u64,
    /// Segments flushed while building
    pub generations: Generation,
    pub created_at: u64,
    pub updated_at: u64,
}

impl IndexMeta {
    pub fn read(index_dir: &Path) -> Result<Self> {
        let file = std::fs::File::open(index_dir.join(META_FNAME))?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn write(&self, index_dir: &Path) -> Result<()> {
        let file = std::fs::File::create(index_dir.join(META_FNAME))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
