//! In-memory segment buffer and immutable on-disk segments.

use crate::error::{IndexError, Result};
use crate::index::data::DataStore;
use crate::index::dictionary::{DictEntry, DictionaryStore};
use crate::index::docinfo::{self, DocInfoTable};
use crate::index::postings;
use crate::index::types::*;
use ahash::AHashMap;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Files that hold a dictionary and its data store
pub trait IndexFiles {
    fn dictionary_path(&self) -> PathBuf;
    fn data_path(&self) -> PathBuf;
}

/// Postings and document records buffered for the next segment
#[derive(Default)]
pub struct SegmentBuilder {
    postings: AHashMap<String, PostingsList>,
    docs: DocInfoTable,
    /// Document currently being fed; its record survives a flush
    open_doc: Option<DocId>,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unique buffered terms
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn contains_term(&self, term: &str) -> bool {
        self.postings.contains_key(term)
    }

    /// Document currently open, if any
    pub fn open_doc(&self) -> Option<DocId> {
        self.open_doc
    }

    pub fn docs(&self) -> &DocInfoTable {
        &self.docs
    }

    /// Register a document and make it the open one
    pub fn open_document(&mut self, doc_id: DocId, name: &str) {
        self.docs.open_document(doc_id, name);
        self.open_doc = Some(doc_id);
    }

    /// Buffer one occurrence of `term`
    pub fn insert(&mut self, term: &str, doc_id: DocId, position: Position) {
        match self.postings.get_mut(term) {
            Some(list) => list.add_posting(doc_id, position),
            None => {
                let mut list = PostingsList::new();
                list.add_posting(doc_id, position);
                self.postings.insert(term.to_owned(), list);
            }
        }
        self.docs.record_token(doc_id);
        if self.open_doc.is_none_or(|open| open < doc_id) {
            self.open_doc = Some(doc_id);
        }
    }

    /// Whether a flush would write anything
    pub fn has_pending(&self, retain_open: bool) -> bool {
        if !self.postings.is_empty() {
            return true;
        }
        match (retain_open, self.open_doc) {
            (true, Some(open)) => self.docs.iter().any(|r| r.doc_id != open),
            _ => !self.docs.is_empty(),
        }
    }

    /// Write the buffer as segment `generation` in `dir` and clear it.
    ///
    /// With `retain_open`, the open document's record stays buffered so a
    /// document spanning the flush keeps a single, complete record.
    /// Returns `None` when there is nothing to write.
    pub fn flush(
        &mut self,
        dir: &Path,
        generation: Generation,
        table_size: u64,
        retain_open: bool,
    ) -> Result<Option<Segment>> {
        if !self.has_pending(retain_open) {
            return Ok(None);
        }
        if self.postings.len() as u64 > table_size {
            return Err(IndexError::CapacityExceeded {
                terms: self.postings.len() as u64,
                capacity: table_size,
            });
        }

        let segment = Segment::new(dir, generation);

        let mut terms: Vec<(String, PostingsList)> = self.postings.drain().collect();
        terms.par_sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let blobs: Vec<(String, String)> = terms
            .into_par_iter()
            .map(|(term, list)| {
                let blob = postings::encode(&term, &list);
                (term, blob)
            })
            .collect();

        let mut data = DataStore::create(&segment.data_path())?;
        let mut dictionary = DictionaryStore::create(&segment.dictionary_path(), table_size)?;
        for (term, blob) in &blobs {
            let (offset, length) = data.append(blob.as_bytes())?;
            dictionary.write(term, DictEntry::new(offset, length), &data)?;
        }
        data.sync()?;
        dictionary.sync()?;

        let retain = if retain_open { self.open_doc } else { None };
        let records = self.docs.drain_except(retain);
        let doc_count = docinfo::write_records(&segment.docinfo_path(), &records)?;
        if !retain_open {
            self.open_doc = None;
        }

        debug!(
            generation,
            terms = dictionary.len(),
            docs = doc_count,
            "segment files written"
        );

        Ok(Some(Segment {
            term_count: dictionary.len(),
            doc_count,
            data_len: data.free(),
            collisions: dictionary.collisions(),
            ..segment
        }))
    }
}

/// An immutable flushed segment
#[derive(Debug)]
pub struct Segment {
    dir: PathBuf,
    generation: Generation,
    term_count: u64,
    doc_count: usize,
    /// Free pointer of the data store when flushed
    data_len: u64,
    collisions: u64,
}

impl Segment {
    fn new(dir: &Path, generation: Generation) -> Self {
        Self {
            dir: dir.to_path_buf(),
            generation,
            term_count: 0,
            doc_count: 0,
            data_len: 0,
            collisions: 0,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn term_count(&self) -> u64 {
        self.term_count
    }

    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    pub fn collisions(&self) -> u64 {
        self.collisions
    }

    pub fn docinfo_path(&self) -> PathBuf {
        generation_path(&self.dir, DOCINFO_FNAME, self.generation)
    }

    /// Delete the segment's files once it has been folded
    pub fn remove(self) -> Result<()> {
        for path in [self.dictionary_path(), self.data_path(), self.docinfo_path()] {
            remove_if_exists(&path)?;
        }
        Ok(())
    }
}

impl IndexFiles for Segment {
    fn dictionary_path(&self) -> PathBuf {
        generation_path(&self.dir, DICTIONARY_FNAME, self.generation)
    }

    fn data_path(&self) -> PathBuf {
        generation_path(&self.dir, DATA_FNAME, self.generation)
    }
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
