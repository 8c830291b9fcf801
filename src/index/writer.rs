use crate::error::{IndexError, Result};
use crate::index::docinfo;
use crate::index::merge::MergeQueue;
use crate::index::postings::is_valid_term;
use crate::index::reader::IndexReader;
use crate::index::segment::{SegmentBuilder, remove_if_exists};
use crate::index::types::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Builds an index directory from a stream of (term, docID, position) triples.
///
/// Terms are buffered in a [`SegmentBuilder`] until `flush_threshold` unique
/// terms are held, then flushed into a numbered segment which the background
/// [`MergeQueue`] folds into the main index. Documents must arrive in
/// ascending docID order.
pub struct Indexer {
    index_dir: PathBuf,
    config: IndexConfig,
    builder: SegmentBuilder,
    /// Generation of the last flushed segment
    generation: Generation,
    merges: MergeQueue,
    docs_written: u32,
    created_at: u64,
}

impl Indexer {
    /// Start a new index in `index_dir`, discarding any committed docInfo
    pub fn create(index_dir: &Path, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(index_dir)?;

        File::create(index_dir.join(DOCINFO_FNAME))?;
        remove_if_exists(&index_dir.join(META_FNAME))?;

        info!(
            dir = %index_dir.display(),
            table_size = config.table_size,
            flush_threshold = config.flush_threshold,
            "indexer created"
        );

        Ok(Self {
            index_dir: index_dir.to_path_buf(),
            merges: MergeQueue::new(index_dir, config.table_size),
            config,
            builder: SegmentBuilder::new(),
            generation: 0,
            docs_written: 0,
            created_at: now_secs(),
        })
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Segments flushed so far
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Unique terms currently buffered
    pub fn buffered_terms(&self) -> usize {
        self.builder.term_count()
    }

    /// Register a document name before its terms are inserted
    pub fn open_document(&mut self, doc_id: DocId, name: &str) -> Result<()> {
        if !docinfo::is_valid_name(name) {
            return Err(IndexError::InvalidDocName(name.to_string()));
        }
        self.builder.open_document(doc_id, name);
        Ok(())
    }

    /// Buffer one occurrence of `term` at `position` in `doc_id`.
    ///
    /// Flushes synchronously when the buffer reaches the flush threshold.
    pub fn insert(&mut self, term: &str, doc_id: DocId, position: Position) -> Result<()> {
        if !is_valid_term(term) {
            return Err(IndexError::InvalidTerm(term.to_string()));
        }

        let buffered = self.builder.term_count() as u64;
        if buffered >= self.config.table_size && !self.builder.contains_term(term) {
            return Err(IndexError::CapacityExceeded {
                terms: buffered + 1,
                capacity: self.config.table_size,
            });
        }

        self.builder.insert(term, doc_id, position);

        if self.builder.term_count() >= self.config.flush_threshold {
            self.flush_segment(true)?;
        }
        Ok(())
    }

    /// Flush the buffer now, keeping the open document's record buffered.
    ///
    /// Returns the new segment's generation, or `None` if nothing was buffered.
    pub fn flush(&mut self) -> Result<Option<Generation>> {
        self.flush_segment(true)
    }

    fn flush_segment(&mut self, retain_open: bool) -> Result<Option<Generation>> {
        let generation = self.generation + 1;
        let Some(segment) =
            self.builder
                .flush(&self.index_dir, generation, self.config.table_size, retain_open)?
        else {
            return Ok(None);
        };
        self.generation = generation;

        docinfo::append_file(&segment.docinfo_path(), &self.index_dir.join(DOCINFO_FNAME))?;
        self.docs_written += segment.doc_count() as u32;

        info!(
            generation,
            terms = segment.term_count(),
            docs = segment.doc_count(),
            collisions = segment.collisions(),
            bytes = segment.data_len(),
            "segment flushed"
        );

        self.merges.submit(segment)?;
        Ok(Some(generation))
    }

    /// Flush the remainder, wait for every merge and commit the main index.
    ///
    /// The returned reader sees the complete index.
    pub fn cleanup(mut self) -> Result<IndexReader> {
        self.flush_segment(false)?;

        let main = self.merges.finish()?;

        let meta = IndexMeta {
            version: INDEX_VERSION,
            table_size: self.config.table_size,
            flush_threshold: self.config.flush_threshold,
            doc_count: self.docs_written,
            term_count: main.term_count(),
            generations: self.generation,
            created_at: self.created_at,
            updated_at: now_secs(),
        };
        meta.write(&self.index_dir)?;

        info!(
            docs = meta.doc_count,
            terms = meta.term_count,
            generations = meta.generations,
            "index committed"
        );

        IndexReader::open_with_cache(&self.index_dir, self.config.postings_cache)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
