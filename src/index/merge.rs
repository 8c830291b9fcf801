//! Background folding of segments into the main index.
//!
//! Segments fold linearly in creation order: the first two flushed segments
//! become the main index, and every later segment is merged with the current
//! main index to produce its replacement. [`MergeQueue`] holds at most one
//! running merge; submitting the next segment first joins the running one.

use crate::error::{IndexError, Result};
use crate::index::data::DataStore;
use crate::index::dictionary::{DictEntry, DictionaryStore};
use crate::index::postings::{self, leading_term};
use crate::index::segment::{IndexFiles, Segment, remove_if_exists};
use crate::index::types::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

const MERGE_SUFFIX: &str = ".tmp";

/// The folded, query-ready index files
#[derive(Debug)]
pub struct MainIndex {
    dir: PathBuf,
    term_count: u64,
    data_len: u64,
}

impl MainIndex {
    /// Create an empty main index (no segment was ever flushed)
    pub fn create_empty(dir: &Path, table_size: u64) -> Result<Self> {
        DictionaryStore::create(&dir.join(DICTIONARY_FNAME), table_size)?;
        DataStore::create(&dir.join(DATA_FNAME))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            term_count: 0,
            data_len: 0,
        })
    }

    /// Turn a lone segment into the main index by renaming its files
    pub fn promote(segment: Segment, dir: &Path) -> Result<Self> {
        let main = Self {
            dir: dir.to_path_buf(),
            term_count: segment.term_count(),
            data_len: segment.data_len(),
        };
        fs::rename(segment.dictionary_path(), main.dictionary_path())?;
        fs::rename(segment.data_path(), main.data_path())?;
        segment.remove()?;
        Ok(main)
    }

    pub fn term_count(&self) -> u64 {
        self.term_count
    }

    pub fn data_len(&self) -> u64 {
        self.data_len
    }
}

impl IndexFiles for MainIndex {
    fn dictionary_path(&self) -> PathBuf {
        self.dir.join(DICTIONARY_FNAME)
    }

    fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FNAME)
    }
}

/// The older side of a merge
#[derive(Debug)]
pub enum MergeSource {
    Segment(Segment),
    Main(MainIndex),
}

impl MergeSource {
    fn files(&self) -> &dyn IndexFiles {
        match self {
            MergeSource::Segment(segment) => segment as &dyn IndexFiles,
            MergeSource::Main(main) => main as &dyn IndexFiles,
        }
    }

    fn describe(&self) -> String {
        match self {
            MergeSource::Segment(segment) => format!("segment {}", segment.generation()),
            MergeSource::Main(_) => "main".to_string(),
        }
    }
}

/// Counters reported by a merge
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Terms present on both sides
    pub merged: u64,
    /// Terms copied verbatim from the older side
    pub copied_older: u64,
    /// Terms copied verbatim from the newer side
    pub copied_newer: u64,
    /// Terms skipped because their slot or blob was unreadable
    pub skipped: u64,
    pub collisions: u64,
}

impl MergeStats {
    pub fn terms(&self) -> u64 {
        self.merged + self.copied_older + self.copied_newer
    }
}

/// Opened dictionary + data pair of one merge input
struct MergeInput {
    dictionary: DictionaryStore,
    data: DataStore,
}

impl MergeInput {
    fn open(files: &dyn IndexFiles) -> Result<Self> {
        Ok(Self {
            dictionary: DictionaryStore::open(&files.dictionary_path())?,
            data: DataStore::open(&files.data_path())?,
        })
    }

    /// Valid slots as (term, blob), skipping unreadable ones
    fn for_each_term<F>(&self, stats: &mut MergeStats, mut f: F) -> Result<()>
    where
        F: FnMut(&str, &[u8]) -> Result<()>,
    {
        for item in self.dictionary.scan()? {
            let (slot, entry) = item?;
            let Some(blob) = self.data.read(entry.offset, entry.length)? else {
                warn!(slot, path = %self.dictionary.path().display(), "skipping slot with unreadable blob");
                stats.skipped += 1;
                continue;
            };
            let Some(term) = leading_term(&blob).and_then(|t| std::str::from_utf8(t).ok()) else {
                warn!(slot, path = %self.dictionary.path().display(), "skipping blob without term header");
                stats.skipped += 1;
                continue;
            };
            f(term, &blob)?;
        }
        Ok(())
    }

    fn blob_for(&self, term: &str) -> Result<Option<Vec<u8>>> {
        match self.dictionary.read(term, &self.data)? {
            Some(entry) => self.data.read(entry.offset, entry.length),
            None => Ok(None),
        }
    }
}

/// Merge output under construction
struct MergeOutput {
    dictionary: DictionaryStore,
    data: DataStore,
}

impl MergeOutput {
    fn put(&mut self, term: &str, blob: &[u8]) -> Result<u64> {
        let (offset, length) = self.data.append(blob)?;
        self.dictionary
            .write(term, DictEntry::new(offset, length), &self.data)
    }
}

/// Fold `older` and `newer` into a fresh dictionary/data pair.
///
/// Pass one scans the older dictionary slot by slot. Terms the newer side
/// lacks are copied verbatim; shared terms get the sorted union of both
/// postings lists. Pass two scans the newer dictionary and copies the terms
/// the older side lacks.
pub fn merge_files(
    older: &dyn IndexFiles,
    newer: &dyn IndexFiles,
    dest_dictionary: &Path,
    dest_data: &Path,
    table_size: u64,
) -> Result<MergeStats> {
    let older = MergeInput::open(older)?;
    let newer = MergeInput::open(newer)?;
    let mut out = MergeOutput {
        dictionary: DictionaryStore::create(dest_dictionary, table_size)?,
        data: DataStore::create(dest_data)?,
    };
    let mut stats = MergeStats::default();
    let mut skipped = MergeStats::default();

    older.for_each_term(&mut skipped, |term, blob| {
        match newer.blob_for(term)? {
            None => {
                stats.collisions += out.put(term, blob)?;
                stats.copied_older += 1;
            }
            Some(newer_blob) => {
                let (_, older_postings) = postings::decode_bytes(blob)?;
                let (_, newer_postings) = postings::decode_bytes(&newer_blob)?;
                let merged = postings::merge(older_postings, newer_postings);
                let text = postings::encode(term, &merged);
                stats.collisions += out.put(term, text.as_bytes())?;
                stats.merged += 1;
            }
        }
        Ok(())
    })?;

    newer.for_each_term(&mut skipped, |term, blob| {
        if older.dictionary.read(term, &older.data)?.is_none() {
            stats.collisions += out.put(term, blob)?;
            stats.copied_newer += 1;
        }
        Ok(())
    })?;

    out.data.sync()?;
    out.dictionary.sync()?;
    stats.skipped = skipped.skipped;
    Ok(stats)
}

/// Merge `older` with `newer` and install the result as the main index of `dir`.
///
/// The result is written next to the main index and renamed over it once
/// complete; both inputs are removed afterwards.
pub fn fold_into_main(
    older: MergeSource,
    newer: Segment,
    dir: &Path,
    table_size: u64,
) -> Result<MainIndex> {
    let tmp_dictionary = dir.join(format!("{}{}", DICTIONARY_FNAME, MERGE_SUFFIX));
    let tmp_data = dir.join(format!("{}{}", DATA_FNAME, MERGE_SUFFIX));

    info!(
        older = %older.describe(),
        newer = newer.generation(),
        "merge started"
    );

    let stats = match merge_files(older.files(), &newer, &tmp_dictionary, &tmp_data, table_size) {
        Ok(stats) => stats,
        Err(e) => {
            remove_if_exists(&tmp_dictionary)?;
            remove_if_exists(&tmp_data)?;
            return Err(e);
        }
    };

    let main = MainIndex {
        dir: dir.to_path_buf(),
        term_count: stats.terms(),
        data_len: fs::metadata(&tmp_data)?.len(),
    };
    fs::rename(&tmp_dictionary, main.dictionary_path())?;
    fs::rename(&tmp_data, main.data_path())?;

    if let MergeSource::Segment(segment) = older {
        segment.remove()?;
    }
    let generation = newer.generation();
    newer.remove()?;

    info!(
        generation,
        terms = stats.terms(),
        merged = stats.merged,
        copied_older = stats.copied_older,
        copied_newer = stats.copied_newer,
        skipped = stats.skipped,
        collisions = stats.collisions,
        "merge finished"
    );

    Ok(main)
}

/// Single-slot queue of background merges.
///
/// Holds the first segment until a partner arrives, then at most one merge
/// worker at a time. Every submit joins the running worker before starting
/// the next, so segments fold strictly in creation order.
pub struct MergeQueue {
    dir: PathBuf,
    table_size: u64,
    /// First segment, waiting for a second one
    waiting: Option<Segment>,
    /// Completed main index when no merge is running
    main: Option<MainIndex>,
    in_flight: Option<JoinHandle<Result<MainIndex>>>,
}

impl MergeQueue {
    pub fn new(dir: &Path, table_size: u64) -> Self {
        Self {
            dir: dir.to_path_buf(),
            table_size,
            waiting: None,
            main: None,
            in_flight: None,
        }
    }

    /// Whether a merge worker is currently running
    pub fn is_merging(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Hand a freshly flushed segment to the queue
    pub fn submit(&mut self, segment: Segment) -> Result<()> {
        self.join()?;

        let older = match (self.main.take(), self.waiting.take()) {
            (Some(main), _) => MergeSource::Main(main),
            (None, Some(first)) => MergeSource::Segment(first),
            (None, None) => {
                debug!(generation = segment.generation(), "segment waiting for a merge partner");
                self.waiting = Some(segment);
                return Ok(());
            }
        };

        let dir = self.dir.clone();
        let table_size = self.table_size;
        let handle = thread::Builder::new()
            .name(format!("merge-{}", segment.generation()))
            .spawn(move || fold_into_main(older, segment, &dir, table_size))?;
        self.in_flight = Some(handle);
        Ok(())
    }

    /// Block until the running merge, if any, has finished
    fn join(&mut self) -> Result<()> {
        if let Some(handle) = self.in_flight.take() {
            self.main = Some(join_worker(handle)?);
        }
        Ok(())
    }

    /// Drain all pending work and return the complete main index
    pub fn finish(mut self) -> Result<MainIndex> {
        self.join()?;

        if let Some(main) = self.main.take() {
            return Ok(main);
        }
        match self.waiting.take() {
            Some(segment) => MainIndex::promote(segment, &self.dir),
            None => MainIndex::create_empty(&self.dir, self.table_size),
        }
    }
}

/// A panicking worker surfaces as [`IndexError::MergeFailed`]
fn join_worker(handle: JoinHandle<Result<MainIndex>>) -> Result<MainIndex> {
    let name = handle.thread().name().unwrap_or("merge").to_string();
    handle
        .join()
        .map_err(|_| IndexError::MergeFailed(format!("{} worker panicked", name)))?
}

impl Drop for MergeQueue {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            error!(error = %e, "background merge failed");
        }
    }
}
