use crate::error::Result;
use crate::index::data::MappedData;
use crate::index::dictionary::DictionaryStore;
use crate::index::docinfo::DocInfoTable;
use crate::index::postings;
use crate::index::scores::AuthorityScores;
use crate::index::types::*;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Read-only view of a committed main index.
///
/// Opens the dictionary, memory-maps the data file and loads the docInfo
/// table plus optional authority scores. Must only be opened after
/// indexing into the directory has finished.
pub struct IndexReader {
    index_dir: PathBuf,
    meta: Option<IndexMeta>,
    dictionary: DictionaryStore,
    data: MappedData,
    docs: DocInfoTable,
    scores: Option<AuthorityScores>,
    /// Recently decoded postings lists
    cache: Option<Mutex<LruCache<String, PostingsList>>>,
}

impl IndexReader {
    /// Open without a postings cache
    pub fn open(index_dir: &Path) -> Result<Self> {
        Self::open_with_cache(index_dir, 0)
    }

    /// Open, caching up to `capacity` decoded postings lists (0 disables the cache)
    pub fn open_with_cache(index_dir: &Path, capacity: usize) -> Result<Self> {
        let dictionary = DictionaryStore::open(&index_dir.join(DICTIONARY_FNAME))?;
        let data = MappedData::open(&index_dir.join(DATA_FNAME))?;
        let docs = DocInfoTable::load(&index_dir.join(DOCINFO_FNAME))?;

        let meta_path = index_dir.join(META_FNAME);
        let meta = if meta_path.exists() {
            Some(IndexMeta::read(index_dir)?)
        } else {
            None
        };

        let scores_path = index_dir.join(SCORES_FNAME);
        let scores = if scores_path.exists() {
            Some(AuthorityScores::load(&scores_path)?)
        } else {
            None
        };

        let cache = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));

        debug!(
            dir = %index_dir.display(),
            table_size = dictionary.table_size(),
            docs = docs.len(),
            scores = scores.as_ref().map_or(0, |s| s.len()),
            "index opened"
        );

        Ok(Self {
            index_dir: index_dir.to_path_buf(),
            meta,
            dictionary,
            data,
            docs,
            scores,
            cache,
        })
    }

    /// Postings for `term`, or `None` when the term is not indexed
    pub fn get_postings(&self, term: &str) -> Result<Option<PostingsList>> {
        if let Some(cache) = &self.cache
            && let Ok(mut cache) = cache.lock()
            && let Some(list) = cache.get(term)
        {
            return Ok(Some(list.clone()));
        }

        let Some(entry) = self.dictionary.read(term, &self.data)? else {
            return Ok(None);
        };
        let Some(blob) = self.data.slice(entry.offset, entry.length) else {
            return Ok(None);
        };
        let (_, list) = postings::decode_bytes(blob)?;

        if let Some(cache) = &self.cache
            && let Ok(mut cache) = cache.lock()
        {
            cache.put(term.to_string(), list.clone());
        }
        Ok(Some(list))
    }

    /// Number of documents containing `term`
    pub fn doc_frequency(&self, term: &str) -> Result<usize> {
        Ok(self.get_postings(term)?.map_or(0, |list| list.len()))
    }

    pub fn doc_name(&self, doc_id: DocId) -> Option<&str> {
        self.docs.name(doc_id)
    }

    /// Indexed token count of a document
    pub fn doc_length(&self, doc_id: DocId) -> Option<u32> {
        self.docs.length(doc_id)
    }

    pub fn doc_names(&self) -> impl Iterator<Item = (DocId, &str)> {
        self.docs.iter().map(|r| (r.doc_id, r.name.as_str()))
    }

    pub fn doc_lengths(&self) -> impl Iterator<Item = (DocId, u32)> + '_ {
        self.docs.iter().map(|r| (r.doc_id, r.length))
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Unique terms, from meta.json when present, else by scanning the table
    pub fn term_count(&self) -> Result<u64> {
        if let Some(meta) = &self.meta {
            return Ok(meta.term_count);
        }
        let mut count = 0;
        for slot in self.dictionary.scan()? {
            slot?;
            count += 1;
        }
        Ok(count)
    }

    /// Authority score of a document, if a score table was loaded
    pub fn authority_score(&self, doc_id: DocId) -> Option<f64> {
        self.scores.as_ref()?.get(doc_id)
    }

    pub fn has_scores(&self) -> bool {
        self.scores.is_some()
    }

    pub fn meta(&self) -> Option<&IndexMeta> {
        self.meta.as_ref()
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn dictionary(&self) -> &DictionaryStore {
        &self.dictionary
    }

    pub fn data(&self) -> &MappedData {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::writer::Indexer;
    use tempfile::TempDir;

    fn build(dir: &Path) -> IndexReader {
        let mut indexer = Indexer::create(dir, IndexConfig::with_sizes(101, 1000)).unwrap();
        indexer.open_document(1, "one.txt").unwrap();
        indexer.insert("cat", 1, 0).unwrap();
        indexer.insert("dog", 1, 1).unwrap();
        indexer.open_document(2, "two.txt").unwrap();
        indexer.insert("cat", 2, 0).unwrap();
        indexer.cleanup().unwrap()
    }

    #[test]
    fn test_get_postings() {
        let dir = TempDir::new().unwrap();
        let reader = build(dir.path());

        let cat = reader.get_postings("cat").unwrap().unwrap();
        assert_eq!(
            cat.entries(),
            &[PostingsEntry::new(1, vec![0]), PostingsEntry::new(2, vec![0])]
        );
        assert_eq!(reader.doc_frequency("dog").unwrap(), 1);
        assert!(reader.get_postings("emu").unwrap().is_none());
    }

    #[test]
    fn test_doc_tables() {
        let dir = TempDir::new().unwrap();
        let reader = build(dir.path());

        assert_eq!(reader.doc_count(), 2);
        assert_eq!(reader.doc_name(2), Some("two.txt"));
        assert_eq!(reader.doc_length(1), Some(2));
        assert_eq!(reader.doc_lengths().collect::<Vec<_>>(), vec![(1, 2), (2, 1)]);
        assert_eq!(reader.term_count().unwrap(), 2);
        assert!(!reader.has_scores());
    }

    #[test]
    fn test_cached_lookup_matches_uncached() {
        let dir = TempDir::new().unwrap();
        drop(build(dir.path()));

        let cached = IndexReader::open_with_cache(dir.path(), 4).unwrap();
        let first = cached.get_postings("cat").unwrap();
        let second = cached.get_postings("cat").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, IndexReader::open(dir.path()).unwrap().get_postings("cat").unwrap());
    }

    #[test]
    fn test_authority_scores_loaded() {
        let dir = TempDir::new().unwrap();
        drop(build(dir.path()));

        let mut scores = AuthorityScores::new();
        scores.insert(1, 0.25);
        scores.write(&dir.path().join(SCORES_FNAME)).unwrap();

        let reader = IndexReader::open(dir.path()).unwrap();
        assert_eq!(reader.authority_score(1), Some(0.25));
        assert_eq!(reader.authority_score(2), None);
    }
}
