use crate::index::docinfo;
use crate::index::types::{DocId, IndexConfig, Position};
use crate::index::writer::Indexer;
use crate::utils::progress::{file_bar, spinner};
use crate::utils::{is_binary, tokenize};
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Files read and tokenized in parallel before being fed in order
const FILE_CHUNK: usize = 1024;

/// A file read and tokenized on a worker thread
struct TokenizedFile {
    name: String,
    tokens: Vec<String>,
}

/// Outcome of a build
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub files_seen: usize,
    pub docs_indexed: usize,
    pub skipped: usize,
    pub unreadable: usize,
    pub tokens: u64,
    pub terms: u64,
    pub generations: u32,
}

fn read_and_tokenize(path: &Path, rel_path: &Path, max_file_size: u64) -> Result<Option<TokenizedFile>> {
    let content = fs::read(path)?;
    if content.len() as u64 > max_file_size || is_binary(&content) {
        return Ok(None);
    }
    let name = rel_path.to_string_lossy().into_owned();
    if !docinfo::is_valid_name(&name) {
        warn!(path = %path.display(), "skipping file whose name spans lines");
        return Ok(None);
    }
    let text = String::from_utf8_lossy(&content);
    Ok(Some(TokenizedFile {
        name,
        tokens: tokenize(&text),
    }))
}

/// Collect indexable files under `root`, sorted so docIDs follow path order
fn collect_files(root: &Path, index_dir: &Path) -> Vec<(PathBuf, PathBuf)> {
    let index_dir = index_dir.to_path_buf();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .filter_entry(move |entry| {
            let name = entry.file_name().to_string_lossy();
            !matches!(name.as_ref(), ".git" | "node_modules" | "target")
                && entry.path() != index_dir
        })
        .build();

    let mut files: Vec<_> = walker
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let path = entry.path().to_path_buf();
            let rel_path = path.strip_prefix(root).ok()?.to_path_buf();
            Some((path, rel_path))
        })
        .collect();
    files.sort_by(|a, b| a.1.cmp(&b.1));
    files
}

/// Crawl `root` and build a fresh index in `index_dir`
pub fn build_index(root: &Path, index_dir: &Path, config: IndexConfig, silent: bool) -> Result<BuildSummary> {
    let root = root.canonicalize().context("Invalid path")?;
    let started = Instant::now();

    if !silent {
        println!("Indexing: {}", root.display());
    }

    let discover = spinner("Discovering files...", silent);
    let files = collect_files(&root, index_dir);
    if let Some(spinner) = discover {
        spinner.finish_with_message(format!("Found {} files", files.len()));
    }

    let max_file_size = config.max_file_size;
    let mut indexer = Indexer::create(index_dir, config)
        .with_context(|| format!("Failed to create index in {}", index_dir.display()))?;

    let mut summary = BuildSummary {
        files_seen: files.len(),
        ..Default::default()
    };
    let unreadable = AtomicUsize::new(0);
    let num_chunks = files.len().div_ceil(FILE_CHUNK);
    let mut next_doc: DocId = 1;

    for (chunk_idx, chunk) in files.chunks(FILE_CHUNK).enumerate() {
        let message = if num_chunks > 1 {
            format!("Chunk {}/{}", chunk_idx + 1, num_chunks)
        } else {
            "Processing files...".to_string()
        };
        let bar = file_bar(chunk.len() as u64, message, silent);

        // Tokenize in parallel, keep path order for docID assignment
        let tokenized: Vec<Option<TokenizedFile>> = chunk
            .par_iter()
            .map(|(path, rel_path)| {
                let result = match read_and_tokenize(path, rel_path, max_file_size) {
                    Ok(file) => file,
                    Err(_) => {
                        unreadable.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                };
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
                result
            })
            .collect();

        for file in tokenized {
            let Some(file) = file else {
                summary.skipped += 1;
                continue;
            };
            let doc_id = next_doc;
            next_doc += 1;

            indexer.open_document(doc_id, &file.name)?;
            for (position, token) in file.tokens.iter().enumerate() {
                indexer.insert(token, doc_id, position as Position)?;
            }
            summary.docs_indexed += 1;
            summary.tokens += file.tokens.len() as u64;
        }

        if let Some(bar) = bar {
            bar.finish_with_message(format!("{} documents", summary.docs_indexed));
        }
    }

    let finalize = spinner("Waiting for merges...", silent);
    let reader = indexer.cleanup().context("Failed to commit index")?;
    if let Some(spinner) = finalize {
        spinner.finish_with_message("Index complete");
    }

    summary.unreadable = unreadable.into_inner();
    summary.skipped -= summary.unreadable.min(summary.skipped);
    summary.terms = reader.term_count()?;
    summary.generations = reader.meta().map_or(0, |m| m.generations);

    info!(
        docs = summary.docs_indexed,
        terms = summary.terms,
        tokens = summary.tokens,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "build finished"
    );

    if !silent {
        println!("Index stored at: {}", index_dir.display());
        if summary.unreadable > 0 {
            eprintln!("({} files could not be read)", summary.unreadable);
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::reader::IndexReader;
    use tempfile::TempDir;

    #[test]
    fn test_build_small_tree() {
        let corpus = TempDir::new().unwrap();
        fs::write(corpus.path().join("a.txt"), "The cat sat").unwrap();
        fs::create_dir(corpus.path().join("sub")).unwrap();
        fs::write(corpus.path().join("sub/b.txt"), "a dog and a cat").unwrap();
        fs::write(corpus.path().join("blob.bin"), b"\0\0\0\x01\x02").unwrap();

        let index = TempDir::new().unwrap();
        let summary =
            build_index(corpus.path(), index.path(), IndexConfig::with_sizes(211, 3), true).unwrap();
        assert_eq!(summary.files_seen, 3);
        assert_eq!(summary.docs_indexed, 2);
        assert_eq!(summary.skipped, 1);

        let reader = IndexReader::open(index.path()).unwrap();
        // Sorted by path: a.txt is 1, sub/b.txt is 2 (blob.bin takes no docID)
        assert_eq!(reader.doc_name(1), Some("a.txt"));
        assert_eq!(reader.doc_length(2), Some(5));

        let cat = reader.get_postings("cat").unwrap().unwrap();
        assert_eq!(cat.doc_ids().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(cat.get(2).unwrap().positions, vec![4]);
        assert_eq!(reader.get_postings("a").unwrap().unwrap().get(2).unwrap().positions, vec![0, 3]);
    }

    #[cfg(unix)]
    #[test]
    fn test_name_with_newline_is_skipped() {
        let corpus = TempDir::new().unwrap();
        fs::write(corpus.path().join("a.txt"), "cat").unwrap();
        fs::write(corpus.path().join("odd\nname.txt"), "cat dog").unwrap();

        let index = TempDir::new().unwrap();
        let summary =
            build_index(corpus.path(), index.path(), IndexConfig::with_sizes(31, 100), true).unwrap();
        assert_eq!(summary.docs_indexed, 1);
        assert_eq!(summary.skipped, 1);

        let reader = IndexReader::open(index.path()).unwrap();
        assert_eq!(reader.doc_count(), 1);
        assert!(reader.get_postings("dog").unwrap().is_none());
    }
}
