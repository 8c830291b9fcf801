//! End-to-end tests of the index: insert, flush, background merges, cleanup
//! and the read side of the committed main index.

use hashdex::error::IndexError;
use hashdex::index::dictionary::home_slot;
use hashdex::index::postings;
use hashdex::index::types::*;
use hashdex::index::{IndexReader, Indexer};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const VOCABULARY: &[&str] = &[
    "apple", "bear", "cat", "dog", "eel", "fox", "gnu", "hen", "ibis", "jay", "kiwi", "lion",
    "mole", "newt", "owl", "pig", "quail", "rat", "seal", "toad", "urchin", "vole", "wolf",
    "yak", "zebra",
];

/// Deterministic pseudo-random corpus: (name, words) per document
fn corpus(docs: u32, words_per_doc: usize) -> Vec<(String, Vec<&'static str>)> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    (1..=docs)
        .map(|doc| {
            let words = (0..words_per_doc)
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    VOCABULARY[(state >> 33) as usize % VOCABULARY.len()]
                })
                .collect();
            (format!("doc{:03}.txt", doc), words)
        })
        .collect()
}

fn build(dir: &Path, config: IndexConfig, docs: &[(String, Vec<&str>)]) -> IndexReader {
    let mut indexer = Indexer::create(dir, config).unwrap();
    for (i, (name, words)) in docs.iter().enumerate() {
        let doc_id = i as DocId + 1;
        indexer.open_document(doc_id, name).unwrap();
        for (pos, word) in words.iter().enumerate() {
            indexer.insert(word, doc_id, pos as Position).unwrap();
        }
    }
    indexer.cleanup().unwrap()
}

fn postings_of(reader: &IndexReader, term: &str) -> Vec<(DocId, Vec<Position>)> {
    reader
        .get_postings(term)
        .unwrap()
        .map(|list| list.into_entries().into_iter().map(|e| (e.doc_id, e.positions)).collect())
        .unwrap_or_default()
}

fn assert_ascending(reader: &IndexReader, term: &str) {
    if let Some(list) = reader.get_postings(term).unwrap() {
        let ids: Vec<_> = list.doc_ids().collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "{} not ascending: {:?}", term, ids);
    }
}

#[test]
fn single_segment_example() {
    let dir = TempDir::new().unwrap();
    let mut indexer = Indexer::create(dir.path(), IndexConfig::with_sizes(101, 1000)).unwrap();
    indexer.insert("cat", 1, 0).unwrap();
    indexer.insert("dog", 1, 1).unwrap();
    indexer.insert("cat", 2, 0).unwrap();
    let reader = indexer.cleanup().unwrap();

    assert_eq!(postings_of(&reader, "cat"), vec![(1, vec![0]), (2, vec![0])]);
    assert_eq!(postings_of(&reader, "dog"), vec![(1, vec![1])]);
    assert!(reader.get_postings("emu").unwrap().is_none());
}

#[test]
fn two_segment_merge_example() {
    let dir = TempDir::new().unwrap();
    let mut indexer = Indexer::create(dir.path(), IndexConfig::with_sizes(101, 1000)).unwrap();
    indexer.insert("cat", 1, 0).unwrap();
    assert_eq!(indexer.flush().unwrap(), Some(1));
    indexer.insert("cat", 5, 2).unwrap();
    let reader = indexer.cleanup().unwrap();

    assert_eq!(postings_of(&reader, "cat"), vec![(1, vec![0]), (5, vec![2])]);
    assert_eq!(reader.meta().unwrap().generations, 2);
}

#[test]
fn disjoint_ranges_merge_to_union() {
    let dir = TempDir::new().unwrap();
    let mut indexer = Indexer::create(dir.path(), IndexConfig::with_sizes(101, 1000)).unwrap();
    for doc in 1..=3 {
        indexer.insert("shared", doc, doc * 10).unwrap();
        indexer.insert("low", doc, 1).unwrap();
    }
    indexer.flush().unwrap();
    for doc in 4..=6 {
        indexer.insert("shared", doc, doc * 10).unwrap();
        indexer.insert("shared", doc, doc * 10 + 1).unwrap();
        indexer.insert("high", doc, 2).unwrap();
    }
    let reader = indexer.cleanup().unwrap();

    let shared = postings_of(&reader, "shared");
    assert_eq!(
        shared.iter().map(|(d, _)| *d).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5, 6]
    );
    assert_eq!(shared[4], (5, vec![50, 51]));
    assert_eq!(postings_of(&reader, "low").len(), 3);
    assert_eq!(postings_of(&reader, "high").len(), 3);
}

#[test]
fn cascaded_merges_equal_single_segment() {
    let docs = corpus(40, 30);

    let many = TempDir::new().unwrap();
    let merged = build(many.path(), IndexConfig::with_sizes(211, 7), &docs);
    assert!(merged.meta().unwrap().generations > 3);

    let one = TempDir::new().unwrap();
    let single = build(one.path(), IndexConfig::with_sizes(211, 100_000), &docs);
    assert_eq!(single.meta().unwrap().generations, 1);

    for term in VOCABULARY {
        assert_eq!(postings_of(&merged, term), postings_of(&single, term), "term {}", term);
        assert_ascending(&merged, term);
    }
    assert_eq!(merged.term_count().unwrap(), single.term_count().unwrap());
    assert_eq!(
        merged.doc_lengths().collect::<Vec<_>>(),
        single.doc_lengths().collect::<Vec<_>>()
    );
    assert_eq!(merged.doc_count(), 40);
    assert_eq!(merged.doc_name(40), Some("doc040.txt"));
}

#[test]
fn document_spanning_a_flush() {
    let dir = TempDir::new().unwrap();
    let mut indexer = Indexer::create(dir.path(), IndexConfig::with_sizes(101, 3)).unwrap();
    indexer.open_document(1, "long.txt").unwrap();
    for (pos, word) in ["cat", "dog", "emu", "cat", "fox"].iter().enumerate() {
        indexer.insert(word, 1, pos as Position).unwrap();
    }
    assert_eq!(indexer.generation(), 1);
    let reader = indexer.cleanup().unwrap();

    // One group per docID even though doc 1 spans both segments
    assert_eq!(postings_of(&reader, "cat"), vec![(1, vec![0, 3])]);
    assert_eq!(reader.doc_count(), 1);
    assert_eq!(reader.doc_name(1), Some("long.txt"));
    assert_eq!(reader.doc_length(1), Some(5));

    let doc_info = fs::read_to_string(dir.path().join(DOCINFO_FNAME)).unwrap();
    assert_eq!(doc_info, "1;long.txt;5\n");
}

#[test]
fn empty_flush_is_noop() {
    let dir = TempDir::new().unwrap();
    let mut indexer = Indexer::create(dir.path(), IndexConfig::with_sizes(101, 1000)).unwrap();
    assert_eq!(indexer.flush().unwrap(), None);
    assert_eq!(indexer.flush().unwrap(), None);
    assert!(!generation_path(dir.path(), DICTIONARY_FNAME, 1).exists());

    let reader = indexer.cleanup().unwrap();
    assert_eq!(reader.term_count().unwrap(), 0);
    assert_eq!(reader.doc_count(), 0);
    assert_eq!(reader.meta().unwrap().generations, 0);
    assert!(reader.get_postings("cat").unwrap().is_none());
}

#[test]
fn colliding_terms_both_retrievable() {
    let table_size = 13;
    let (first, second) = ('a'..='z')
        .flat_map(|a| ('a'..='z').map(move |b| (a.to_string(), b.to_string())))
        .find(|(a, b)| a < b && home_slot(a, table_size) == home_slot(b, table_size))
        .unwrap();

    let dir = TempDir::new().unwrap();
    let mut indexer =
        Indexer::create(dir.path(), IndexConfig::with_sizes(table_size, 1000)).unwrap();
    indexer.insert(&first, 1, 0).unwrap();
    indexer.insert(&second, 1, 1).unwrap();
    let reader = indexer.cleanup().unwrap();

    assert_eq!(postings_of(&reader, &first), vec![(1, vec![0])]);
    assert_eq!(postings_of(&reader, &second), vec![(1, vec![1])]);

    let home = home_slot(&first, table_size);
    let (slot_a, _) = reader.dictionary().locate(&first, reader.data()).unwrap().unwrap();
    let (slot_b, _) = reader.dictionary().locate(&second, reader.data()).unwrap().unwrap();
    assert_eq!(slot_a, home);
    assert_eq!(slot_b, (home + 1) % table_size);
}

#[test]
fn capacity_exceeded_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut indexer = Indexer::create(dir.path(), IndexConfig::with_sizes(4, 1000)).unwrap();
    for (pos, term) in ["a", "b", "c", "d"].iter().enumerate() {
        indexer.insert(term, 1, pos as Position).unwrap();
    }
    let err = indexer.insert("e", 1, 4).unwrap_err();
    assert!(matches!(err, IndexError::CapacityExceeded { terms: 5, capacity: 4 }));
}

#[test]
fn merged_capacity_exceeded_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut indexer = Indexer::create(dir.path(), IndexConfig::with_sizes(3, 2)).unwrap();
    indexer.insert("a", 1, 0).unwrap();
    indexer.insert("b", 1, 1).unwrap();
    indexer.insert("c", 2, 0).unwrap();
    indexer.insert("d", 2, 1).unwrap();

    // Each segment fits, their union does not
    let err = indexer.cleanup().err().unwrap();
    assert!(matches!(err, IndexError::CapacityExceeded { capacity: 3, .. }));
}

#[test]
fn unreadable_data_reads_as_absent() {
    let dir = TempDir::new().unwrap();
    let mut indexer = Indexer::create(dir.path(), IndexConfig::with_sizes(31, 1000)).unwrap();
    indexer.insert("cat", 1, 0).unwrap();
    drop(indexer.cleanup().unwrap());

    fs::write(dir.path().join(DATA_FNAME), b"").unwrap();
    let reader = IndexReader::open(dir.path()).unwrap();
    assert!(reader.get_postings("cat").unwrap().is_none());
}

#[test]
fn stored_blobs_use_the_text_codec() {
    let dir = TempDir::new().unwrap();
    let mut indexer = Indexer::create(dir.path(), IndexConfig::with_sizes(31, 1000)).unwrap();
    indexer.insert("cat", 1, 0).unwrap();
    indexer.insert("cat", 1, 4).unwrap();
    indexer.insert("cat", 7, 2).unwrap();
    drop(indexer.cleanup().unwrap());

    let data = fs::read_to_string(dir.path().join(DATA_FNAME)).unwrap();
    assert_eq!(data, "cat 1:0,4.7:2");

    let (term, list) = postings::decode(&data).unwrap();
    assert_eq!(term, "cat");
    assert_eq!(postings::encode(&term, &list), data);
}

#[test]
fn segment_files_removed_after_cleanup() {
    let dir = TempDir::new().unwrap();
    let docs = corpus(10, 20);
    drop(build(dir.path(), IndexConfig::with_sizes(101, 5), &docs));

    let mut names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["data", "dictionary", "docInfo", "meta.json"]);
}

#[test]
fn concurrent_lookups_see_every_term() {
    let dir = TempDir::new().unwrap();
    let mut indexer = Indexer::create(dir.path(), IndexConfig::with_sizes(4001, 500)).unwrap();
    indexer.open_document(1, "many.txt").unwrap();
    for i in 0..2000u32 {
        indexer.insert(&format!("term{}", i), 1, i).unwrap();
    }
    let reader = Arc::new(indexer.cleanup().unwrap());

    let workers: Vec<_> = (0..8u32)
        .map(|worker| {
            let reader = Arc::clone(&reader);
            thread::spawn(move || {
                let mut wrong = 0;
                for round in 0..2000u32 {
                    let i = (round * 7 + worker * 251) % 2000;
                    if postings_of(&reader, &format!("term{}", i)) != vec![(1, vec![i])] {
                        wrong += 1;
                    }
                }
                wrong
            })
        })
        .collect();

    let wrong: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(wrong, 0);
}
