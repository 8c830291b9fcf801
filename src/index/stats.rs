use crate::index::dictionary::{RECORD_LEN, home_slot};
use crate::index::postings::leading_term;
use crate::index::reader::IndexReader;
use crate::index::types::*;
use anyhow::{Context, Result};
use std::path::Path;

/// Summary of a committed index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStats {
    pub doc_count: usize,
    pub term_count: u64,
    pub table_size: u64,
    /// Postings entries (term, document pairs)
    pub postings: u64,
    /// Total indexed token occurrences
    pub positions: u64,
    /// Slots whose blob could not be resolved
    pub unreadable_slots: u64,
    /// Sum of distances from each term's home slot
    pub total_probe_distance: u64,
    pub max_probe_distance: u64,
    pub dictionary_bytes: u64,
    pub data_bytes: u64,
    pub docinfo_bytes: u64,
}

impl IndexStats {
    pub fn load_factor(&self) -> f64 {
        if self.table_size == 0 {
            return 0.0;
        }
        self.term_count as f64 / self.table_size as f64
    }

    pub fn avg_probe_distance(&self) -> f64 {
        if self.term_count == 0 {
            return 0.0;
        }
        self.total_probe_distance as f64 / self.term_count as f64
    }
}

/// Scan the dictionary of `reader` and gather statistics
pub fn collect_stats(reader: &IndexReader) -> Result<IndexStats> {
    let dictionary = reader.dictionary();
    let data = reader.data();
    let table_size = dictionary.table_size();

    let mut stats = IndexStats {
        doc_count: reader.doc_count(),
        table_size,
        dictionary_bytes: table_size * RECORD_LEN,
        data_bytes: data.len(),
        ..Default::default()
    };

    for item in dictionary.scan().context("Failed to scan dictionary")? {
        let (slot, entry) = item?;
        let term = data
            .slice(entry.offset, entry.length)
            .and_then(leading_term)
            .and_then(|t| std::str::from_utf8(t).ok());
        let Some(term) = term else {
            stats.unreadable_slots += 1;
            continue;
        };

        let home = home_slot(term, table_size);
        let distance = (slot + table_size - home) % table_size;
        stats.term_count += 1;
        stats.total_probe_distance += distance;
        stats.max_probe_distance = stats.max_probe_distance.max(distance);

        if let Some(list) = reader.get_postings(term)? {
            stats.postings += list.len() as u64;
            stats.positions += list.iter().map(|e| e.frequency() as u64).sum::<u64>();
        }
    }

    stats.docinfo_bytes = std::fs::metadata(reader.index_dir().join(DOCINFO_FNAME))
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(stats)
}

/// Display index statistics
pub fn show_stats(index_dir: &Path) -> Result<()> {
    let reader = IndexReader::open(index_dir)
        .with_context(|| format!("Failed to open index at {}", index_dir.display()))?;
    let stats = collect_stats(&reader)?;

    println!("Index Statistics");
    println!("================");
    println!();
    println!("Index location:   {}", index_dir.display());
    if let Some(meta) = reader.meta() {
        println!("Index version:    {}", meta.version);
        println!("Segments flushed: {}", meta.generations);
    }
    println!("Document count:   {}", stats.doc_count);
    println!("Term count:       {}", stats.term_count);
    println!("Postings:         {}", stats.postings);
    println!("Positions:        {}", stats.positions);
    if reader.has_scores() {
        println!("Authority scores: loaded");
    }

    println!();
    println!("Table size:       {}", stats.table_size);
    println!("Load factor:      {:.3}", stats.load_factor());
    println!("Avg probe:        {:.3}", stats.avg_probe_distance());
    println!("Max probe:        {}", stats.max_probe_distance);
    if stats.unreadable_slots > 0 {
        println!("Unreadable slots: {}", stats.unreadable_slots);
    }

    println!();
    println!("Dictionary size:  {}", format_size(stats.dictionary_bytes));
    println!("Data size:        {}", format_size(stats.data_bytes));
    println!("DocInfo size:     {}", format_size(stats.docinfo_bytes));

    if let Some(meta) = reader.meta() {
        println!();
        println!("Created:          {}", format_timestamp(meta.created_at));
        println!("Updated:          {}", format_timestamp(meta.updated_at));
    }

    Ok(())
}

/// Format byte size to human readable
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn format_timestamp(ts: u64) -> String {
    use std::time::{Duration, UNIX_EPOCH};
    let datetime = UNIX_EPOCH + Duration::from_secs(ts);
    format!("{:?}", datetime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::writer::Indexer;
    use tempfile::TempDir;

    #[test]
    fn test_collect_stats() {
        let dir = TempDir::new().unwrap();
        let mut indexer = Indexer::create(dir.path(), IndexConfig::with_sizes(5, 100)).unwrap();
        indexer.open_document(1, "a.txt").unwrap();
        for (pos, term) in ["a", "f", "k", "a"].iter().enumerate() {
            indexer.insert(term, 1, pos as Position).unwrap();
        }
        let reader = indexer.cleanup().unwrap();

        let stats = collect_stats(&reader).unwrap();
        assert_eq!(stats.doc_count, 1);
        assert_eq!(stats.term_count, 3);
        assert_eq!(stats.postings, 3);
        assert_eq!(stats.positions, 4);
        assert_eq!(stats.dictionary_bytes, 5 * 13);
        assert!((stats.load_factor() - 0.6).abs() < 1e-9);
        // "a", "f" and "k" share a home slot modulo 5
        assert_eq!(stats.total_probe_distance, 3);
        assert_eq!(stats.max_probe_distance, 2);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
    }
}
