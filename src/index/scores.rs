//! Authority scores: `docID;score` lines keyed by the docInfo docID space.
//!
//! The table is produced by a separate batch job and only loaded here.

use crate::error::{IndexError, Result};
use crate::index::types::DocId;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct AuthorityScores {
    scores: HashMap<DocId, f64>,
}

impl AuthorityScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc_id: DocId, score: f64) {
        self.scores.insert(doc_id, score);
    }

    pub fn get(&self, doc_id: DocId) -> Option<f64> {
        self.scores.get(&doc_id).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut table = Self::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let corrupt = |reason: &str| IndexError::CorruptTable {
                table: "scores",
                line: i + 1,
                reason: reason.to_string(),
            };

            let (id, score) = line.split_once(';').ok_or_else(|| corrupt("missing separator"))?;
            let doc_id = id.trim().parse().map_err(|_| corrupt("bad docID"))?;
            let score: f64 = score.trim().parse().map_err(|_| corrupt("bad score"))?;
            if !score.is_finite() {
                return Err(corrupt("score is not finite"));
            }
            table.insert(doc_id, score);
        }

        Ok(table)
    }

    /// Write in ascending docID order
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut ids: Vec<_> = self.scores.keys().copied().collect();
        ids.sort_unstable();

        let mut out = BufWriter::new(File::create(path)?);
        for id in ids {
            writeln!(out, "{};{}", id, self.scores[&id])?;
        }
        out.flush()?;
        Ok(())
    }
}
