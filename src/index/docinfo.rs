//! Document records: `docID;docName;docLength` lines.
//!
//! Each flush writes the records it completed to a per-generation file,
//! which is then appended to the committed `docInfo` file of the index.

use crate::error::{IndexError, Result};
use crate::index::types::{DocId, DocRecord};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const FIELD_SEPARATOR: char = ';';

/// Whether `name` fits on one docInfo line
pub fn is_valid_name(name: &str) -> bool {
    !name.contains(['\n', '\r'])
}

/// Format one record as a docInfo line (with trailing newline)
pub fn format_line(record: &DocRecord) -> String {
    format!(
        "{}{sep}{}{sep}{}\n",
        record.doc_id,
        record.name,
        record.length,
        sep = FIELD_SEPARATOR
    )
}

/// Parse one docInfo line. The name may itself contain `;`.
pub fn parse_line(line: &str, line_no: usize) -> Result<DocRecord> {
    let corrupt = |reason: &str| IndexError::CorruptTable {
        table: "docInfo",
        line: line_no,
        reason: reason.to_string(),
    };

    let (id, rest) = line
        .split_once(FIELD_SEPARATOR)
        .ok_or_else(|| corrupt("missing fields"))?;
    let (name, length) = rest
        .rsplit_once(FIELD_SEPARATOR)
        .ok_or_else(|| corrupt("missing length"))?;

    Ok(DocRecord {
        doc_id: id.trim().parse().map_err(|_| corrupt("bad docID"))?,
        name: name.to_string(),
        length: length.trim().parse().map_err(|_| corrupt("bad length"))?,
    })
}

/// docID -> record table
#[derive(Debug, Clone, Default)]
pub struct DocInfoTable {
    records: BTreeMap<DocId, DocRecord>,
}

impl DocInfoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document on first sighting; later calls keep the first name
    pub fn open_document(&mut self, doc_id: DocId, name: &str) {
        self.records
            .entry(doc_id)
            .or_insert_with(|| DocRecord::new(doc_id, name));
    }

    /// Count one indexed token for `doc_id`
    pub fn record_token(&mut self, doc_id: DocId) {
        self.records
            .entry(doc_id)
            .or_insert_with(|| DocRecord::new(doc_id, doc_id.to_string()))
            .length += 1;
    }

    pub fn insert(&mut self, record: DocRecord) {
        self.records.insert(record.doc_id, record);
    }

    pub fn get(&self, doc_id: DocId) -> Option<&DocRecord> {
        self.records.get(&doc_id)
    }

    pub fn name(&self, doc_id: DocId) -> Option<&str> {
        self.records.get(&doc_id).map(|r| r.name.as_str())
    }

    pub fn length(&self, doc_id: DocId) -> Option<u32> {
        self.records.get(&doc_id).map(|r| r.length)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending docID order
    pub fn iter(&self) -> impl Iterator<Item = &DocRecord> {
        self.records.values()
    }

    /// Remove and return every record, keeping `retain` in the table
    pub fn drain_except(&mut self, retain: Option<DocId>) -> Vec<DocRecord> {
        let kept = retain.and_then(|id| self.records.remove(&id));
        let drained = std::mem::take(&mut self.records).into_values().collect();
        if let Some(record) = kept {
            self.records.insert(record.doc_id, record);
        }
        drained
    }

    /// Load a docInfo file; a missing file is an empty table
    pub fn load(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };

        let mut table = Self::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            table.insert(parse_line(&line, i + 1)?);
        }
        Ok(table)
    }
}

/// Write records to a fresh docInfo file, returning the number written
pub fn write_records<'a, I>(path: &Path, records: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a DocRecord>,
{
    let mut out = BufWriter::new(File::create(path)?);
    let mut count = 0;
    for record in records {
        out.write_all(format_line(record).as_bytes())?;
        count += 1;
    }
    out.flush()?;
    Ok(count)
}

/// Append the lines of `src` to `dst`, creating `dst` if needed
pub fn append_file(src: &Path, dst: &Path) -> Result<u64> {
    let mut input = BufReader::new(File::open(src)?);
    let mut output = BufWriter::new(OpenOptions::new().create(true).append(true).open(dst)?);
    let copied = io::copy(&mut input, &mut output)?;
    output.flush()?;
    Ok(copied)
}
