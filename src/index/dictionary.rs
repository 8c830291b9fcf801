//! On-disk open-addressed hashtable mapping terms to postings blobs.
//!
//! The table is a fixed number of 13-byte slots:
//!
//! ```text
//! [marker: u8][offset: u64 LE][length: u32 LE]
//! ```
//!
//! The term itself is not stored in the slot. A probe resolves the term of an
//! occupied slot by reading the leading token of the blob it points to. A slot
//! whose marker is not [`VALID_MARKER`] is empty; a fresh table is zero-filled.
//!
//! A table being written is accessed through positional file reads. A
//! committed table opened with [`DictionaryStore::open`] is memory-mapped, so
//! one store can serve lookups from many threads.

use crate::error::{IndexError, Result};
use crate::index::data::{BlobRead, read_exact_at};
use crate::index::postings::leading_term;
use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Size of one dictionary slot in bytes
pub const RECORD_LEN: u64 = 1 + 8 + 4;

/// Marker byte of an occupied slot
pub const VALID_MARKER: u8 = 75;

/// Pointer from a dictionary slot into the data store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictEntry {
    pub offset: u64,
    pub length: u32,
}

impl DictEntry {
    pub fn new(offset: u64, length: u32) -> Self {
        Self { offset, length }
    }

    pub fn encode(&self) -> [u8; RECORD_LEN as usize] {
        let mut buf = [0u8; RECORD_LEN as usize];
        buf[0] = VALID_MARKER;
        buf[1..9].copy_from_slice(&self.offset.to_le_bytes());
        buf[9..13].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Decode a raw slot; `None` for an empty or corrupt slot
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RECORD_LEN as usize || buf[0] != VALID_MARKER {
            return None;
        }
        let offset = u64::from_le_bytes(buf[1..9].try_into().ok()?);
        let length = u32::from_le_bytes(buf[9..13].try_into().ok()?);
        Some(Self { offset, length })
    }
}

/// Polynomial hash over the term's characters, base 101.
///
/// Overflow wraps; the absolute value is taken before reduction.
pub fn term_hash(term: &str) -> u64 {
    term.chars()
        .fold(0i64, |h, c| h.wrapping_mul(101).wrapping_add(c as i64))
        .unsigned_abs()
}

/// First slot probed for `term`
pub fn home_slot(term: &str, table_size: u64) -> u64 {
    term_hash(term) % table_size
}

/// Result of comparing a probed slot against a term
enum SlotMatch {
    Same,
    Different,
    /// Blob missing or headerless; the slot counts as empty
    Unreadable,
}

/// Backing storage of the slot array
enum Slots {
    /// Table under construction
    File(File),
    /// Committed, read-only table
    Mapped(Mmap),
}

/// Fixed-size on-disk hashtable
pub struct DictionaryStore {
    path: PathBuf,
    slots: Slots,
    table_size: u64,
    /// Slots filled through this handle
    occupied: u64,
    /// Probe collisions seen by [`DictionaryStore::write`]
    collisions: u64,
}

impl DictionaryStore {
    /// Create an empty table of `table_size` slots, truncating any previous file
    pub fn create(path: &Path, table_size: u64) -> Result<Self> {
        if table_size == 0 {
            return Err(IndexError::config("dictionary table_size must be at least 1"));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(table_size * RECORD_LEN)?;

        Ok(Self {
            path: path.to_path_buf(),
            slots: Slots::File(file),
            table_size,
            occupied: 0,
            collisions: 0,
        })
    }

    /// Map an existing table read-only; the slot count comes from the file length
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let table_size = file.metadata()?.len() / RECORD_LEN;
        if table_size == 0 {
            return Err(IndexError::config(format!(
                "{} holds no dictionary slots",
                path.display()
            )));
        }

        // SAFETY: committed tables are replaced by rename, never rewritten in place
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self {
            path: path.to_path_buf(),
            slots: Slots::Mapped(mmap),
            table_size,
            occupied: 0,
            collisions: 0,
        })
    }

    pub fn table_size(&self) -> u64 {
        self.table_size
    }

    /// Terms written through this handle
    pub fn len(&self) -> u64 {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Total probe collisions while writing through this handle
    pub fn collisions(&self) -> u64 {
        self.collisions
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the raw record in `slot` (byte offset `slot * RECORD_LEN`).
    ///
    /// Used for sequential scans; no blob is read.
    pub fn read_at(&self, slot: u64) -> Result<Option<DictEntry>> {
        if slot >= self.table_size {
            return Ok(None);
        }

        let start = slot * RECORD_LEN;
        match &self.slots {
            Slots::Mapped(mmap) => {
                let record = usize::try_from(start)
                    .ok()
                    .and_then(|start| mmap.get(start..start + RECORD_LEN as usize));
                Ok(record.and_then(DictEntry::decode))
            }
            Slots::File(file) => {
                let mut buf = [0u8; RECORD_LEN as usize];
                match read_exact_at(file, &mut buf, start) {
                    Ok(()) => Ok(DictEntry::decode(&buf)),
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn write_slot(&mut self, slot: u64, entry: DictEntry) -> Result<()> {
        let Slots::File(file) = &mut self.slots else {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is opened read-only", self.path.display()),
            )
            .into());
        };
        file.seek(SeekFrom::Start(slot * RECORD_LEN))?;
        file.write_all(&entry.encode())?;
        Ok(())
    }

    fn compare<B: BlobRead>(&self, entry: DictEntry, term: &str, data: &B) -> Result<SlotMatch> {
        let Some(blob) = data.read_blob(entry.offset, entry.length)? else {
            return Ok(SlotMatch::Unreadable);
        };
        Ok(match leading_term(&blob) {
            Some(stored) if stored == term.as_bytes() => SlotMatch::Same,
            Some(_) => SlotMatch::Different,
            None => SlotMatch::Unreadable,
        })
    }

    /// Insert `term` pointing at `entry`.
    ///
    /// Probes linearly from the term's home slot past slots holding other
    /// terms, and writes into the first empty slot (or over the slot already
    /// holding `term`). Returns the collisions met on the way.
    pub fn write<B: BlobRead>(&mut self, term: &str, entry: DictEntry, data: &B) -> Result<u64> {
        let mut slot = home_slot(term, self.table_size);
        let mut collisions = 0;

        for _ in 0..self.table_size {
            match self.read_at(slot)? {
                None => {
                    if self.occupied >= self.table_size {
                        break;
                    }
                    self.write_slot(slot, entry)?;
                    self.occupied += 1;
                    self.collisions += collisions;
                    return Ok(collisions);
                }
                Some(existing) => match self.compare(existing, term, data)? {
                    SlotMatch::Same => {
                        self.write_slot(slot, entry)?;
                        self.collisions += collisions;
                        return Ok(collisions);
                    }
                    SlotMatch::Unreadable => {
                        warn!(slot, path = %self.path.display(), "overwriting unreadable dictionary slot");
                        self.write_slot(slot, entry)?;
                        self.collisions += collisions;
                        return Ok(collisions);
                    }
                    SlotMatch::Different => {
                        collisions += 1;
                        slot = (slot + 1) % self.table_size;
                    }
                },
            }
        }

        Err(IndexError::CapacityExceeded {
            terms: self.occupied + 1,
            capacity: self.table_size,
        })
    }

    /// Find the slot holding `term`
    pub fn locate<B: BlobRead>(&self, term: &str, data: &B) -> Result<Option<(u64, DictEntry)>> {
        let mut slot = home_slot(term, self.table_size);

        for _ in 0..self.table_size {
            let Some(entry) = self.read_at(slot)? else {
                return Ok(None);
            };
            match self.compare(entry, term, data)? {
                SlotMatch::Same => return Ok(Some((slot, entry))),
                SlotMatch::Different => slot = (slot + 1) % self.table_size,
                SlotMatch::Unreadable => return Ok(None),
            }
        }

        Ok(None)
    }

    /// Look up the blob pointer for `term`
    pub fn read<B: BlobRead>(&self, term: &str, data: &B) -> Result<Option<DictEntry>> {
        Ok(self.locate(term, data)?.map(|(_, entry)| entry))
    }

    /// Iterate over every valid slot in table order
    pub fn scan(&self) -> Result<DictScan> {
        // Own handle so the scan cursor is independent of probe seeks
        let file = File::open(&self.path)?;

        Ok(DictScan {
            reader: BufReader::with_capacity(64 * 1024, file),
            slot: 0,
            table_size: self.table_size,
        })
    }

    /// Flush the table to disk
    pub fn sync(&self) -> Result<()> {
        if let Slots::File(file) = &self.slots {
            file.sync_data()?;
        }
        Ok(())
    }
}

/// Sequential scan over a dictionary's occupied slots
pub struct DictScan {
    reader: BufReader<File>,
    slot: u64,
    table_size: u64,
}

impl Iterator for DictScan {
    type Item = Result<(u64, DictEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = [0u8; RECORD_LEN as usize];

        while self.slot < self.table_size {
            let slot = self.slot;
            self.slot += 1;

            match self.reader.read_exact(&mut buf) {
                Ok(()) => {
                    if let Some(entry) = DictEntry::decode(&buf) {
                        return Some(Ok((slot, entry)));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.slot = self.table_size;
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            }
        }

        None
    }
}
