//! Append-only postings data file.
//!
//! Blobs are written at the free pointer, which only ever moves forward.
//! Nothing is updated in place and bytes are never reused.

use crate::error::Result;
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Random access to postings blobs.
///
/// The dictionary resolves the term stored in a slot through this trait, so
/// the same probe code runs against a file being written and a read-only
/// memory map.
pub trait BlobRead {
    /// Bytes in `[offset, offset + length)`, or `None` when the range lies
    /// outside the written part of the file.
    fn read_blob(&self, offset: u64, length: u32) -> Result<Option<Cow<'_, [u8]>>>;
}

/// Fill `buf` from `offset` without touching the shared file cursor.
///
/// Readers hold `&File`, so seek-then-read would race between threads.
#[cfg(unix)]
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
pub(crate) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Writable append-only data store
pub struct DataStore {
    path: PathBuf,
    file: File,
    free: u64,
}

impl DataStore {
    /// Create an empty data file, truncating any previous content
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            free: 0,
        })
    }

    /// Open an existing data file read-only; the free pointer is its length
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let free = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            free,
        })
    }

    /// Append a blob, returning its offset and length
    pub fn append(&mut self, bytes: &[u8]) -> Result<(u64, u32)> {
        let length = u32::try_from(bytes.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "postings blob exceeds 4 GiB")
        })?;

        let offset = self.free;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        self.free += length as u64;

        Ok((offset, length))
    }

    /// Read a blob previously returned by [`DataStore::append`]
    pub fn read(&self, offset: u64, length: u32) -> Result<Option<Vec<u8>>> {
        let end = match offset.checked_add(length as u64) {
            Some(end) if end <= self.free => end,
            _ => return Ok(None),
        };

        let mut buf = vec![0u8; (end - offset) as usize];
        match read_exact_at(&self.file, &mut buf, offset) {
            Ok(()) => Ok(Some(buf)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Next append offset
    pub fn free(&self) -> u64 {
        self.free
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush file contents to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

impl BlobRead for DataStore {
    fn read_blob(&self, offset: u64, length: u32) -> Result<Option<Cow<'_, [u8]>>> {
        Ok(self.read(offset, length)?.map(Cow::Owned))
    }
}

/// Read-only memory-mapped data file used by the query side
pub struct MappedData {
    mmap: Option<Mmap>,
}

impl MappedData {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self { mmap: None });
        }

        // SAFETY: committed data files are never modified while a reader is attached
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap: Some(mmap) })
    }

    pub fn len(&self) -> u64 {
        self.mmap.as_ref().map_or(0, |m| m.len() as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow a blob without copying
    pub fn slice(&self, offset: u64, length: u32) -> Option<&[u8]> {
        let mmap = self.mmap.as_ref()?;
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(length as usize)?;
        mmap.get(start..end)
    }
}

impl BlobRead for MappedData {
    fn read_blob(&self, offset: u64, length: u32) -> Result<Option<Cow<'_, [u8]>>> {
        Ok(self.slice(offset, length).map(Cow::Borrowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_advances_free_pointer() {
        let dir = TempDir::new().unwrap();
        let mut store = DataStore::create(&dir.path().join("data1")).unwrap();

        assert_eq!(store.append(b"cat 1:0").unwrap(), (0, 7));
        assert_eq!(store.append(b"dog 1:1").unwrap(), (7, 7));
        assert_eq!(store.free(), 14);

        assert_eq!(store.read(7, 7).unwrap().unwrap(), b"dog 1:1");
        assert_eq!(store.read(0, 7).unwrap().unwrap(), b"cat 1:0");
    }

    #[test]
    fn test_read_past_free_pointer_is_absent() {
        let dir = TempDir::new().unwrap();
        let mut store = DataStore::create(&dir.path().join("data1")).unwrap();
        store.append(b"abc").unwrap();

        assert!(store.read(1, 10).unwrap().is_none());
        assert!(store.read(u64::MAX, 2).unwrap().is_none());
    }

    #[test]
    fn test_mapped_data_matches_written_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        let mut store = DataStore::create(&path).unwrap();
        store.append(b"cat 1:0").unwrap();
        store.append(b"dog 2:3").unwrap();
        store.sync().unwrap();
        drop(store);

        let mapped = MappedData::open(&path).unwrap();
        assert_eq!(mapped.slice(7, 7), Some(&b"dog 2:3"[..]));
        assert_eq!(mapped.slice(10, 7), None);
    }

    #[test]
    fn test_mapped_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        DataStore::create(&path).unwrap();

        let mapped = MappedData::open(&path).unwrap();
        assert!(mapped.is_empty());
        assert!(mapped.read_blob(0, 1).unwrap().is_none());
    }
}
