//! Committed-count header for a segmented list.
//!
//! # Binary Format (24 bytes, little endian)
//!
//! ```text
//! magic("TRKL", 4) + record_size(4) + records_per_segment(8) + count(8)
//! ```
//!
//! The header is memory mapped and the count is rewritten after every
//! append, strictly after the record bytes are in place.

use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracker_core::{Error, Result};

/// Magic bytes identifying a list header file.
pub const LIST_MAGIC: [u8; 4] = *b"TRKL";

/// Total size of the list header in bytes.
pub const LIST_HEADER_SIZE: usize = 24;

/// File name of the header inside the list directory.
pub const LIST_HEADER_FILE: &str = "header.dat";

const COUNT_OFFSET: usize = 16;

/// Mapped list header.
pub(crate) struct ListHeader {
    mmap: MmapMut,
    path: PathBuf,
}

impl ListHeader {
    /// Open (or create) the header in `dir`, validating the record layout.
    ///
    /// A header that is entirely zero is a header whose creation was
    /// interrupted before anything was committed, and is initialized afresh.
    pub(crate) fn open(dir: &Path, record_size: usize, records_per_segment: u64) -> Result<Self> {
        let path = dir.join(LIST_HEADER_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.set_len(LIST_HEADER_SIZE as u64)?;
        } else if len != LIST_HEADER_SIZE as u64 {
            return Err(Error::corruption(format!(
                "list header '{}' has size {}, expected {}",
                path.display(),
                len,
                LIST_HEADER_SIZE
            )));
        }

        // SAFETY: the file is owned by this list for the lifetime of the
        // process (the store holds an exclusive directory lock) and is never
        // resized while mapped.
        let mmap = unsafe { MmapOptions::new().len(LIST_HEADER_SIZE).map_mut(&file)? };
        let mut header = ListHeader { mmap, path };

        if header.mmap.iter().all(|b| *b == 0) {
            header.mmap[0..4].copy_from_slice(&LIST_MAGIC);
            header.mmap[4..8].copy_from_slice(&(record_size as u32).to_le_bytes());
            header.mmap[8..16].copy_from_slice(&records_per_segment.to_le_bytes());
            header.mmap[16..24].copy_from_slice(&0u64.to_le_bytes());
            header.mmap.flush()?;
            return Ok(header);
        }

        header.validate(record_size, records_per_segment)?;
        Ok(header)
    }

    fn validate(&self, record_size: usize, records_per_segment: u64) -> Result<()> {
        if self.mmap[0..4] != LIST_MAGIC {
            return Err(Error::corruption(format!(
                "invalid list header magic in '{}'",
                self.path.display()
            )));
        }
        let stored_record_size = u32::from_le_bytes(read_array(&self.mmap[4..8]));
        if stored_record_size as usize != record_size {
            return Err(Error::invalid_config(format!(
                "list '{}' stores {} byte records, opened with {}",
                self.path.display(),
                stored_record_size,
                record_size
            )));
        }
        let stored_per_segment = u64::from_le_bytes(read_array(&self.mmap[8..16]));
        if stored_per_segment != records_per_segment {
            return Err(Error::invalid_config(format!(
                "list '{}' was created with {} records per segment, opened with {}",
                self.path.display(),
                stored_per_segment,
                records_per_segment
            )));
        }
        Ok(())
    }

    /// Committed record count.
    pub(crate) fn count(&self) -> u64 {
        u64::from_le_bytes(read_array(&self.mmap[COUNT_OFFSET..COUNT_OFFSET + 8]))
    }

    /// Store a new committed record count.
    pub(crate) fn set_count(&mut self, count: u64) {
        self.mmap[COUNT_OFFSET..COUNT_OFFSET + 8].copy_from_slice(&count.to_le_bytes());
    }

    /// Flush the header to disk.
    pub(crate) fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
