//! Segment files and the bounded pool of mapped segments.
//!
//! Segments are named `segment-NNNNNNNN.dat` inside the list directory.
//! A segment file is created with exactly `records_per_segment * record_size`
//! bytes the first time a record is written into it.
//!
//! The pool keeps at most `max_open_segments` mappings alive. Eviction is
//! least-recently-used and flushes a dirty segment before unmapping it, so
//! every write that left the pool is on disk.

use lru::LruCache;
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracker_core::{Error, Result};

/// Cumulative segment pool counters.
///
/// These counters accumulate over the lifetime of the list and are never
/// reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Segments mapped (cache misses)
    pub segments_opened: u64,
    /// Segments unmapped because the pool was full
    pub segments_evicted: u64,
    /// Segment flushes performed (eviction, explicit flush, close)
    pub flushes: u64,
    /// Segments currently mapped
    pub open_segments: usize,
}

/// One mapped segment file.
pub(crate) struct Segment {
    index: u64,
    mmap: MmapMut,
    dirty: bool,
}

impl Segment {
    /// Path of segment `index` inside `dir`.
    pub(crate) fn path(dir: &Path, index: u64) -> PathBuf {
        dir.join(format!("segment-{:08}.dat", index))
    }

    /// Map segment `index`, creating the file when `create` is set.
    fn open(dir: &Path, index: u64, segment_bytes: usize, create: bool) -> Result<Self> {
        let path = Self::path(dir, index);
        if !create && !path.exists() {
            return Err(Error::corruption(format!(
                "segment file '{}' is missing",
                path.display()
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.set_len(segment_bytes as u64)?;
        } else if len != segment_bytes as u64 {
            return Err(Error::corruption(format!(
                "segment file '{}' has size {}, expected {}",
                path.display(),
                len,
                segment_bytes
            )));
        }

        // SAFETY: segment files are private to this list (the store holds an
        // exclusive directory lock) and are never truncated while mapped.
        let mmap = unsafe { MmapOptions::new().len(segment_bytes).map_mut(&file)? };

        debug!(target: "tracker::storage", segment = index, path = %path.display(), "Mapped segment");

        Ok(Segment {
            index,
            mmap,
            dirty: false,
        })
    }

    /// Borrow `len` bytes at `offset`.
    #[inline]
    pub(crate) fn slot(&self, offset: usize, len: usize) -> &[u8] {
        &self.mmap[offset..offset + len]
    }

    /// Mutably borrow `len` bytes at `offset`, marking the segment dirty.
    #[inline]
    pub(crate) fn slot_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        self.dirty = true;
        &mut self.mmap[offset..offset + len]
    }

    /// Flush a byte range synchronously.
    pub(crate) fn flush_range(&self, offset: usize, len: usize) -> Result<()> {
        self.mmap.flush_range(offset, len)?;
        Ok(())
    }

    /// Flush the whole segment if it has unflushed writes.
    ///
    /// Returns `true` if a flush was performed.
    fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.mmap.flush()?;
        self.dirty = false;
        Ok(true)
    }
}

/// Bounded LRU pool of mapped segments.
pub(crate) struct SegmentPool {
    dir: PathBuf,
    segment_bytes: usize,
    cache: LruCache<u64, Segment>,
    stats: PoolStats,
}

impl SegmentPool {
    pub(crate) fn new(dir: PathBuf, segment_bytes: usize, capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::invalid_config("segment pool capacity must be non-zero"))?;
        Ok(SegmentPool {
            dir,
            segment_bytes,
            cache: LruCache::new(capacity),
            stats: PoolStats::default(),
        })
    }

    /// Get segment `index`, mapping it on a miss.
    ///
    /// A miss on a full pool evicts the least recently used segment and
    /// flushes it before it is unmapped. A failed flush is surfaced to the
    /// caller; the evicted mapping is still released.
    pub(crate) fn segment(&mut self, index: u64, create: bool) -> Result<&mut Segment> {
        if !self.cache.contains(&index) {
            let segment = Segment::open(&self.dir, index, self.segment_bytes, create)?;
            self.stats.segments_opened += 1;
            if let Some((_, mut evicted)) = self.cache.push(index, segment) {
                self.stats.segments_evicted += 1;
                debug!(target: "tracker::storage", segment = evicted.index, "Evicting segment");
                if evicted.flush()? {
                    self.stats.flushes += 1;
                }
            }
        }
        self.cache
            .get_mut(&index)
            .ok_or_else(|| Error::storage(format!("segment {} missing from pool", index)))
    }

    /// Flush every dirty mapped segment.
    pub(crate) fn flush_all(&mut self) -> Result<()> {
        for (_, segment) in self.cache.iter_mut() {
            if segment.flush()? {
                self.stats.flushes += 1;
            }
        }
        Ok(())
    }

    /// Flush and unmap every segment.
    pub(crate) fn close(&mut self) -> Result<()> {
        self.flush_all()?;
        self.cache.clear();
        Ok(())
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            open_segments: self.cache.len(),
            ..self.stats
        }
    }
}
