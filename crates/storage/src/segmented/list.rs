//! Fixed-record append-only list over memory-mapped segments.

use super::config::ListConfig;
use super::header::ListHeader;
use super::pool::{PoolStats, SegmentPool};
use crate::record::Record;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracker_core::{Error, Result};

/// Append-only array of fixed-size records.
///
/// Record `k` lives in segment `k / N` at byte offset `(k % N) * R::SIZE`,
/// where `N` is `records_per_segment`. The committed count is kept in a
/// separate mapped header and is updated only after the record bytes are
/// written, so `len()` never covers a record that was not written.
///
/// Appends take `&mut self`; reads take `&self` and go through the
/// internally locked segment pool, so a shared list can serve many readers.
pub struct SegmentedRecordList<R: Record> {
    dir: PathBuf,
    config: ListConfig,
    header: ListHeader,
    len: u64,
    pool: Mutex<SegmentPool>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> SegmentedRecordList<R> {
    /// Open the list stored in `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfig` if the configuration is invalid for `R` or
    ///   does not match the layout the list was created with
    /// - `Error::Corruption` if the header is malformed
    /// - `Error::IoError` on filesystem failures
    pub fn open(dir: impl AsRef<Path>, config: ListConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let segment_bytes = config.validate(R::SIZE)?;
        std::fs::create_dir_all(&dir)?;

        let header = ListHeader::open(&dir, R::SIZE, config.records_per_segment)?;
        let len = header.count();
        let pool = SegmentPool::new(dir.clone(), segment_bytes, config.max_open_segments)?;

        debug!(target: "tracker::storage", path = %dir.display(), len, "Opened segmented list");

        Ok(SegmentedRecordList {
            dir,
            config,
            header,
            len,
            pool: Mutex::new(pool),
            _record: PhantomData,
        })
    }

    /// Append a record, returning its index.
    pub fn append(&mut self, record: &R) -> Result<u64> {
        let index = self.len;
        let (segment_index, offset) = self.locate(index);
        let flush = self.config.durability.requires_immediate_flush();

        {
            let mut pool = self.pool.lock();
            let segment = pool.segment(segment_index, true)?;
            record.encode(segment.slot_mut(offset, R::SIZE));
            if flush {
                segment.flush_range(offset, R::SIZE)?;
            }
        }

        // Commit point: the count moves only after the payload is in place.
        self.header.set_count(index + 1);
        if flush {
            self.header.flush()?;
        }
        self.len = index + 1;
        Ok(index)
    }

    /// Read record `index`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `index >= len()`.
    pub fn get(&self, index: u64) -> Result<R> {
        self.check_bounds(index)?;
        let (segment_index, offset) = self.locate(index);
        let mut pool = self.pool.lock();
        let segment = pool.segment(segment_index, false)?;
        R::decode(segment.slot(offset, R::SIZE))
    }

    /// Read the raw bytes of record `index`.
    pub fn get_bytes(&self, index: u64) -> Result<Vec<u8>> {
        self.check_bounds(index)?;
        let (segment_index, offset) = self.locate(index);
        let mut pool = self.pool.lock();
        let segment = pool.segment(segment_index, false)?;
        Ok(segment.slot(offset, R::SIZE).to_vec())
    }

    /// Read the last record, if any.
    pub fn last(&self) -> Result<Option<R>> {
        match self.len {
            0 => Ok(None),
            len => self.get(len - 1).map(Some),
        }
    }

    /// Iterate records `[start, len)` in order.
    pub fn iter_from(&self, start: u64) -> Iter<'_, R> {
        Iter {
            list: self,
            next: start,
            end: self.len,
        }
    }

    /// Iterate all records in order.
    pub fn iter(&self) -> Iter<'_, R> {
        self.iter_from(0)
    }

    /// Number of committed records.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Directory holding the list files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Segment pool counters.
    pub fn stats(&self) -> PoolStats {
        self.pool.lock().stats()
    }

    /// Flush every dirty segment and the header.
    pub fn flush(&mut self) -> Result<()> {
        self.pool.lock().flush_all()?;
        self.header.flush()
    }

    /// Flush everything and release all mappings.
    pub fn close(self) -> Result<()> {
        self.pool.lock().close()?;
        self.header.flush()?;
        debug!(target: "tracker::storage", path = %self.dir.display(), len = self.len, "Closed segmented list");
        Ok(())
    }

    #[inline]
    fn locate(&self, index: u64) -> (u64, usize) {
        let per_segment = self.config.records_per_segment;
        (
            index / per_segment,
            (index % per_segment) as usize * R::SIZE,
        )
    }

    #[inline]
    fn check_bounds(&self, index: u64) -> Result<()> {
        if index >= self.len {
            return Err(Error::invalid_argument(format!(
                "record index {} out of bounds (len {})",
                index, self.len
            )));
        }
        Ok(())
    }
}

impl<R: Record> std::fmt::Debug for SegmentedRecordList<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentedRecordList")
            .field("dir", &self.dir)
            .field("len", &self.len)
            .field("record_size", &R::SIZE)
            .finish()
    }
}

/// Iterator over a range of list records.
pub struct Iter<'a, R: Record> {
    list: &'a SegmentedRecordList<R>,
    next: u64,
    end: u64,
}

impl<R: Record> Iterator for Iter<'_, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let item = self.list.get(self.next);
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::DurabilityMode;
    use tempfile::TempDir;

    fn open(dir: &Path) -> SegmentedRecordList<u64> {
        SegmentedRecordList::open(dir, ListConfig::for_testing()).unwrap()
    }

    #[test]
    fn test_append_and_get() {
        let dir = TempDir::new().unwrap();
        let mut list = open(dir.path());

        for i in 0..10u64 {
            assert_eq!(list.append(&(i * 100)).unwrap(), i);
        }
        assert_eq!(list.len(), 10);
        for i in 0..10u64 {
            assert_eq!(list.get(i).unwrap(), i * 100);
        }
        assert_eq!(list.last().unwrap(), Some(900));
    }

    #[test]
    fn test_get_bytes_returns_encoded_record() {
        let dir = TempDir::new().unwrap();
        let mut list = open(dir.path());
        list.append(&7u64).unwrap();
        assert_eq!(list.get_bytes(0).unwrap(), 7u64.to_le_bytes().to_vec());
    }

    #[test]
    fn test_out_of_bounds() {
        let dir = TempDir::new().unwrap();
        let mut list = open(dir.path());
        assert!(list.get(0).is_err());
        assert_eq!(list.last().unwrap(), None);
        list.append(&1u64).unwrap();
        assert!(matches!(list.get(1), Err(Error::InvalidArgument(_))));
        assert!(list.get_bytes(5).is_err());
    }

    #[test]
    fn test_segments_laid_out_by_index() {
        let dir = TempDir::new().unwrap();
        let mut list = open(dir.path());
        for i in 0..9u64 {
            list.append(&i).unwrap();
        }
        // 4 records per segment: segments 0, 1 and 2 exist, 3 does not
        for segment in 0..3 {
            let path = super::super::pool::Segment::path(dir.path(), segment);
            assert_eq!(std::fs::metadata(path).unwrap().len(), 32);
        }
        assert!(!super::super::pool::Segment::path(dir.path(), 3).exists());
    }

    #[test]
    fn test_pool_stays_bounded() {
        let dir = TempDir::new().unwrap();
        let mut list = open(dir.path());
        for i in 0..40u64 {
            list.append(&i).unwrap();
        }
        for i in (0..40u64).rev() {
            assert_eq!(list.get(i).unwrap(), i);
        }
        let stats = list.stats();
        assert!(stats.open_segments <= 2);
        assert!(stats.segments_evicted > 0);
    }

    #[test]
    fn test_len_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut list = open(dir.path());
            for i in 0..6u64 {
                list.append(&(i + 1)).unwrap();
            }
            list.close().unwrap();
        }
        let mut list = open(dir.path());
        assert_eq!(list.len(), 6);
        assert_eq!(list.append(&99).unwrap(), 6);
        let all: Vec<u64> = list.iter().collect::<Result<_>>().unwrap();
        assert_eq!(all, vec![1, 2, 3, 4, 5, 6, 99]);
    }

    #[test]
    fn test_reopen_without_close() {
        let dir = TempDir::new().unwrap();
        {
            let mut list = open(dir.path());
            list.append(&11u64).unwrap();
            list.append(&12u64).unwrap();
            // dropped without close: shared mappings are written back by the OS
        }
        let list = open(dir.path());
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1).unwrap(), 12);
    }

    #[test]
    fn test_always_mode() {
        let dir = TempDir::new().unwrap();
        let config = ListConfig::for_testing().with_durability(DurabilityMode::Always);
        let mut list: SegmentedRecordList<u64> =
            SegmentedRecordList::open(dir.path(), config).unwrap();
        list.append(&5u64).unwrap();
        assert_eq!(list.get(0).unwrap(), 5);
    }

    #[test]
    fn test_uncommitted_slot_is_invisible() {
        let dir = TempDir::new().unwrap();
        {
            let mut list = open(dir.path());
            list.append(&1u64).unwrap();
            list.close().unwrap();
        }
        // Simulate a crash after the payload write but before the count update
        let segment = super::super::pool::Segment::path(dir.path(), 0);
        let mut bytes = std::fs::read(&segment).unwrap();
        bytes[8..16].copy_from_slice(&2u64.to_le_bytes());
        std::fs::write(&segment, bytes).unwrap();

        let mut list = open(dir.path());
        assert_eq!(list.len(), 1);
        // The next append overwrites the orphaned slot
        assert_eq!(list.append(&3u64).unwrap(), 1);
        assert_eq!(list.get(1).unwrap(), 3);
    }

    #[test]
    fn test_iter_from() {
        let dir = TempDir::new().unwrap();
        let mut list = open(dir.path());
        for i in 0..5u64 {
            list.append(&i).unwrap();
        }
        let tail: Vec<u64> = list.iter_from(3).collect::<Result<_>>().unwrap();
        assert_eq!(tail, vec![3, 4]);
        assert_eq!(list.iter_from(9).count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let config = ListConfig::new().with_records_per_segment(u64::MAX);
        let result: Result<SegmentedRecordList<u64>> = SegmentedRecordList::open(dir.path(), config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
