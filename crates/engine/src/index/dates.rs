//! Date markers over a time-ordered sequence
//!
//! A marker `(day, first)` records that position `first` is the first
//! element of the sequence dated `day`. Markers are appended only when the
//! day advances, so they are strictly increasing in both fields and a date
//! lookup is a binary search over them.
//!
//! An element dated before the latest marker (out-of-order ingestion) does
//! not get a marker of its own and is attributed to the latest day.

use std::path::Path;
use tracker_core::{Day, Result};
use tracker_storage::{ListConfig, Record, SegmentedRecordList};

/// One date marker.
///
/// # Binary Format (12 bytes, little endian)
///
/// ```text
/// day(4) + first(8)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateMark {
    /// Day number
    pub day: Day,
    /// First position dated `day`
    pub first: u64,
}

impl Record for DateMark {
    const SIZE: usize = 12;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.day.to_le_bytes());
        buf[4..12].copy_from_slice(&self.first.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut day = [0u8; 4];
        let mut first = [0u8; 8];
        day.copy_from_slice(&buf[0..4]);
        first.copy_from_slice(&buf[4..12]);
        Ok(DateMark {
            day: i32::from_le_bytes(day),
            first: u64::from_le_bytes(first),
        })
    }
}

/// Persisted date markers with an in-memory copy for lookups.
pub struct DateMarkers {
    list: SegmentedRecordList<DateMark>,
    marks: Vec<DateMark>,
}

impl DateMarkers {
    /// Open the markers stored in `dir`.
    pub fn open(dir: impl AsRef<Path>, config: ListConfig) -> Result<Self> {
        let list = SegmentedRecordList::open(dir, config)?;
        let marks = list.iter().collect::<Result<Vec<_>>>()?;
        Ok(DateMarkers { list, marks })
    }

    /// Record that position `position` is dated `day`.
    ///
    /// Only a day later than the latest marker adds a marker.
    pub fn note(&mut self, day: Day, position: u64) -> Result<()> {
        if let Some(last) = self.marks.last() {
            if day <= last.day {
                return Ok(());
            }
        }
        let mark = DateMark {
            day,
            first: position,
        };
        self.list.append(&mark)?;
        self.marks.push(mark);
        Ok(())
    }

    /// First position dated on or after `day`, or `end` if there is none.
    pub fn lower_bound(&self, day: Day, end: u64) -> u64 {
        let index = self.marks.partition_point(|mark| mark.day < day);
        self.marks.get(index).map_or(end, |mark| mark.first)
    }

    /// Day of `position`, or `None` if it precedes every marker.
    pub fn day_of(&self, position: u64) -> Option<Day> {
        let index = self.marks.partition_point(|mark| mark.first <= position);
        index.checked_sub(1).map(|i| self.marks[i].day)
    }

    /// Latest marked day.
    pub fn last_day(&self) -> Option<Day> {
        self.marks.last().map(|mark| mark.day)
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Whether no marker exists.
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Flush the marker list.
    pub fn flush(&mut self) -> Result<()> {
        self.list.flush()
    }

    /// Flush and close the marker list.
    pub fn close(self) -> Result<()> {
        self.list.close()
    }
}
