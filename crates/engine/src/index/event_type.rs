//! Per-event-type id sequences
//!
//! Each event type owns an append-only list of the ids of its events, in
//! ingestion order, and a parallel set of date markers so a date range maps
//! to a contiguous slice of the list in logarithmic time.
//!
//! ```text
//! <type dir>/ids     SegmentedRecordList<u64>
//! <type dir>/dates   DateMarkers
//! ```

use super::dates::DateMarkers;
use rustc_hash::FxHashMap;
use std::ops::ControlFlow;
use std::path::Path;
use tracker_core::{Day, EventId, EventTypeId, Result};
use tracker_storage::{ListConfig, SegmentedRecordList};

/// Time-ordered id sequence of one event type.
pub struct TypeSequence {
    ids: SegmentedRecordList<u64>,
    dates: DateMarkers,
}

impl TypeSequence {
    /// Open the sequence stored in `dir`.
    pub fn open(dir: impl AsRef<Path>, config: ListConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let ids = SegmentedRecordList::open(dir.join("ids"), config.clone())?;
        let dates = DateMarkers::open(dir.join("dates"), config)?;
        Ok(TypeSequence { ids, dates })
    }

    /// Append `event_id` dated `day`.
    ///
    /// The date marker is written first and the id append is the commit
    /// point, so replaying an interrupted append is harmless.
    pub fn append(&mut self, event_id: EventId, day: Day) -> Result<()> {
        self.dates.note(day, self.ids.len())?;
        self.ids.append(&event_id)?;
        Ok(())
    }

    /// Stream ids dated in `[start, end)` in ascending order.
    pub fn enumerate<F>(&self, start: Day, end: Day, callback: &mut F) -> Result<ControlFlow<()>>
    where
        F: FnMut(EventId) -> Result<ControlFlow<()>>,
    {
        let len = self.ids.len();
        let from = self.dates.lower_bound(start, len);
        let to = self.dates.lower_bound(end, len);
        if from >= to {
            return Ok(ControlFlow::Continue(()));
        }
        for id in self.ids.iter_from(from).take((to - from) as usize) {
            if callback(id?)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Latest id in the sequence.
    pub fn last_id(&self) -> Result<Option<EventId>> {
        self.ids.last()
    }

    /// Number of ids.
    pub fn len(&self) -> u64 {
        self.ids.len()
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Flush ids and date markers.
    pub fn flush(&mut self) -> Result<()> {
        self.ids.flush()?;
        self.dates.flush()
    }

    /// Flush and close.
    pub fn close(self) -> Result<()> {
        self.ids.close()?;
        self.dates.close()
    }
}

/// One shard of the event-type index: the types whose names hash here.
#[derive(Default)]
pub struct EventTypeShard {
    ids: FxHashMap<String, EventTypeId>,
    sequences: FxHashMap<EventTypeId, TypeSequence>,
}

impl EventTypeShard {
    /// Register a type and its sequence.
    pub fn insert(&mut self, name: &str, id: EventTypeId, sequence: TypeSequence) {
        self.ids.insert(name.to_string(), id);
        self.sequences.insert(id, sequence);
    }

    /// Whether `name` is registered in this shard.
    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    /// Id of `name`, if registered in this shard.
    pub fn id(&self, name: &str) -> Option<EventTypeId> {
        self.ids.get(name).copied()
    }

    /// Sequence of `name`.
    pub fn sequence(&self, name: &str) -> Option<&TypeSequence> {
        self.sequences.get(self.ids.get(name)?)
    }

    /// Mutable sequence of `name`.
    pub fn sequence_mut(&mut self, name: &str) -> Option<&mut TypeSequence> {
        let id = self.ids.get(name)?;
        self.sequences.get_mut(id)
    }

    /// Number of types in this shard.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether this shard holds no type.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Flush every sequence.
    pub fn flush(&mut self) -> Result<()> {
        for sequence in self.sequences.values_mut() {
            sequence.flush()?;
        }
        Ok(())
    }

    /// Close every sequence.
    pub fn close(self) -> Result<()> {
        for (_, sequence) in self.sequences {
            sequence.close()?;
        }
        Ok(())
    }
}
