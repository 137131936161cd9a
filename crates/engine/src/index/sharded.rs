//! Sharded event-type index
//!
//! Event types are partitioned into shards by hashing the type name. Each
//! shard owns the name map and id sequences of its types behind its own
//! lock, so enumerating one type never contends with appends to a type in
//! another shard.
//!
//! Two structures are global:
//! - the name table, which assigns dense type ids and fixes the order of
//!   `event_types()`
//! - the date markers over the whole id space, which answer "first event id
//!   on or after day D" for funnel deadlines
//!
//! # Watermark
//!
//! `indexed` is one past the highest indexed event id. Appends below the
//! watermark are ignored, so re-indexing from the event log after a crash
//! is idempotent.

use super::dates::DateMarkers;
use super::event_type::{EventTypeShard, TypeSequence};
use parking_lot::RwLock;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use tracker_core::{Day, Error, EventId, EventTypeId, Result, NO_EVENT_ID};
use tracker_durability::NameTable;
use tracker_storage::{JournalConfig, ListConfig};

/// Event-type index configuration.
#[derive(Debug, Clone)]
pub struct EventTypeIndexConfig {
    /// Configuration of every id and date list
    pub list: ListConfig,
    /// Configuration of the name journal
    pub journal: JournalConfig,
    /// Number of shards (default: 16)
    pub shards: usize,
}

impl Default for EventTypeIndexConfig {
    fn default() -> Self {
        EventTypeIndexConfig {
            list: ListConfig::default(),
            journal: JournalConfig::default(),
            shards: 16,
        }
    }
}

impl EventTypeIndexConfig {
    /// Create a configuration optimized for testing.
    pub fn for_testing() -> Self {
        EventTypeIndexConfig {
            list: ListConfig::for_testing(),
            journal: JournalConfig::for_testing(),
            shards: 4,
        }
    }
}

/// Event-type index counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventTypeIndexStats {
    /// Registered event types
    pub event_types: usize,
    /// One past the highest indexed event id
    pub indexed_events: u64,
    /// Number of shards
    pub shards: usize,
    /// Types in the most populated shard
    pub largest_shard: usize,
}

/// Time-ordered event ids per event type, sharded by type name.
pub struct EventTypeIndex {
    dir: PathBuf,
    list_config: ListConfig,
    names: RwLock<NameTable>,
    shards: Vec<RwLock<EventTypeShard>>,
    dates: RwLock<DateMarkers>,
    indexed: AtomicU64,
}

impl EventTypeIndex {
    /// Open the index stored in `dir`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for zero shards, or any error from
    /// opening the name table and sequences.
    pub fn open(dir: impl AsRef<Path>, config: EventTypeIndexConfig) -> Result<Self> {
        if config.shards == 0 {
            return Err(Error::invalid_config("event type index needs at least one shard"));
        }
        let dir = dir.as_ref().to_path_buf();
        let names = NameTable::open(dir.join("names"), config.journal)?;
        let dates = DateMarkers::open(dir.join("dates"), config.list.clone())?;
        let mut shards: Vec<EventTypeShard> =
            (0..config.shards).map(|_| EventTypeShard::default()).collect();

        let mut indexed = 0;
        for (id, name) in names.names().iter().enumerate() {
            let id = id as EventTypeId;
            let sequence = TypeSequence::open(type_dir(&dir, id), config.list.clone())?;
            if let Some(last) = sequence.last_id()? {
                indexed = indexed.max(last + 1);
            }
            shards[shard_of(name, config.shards)].insert(name, id, sequence);
        }

        debug!(
            target: "tracker::index",
            path = %dir.display(),
            event_types = names.len(),
            indexed,
            "Opened event type index"
        );

        Ok(EventTypeIndex {
            dir,
            list_config: config.list,
            names: RwLock::new(names),
            shards: shards.into_iter().map(RwLock::new).collect(),
            dates: RwLock::new(dates),
            indexed: AtomicU64::new(indexed),
        })
    }

    /// Id of `name`, registering the type if it is new.
    pub fn ensure_event_type(&self, name: &str) -> Result<EventTypeId> {
        let shard_index = self.shard_index(name);
        if let Some(id) = self.shards[shard_index].read().id(name) {
            return Ok(id);
        }

        let (id, created) = self.names.write().ensure(name)?;
        let mut shard = self.shards[shard_index].write();
        if !shard.contains(name) {
            let sequence = TypeSequence::open(type_dir(&self.dir, id), self.list_config.clone())?;
            shard.insert(name, id, sequence);
            if created {
                debug!(target: "tracker::index", event_type = name, id, "Registered event type");
            }
        }
        Ok(id)
    }

    /// Id of `name`, if registered.
    pub fn get_event_type_id(&self, name: &str) -> Option<EventTypeId> {
        self.names.read().get(name)
    }

    /// Name of type `id`, if registered.
    pub fn event_type_name(&self, id: EventTypeId) -> Option<String> {
        self.names.read().name(id).map(str::to_string)
    }

    /// All type names in id order.
    pub fn event_types(&self) -> Vec<String> {
        self.names.read().names().to_vec()
    }

    /// Index `event_id` of type `name` dated `day`.
    ///
    /// An event dated before the latest indexed day of any type is indexed
    /// under that latest day. Returns `false` if the id was already indexed.
    ///
    /// # Errors
    ///
    /// - `Error::PreconditionViolation` if `event_id` skips ahead of the
    ///   watermark or the type was never registered
    /// - storage errors from the underlying lists
    pub fn add_event(&self, event_id: EventId, name: &str, day: Day) -> Result<bool> {
        let watermark = self.indexed.load(Ordering::Acquire);
        if event_id < watermark {
            return Ok(false);
        }
        if event_id > watermark {
            return Err(Error::precondition(format!(
                "event {} indexed out of order (next expected {})",
                event_id, watermark
            )));
        }

        // a late event is attributed to the latest day seen by any type
        let day = {
            let mut dates = self.dates.write();
            let day = dates.last_day().map_or(day, |last| last.max(day));
            dates.note(day, event_id)?;
            day
        };
        {
            let mut shard = self.shards[self.shard_index(name)].write();
            let sequence = shard.sequence_mut(name).ok_or_else(|| {
                Error::precondition(format!("event type '{}' is not registered", name))
            })?;
            sequence.append(event_id, day)?;
        }
        self.indexed.store(event_id + 1, Ordering::Release);
        Ok(true)
    }

    /// Stream ids of type `name` dated in `[start, end)`, ascending.
    ///
    /// An unknown type enumerates nothing. Enumeration stops as soon as the
    /// callback returns `ControlFlow::Break`.
    pub fn enumerate_event_ids<F>(&self, name: &str, start: Day, end: Day, mut callback: F) -> Result<()>
    where
        F: FnMut(EventId) -> Result<ControlFlow<()>>,
    {
        let shard = self.shards[self.shard_index(name)].read();
        match shard.sequence(name) {
            Some(sequence) => sequence.enumerate(start, end, &mut callback).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Smallest event id dated on or after (date of `event_id`) + `num_days`.
    ///
    /// Returns [`NO_EVENT_ID`] if there is no such event or `event_id` is
    /// not indexed.
    pub fn find_first_event_id_on_or_after(&self, event_id: EventId, num_days: u32) -> EventId {
        let indexed = self.indexed.load(Ordering::Acquire);
        if event_id >= indexed {
            return NO_EVENT_ID;
        }
        let dates = self.dates.read();
        let Some(day) = dates.day_of(event_id) else {
            return NO_EVENT_ID;
        };
        let target = day.saturating_add(i32::try_from(num_days).unwrap_or(i32::MAX));
        match dates.lower_bound(target, indexed) {
            first if first >= indexed => NO_EVENT_ID,
            first => first,
        }
    }

    /// Latest indexed day across all types.
    pub fn last_day(&self) -> Option<Day> {
        self.dates.read().last_day()
    }

    /// One past the highest indexed event id.
    pub fn watermark(&self) -> EventId {
        self.indexed.load(Ordering::Acquire)
    }

    /// Number of ids indexed for `name`.
    pub fn type_len(&self, name: &str) -> u64 {
        self.shards[self.shard_index(name)]
            .read()
            .sequence(name)
            .map_or(0, TypeSequence::len)
    }

    /// Current counters.
    pub fn stats(&self) -> EventTypeIndexStats {
        EventTypeIndexStats {
            event_types: self.names.read().len(),
            indexed_events: self.watermark(),
            shards: self.shards.len(),
            largest_shard: self
                .shards
                .iter()
                .map(|shard| shard.read().len())
                .max()
                .unwrap_or(0),
        }
    }

    /// Flush names, markers and every sequence.
    pub fn flush(&self) -> Result<()> {
        self.names.write().flush()?;
        self.dates.write().flush()?;
        for shard in &self.shards {
            shard.write().flush()?;
        }
        Ok(())
    }

    /// Flush and close everything.
    pub fn close(self) -> Result<()> {
        self.names.into_inner().close()?;
        self.dates.into_inner().close()?;
        for shard in self.shards {
            shard.into_inner().close()?;
        }
        Ok(())
    }

    fn shard_index(&self, name: &str) -> usize {
        shard_of(name, self.shards.len())
    }
}

impl std::fmt::Debug for EventTypeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTypeIndex")
            .field("dir", &self.dir)
            .field("shards", &self.shards.len())
            .field("indexed", &self.watermark())
            .finish()
    }
}

fn shard_of(name: &str, shards: usize) -> usize {
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

fn type_dir(dir: &Path, id: EventTypeId) -> PathBuf {
    dir.join("types").join(id.to_string())
}
