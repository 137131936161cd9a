//! Durable event log
//!
//! Pairs a payload journal (variable-length, JSON-serialized events) with a
//! fixed-record metadata list. The metadata record of event `id` lives at
//! row `id` of the list, so the list length is the id counter.
//!
//! # Layout
//!
//! ```text
//! <dir>/payloads/   journal-NNNNNN.log
//! <dir>/meta/       header.dat + segment-NNNNNNNN.dat
//! ```
//!
//! # Write order
//!
//! payload journal -> metadata list (count update is the commit point) ->
//! in-memory mirror. A crash before the count update leaves an orphaned
//! payload that nothing references.

use crate::mirror::MetaArena;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use tracker_core::{Criterion, Error, Event, EventId, EventTypeId, Result, UserId};
use tracker_storage::{
    DurabilityMode, Journal, JournalConfig, JournalStats, ListConfig, Location, PoolStats, Record,
    SegmentedRecordList, LOCATION_SIZE,
};

/// Fixed-size metadata record stored per event.
///
/// # Binary Format (28 bytes, little endian)
///
/// ```text
/// user_id(8) + event_type_id(4) + location(16)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMetaData {
    /// Internal id of the user the event is attributed to
    pub user_id: UserId,
    /// Internal id of the event type
    pub event_type_id: EventTypeId,
    /// Where the serialized event lives in the payload journal
    pub location: Location,
}

impl Record for EventMetaData {
    const SIZE: usize = 8 + 4 + LOCATION_SIZE;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.user_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.event_type_id.to_le_bytes());
        buf[12..28].copy_from_slice(&self.location.to_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut user_id = [0u8; 8];
        let mut event_type_id = [0u8; 4];
        user_id.copy_from_slice(&buf[0..8]);
        event_type_id.copy_from_slice(&buf[8..12]);
        Ok(EventMetaData {
            user_id: u64::from_le_bytes(user_id),
            event_type_id: u32::from_le_bytes(event_type_id),
            location: Location::from_bytes(&buf[12..28])?,
        })
    }
}

/// Event log configuration.
#[derive(Debug, Clone, Default)]
pub struct EventLogConfig {
    /// Metadata list configuration
    pub list: ListConfig,
    /// Payload journal configuration
    pub journal: JournalConfig,
}

impl EventLogConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the durability mode of both the list and the journal (builder pattern).
    pub fn with_durability(mut self, durability: DurabilityMode) -> Self {
        self.list.durability = durability;
        self.journal.durability = durability;
        self
    }

    /// Create a configuration optimized for testing.
    pub fn for_testing() -> Self {
        EventLogConfig {
            list: ListConfig::for_testing(),
            journal: JournalConfig::for_testing(),
        }
    }
}

/// Counters describing an open event log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventLogStats {
    /// Number of committed events
    pub events: u64,
    /// Metadata list segment pool counters
    pub meta_pool: PoolStats,
    /// Payload journal counters
    pub payloads: JournalStats,
}

/// Durable, append-only event store.
pub struct EventLog {
    dir: PathBuf,
    payloads: Journal,
    meta: SegmentedRecordList<EventMetaData>,
    mirror: MetaArena<EventMetaData>,
    current_id: AtomicU64,
}

impl EventLog {
    /// Open the event log stored in `dir`, creating it if needed.
    ///
    /// The metadata list is replayed end to end into the in-memory mirror;
    /// the replayed count becomes the next event id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if a metadata record cannot be decoded,
    /// or any error from opening the list or the journal.
    pub fn open(dir: impl AsRef<Path>, config: EventLogConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let payloads = Journal::open(dir.join("payloads"), config.journal)?;
        let meta = SegmentedRecordList::<EventMetaData>::open(dir.join("meta"), config.list)?;

        let mut mirror = MetaArena::new();
        for record in meta.iter() {
            mirror.push(record?);
        }
        let replayed = mirror.len();

        info!(target: "tracker::durability", path = %dir.display(), events = replayed, "Replayed event metadata");

        Ok(EventLog {
            dir,
            payloads,
            meta,
            mirror,
            current_id: AtomicU64::new(replayed),
        })
    }

    /// Append an event attributed to `user_id` with type `event_type_id`.
    ///
    /// Returns the id assigned to the event.
    pub fn add_event(
        &mut self,
        event: &Event,
        user_id: UserId,
        event_type_id: EventTypeId,
    ) -> Result<EventId> {
        let id = self.current_id.load(Ordering::Acquire);
        let payload = serde_json::to_vec(event)?;
        let location = self.payloads.append(&payload)?;

        let meta = EventMetaData {
            user_id,
            event_type_id,
            location,
        };
        let row = self.meta.append(&meta)?;
        if row != id {
            return Err(Error::storage(format!(
                "metadata row {} does not match event id {}",
                row, id
            )));
        }
        self.mirror.push(meta);
        self.current_id.store(id + 1, Ordering::Release);
        Ok(id)
    }

    /// Read back event `id`.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument` if `id` was never assigned
    /// - `Error::Corruption` if the payload is damaged
    /// - `Error::SerializationError` if the payload does not decode
    pub fn get_event(&self, id: EventId) -> Result<Event> {
        let meta = self.get_meta(id)?;
        let payload = self.payloads.read(meta.location)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Metadata of event `id`, served from the in-memory mirror.
    pub fn get_meta(&self, id: EventId) -> Result<EventMetaData> {
        self.mirror.get(id).ok_or_else(|| {
            Error::invalid_argument(format!(
                "event id {} out of range (next id {})",
                id,
                self.len()
            ))
        })
    }

    /// True iff every criterion holds against the properties of event `id`.
    ///
    /// Empty criteria are vacuously true and do not touch the payload.
    pub fn satisfy(&self, id: EventId, criteria: &[Criterion]) -> Result<bool> {
        if criteria.is_empty() {
            return Ok(true);
        }
        let event = self.get_event(id)?;
        Ok(criteria.iter().all(|c| c.matches(event.properties())))
    }

    /// Iterate `(id, metadata)` pairs starting at `from`.
    pub fn metas_from(&self, from: EventId) -> impl Iterator<Item = (EventId, EventMetaData)> + '_ {
        self.mirror
            .iter()
            .enumerate()
            .skip(from as usize)
            .map(|(id, meta)| (id as EventId, meta))
    }

    /// Next event id; also the number of committed events.
    pub fn len(&self) -> u64 {
        self.current_id.load(Ordering::Acquire)
    }

    /// Whether no event has been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Directory holding the log.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current counters.
    pub fn stats(&self) -> EventLogStats {
        EventLogStats {
            events: self.len(),
            meta_pool: self.meta.stats(),
            payloads: self.payloads.stats(),
        }
    }

    /// Flush the journal and the metadata list.
    pub fn flush(&mut self) -> Result<()> {
        self.payloads.flush()?;
        self.meta.flush()
    }

    /// Flush and close the log.
    pub fn close(self) -> Result<()> {
        let events = self.len();
        self.payloads.close()?;
        self.meta.close()?;
        info!(target: "tracker::durability", path = %self.dir.display(), events, "Closed event log");
        Ok(())
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("dir", &self.dir)
            .field("events", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(event_type: &str, user: &str, date: &str) -> Event {
        Event::builder(event_type, user, date)
            .property("plan", "free")
            .build()
    }

    #[test]
    fn test_metadata_record_layout() {
        let meta = EventMetaData {
            user_id: 1,
            event_type_id: 2,
            location: Location::new(3, 16, 5),
        };
        let mut buf = [0u8; EventMetaData::SIZE];
        meta.encode(&mut buf);
        assert_eq!(EventMetaData::SIZE, 28);
        assert_eq!(&buf[0..8], &1u64.to_le_bytes());
        assert_eq!(&buf[8..12], &2u32.to_le_bytes());
        assert_eq!(EventMetaData::decode(&buf).unwrap(), meta);
    }

    #[test]
    fn test_ids_are_dense() {
        let dir = TempDir::new().unwrap();
        let mut log = EventLog::open(dir.path(), EventLogConfig::for_testing()).unwrap();
        for i in 0..10 {
            let id = log.add_event(&event("a", "x", "20130101"), 7, 1).unwrap();
            assert_eq!(id, i);
        }
        assert_eq!(log.len(), 10);
        let meta = log.get_meta(3).unwrap();
        assert_eq!(meta.user_id, 7);
        assert_eq!(meta.event_type_id, 1);
    }

    #[test]
    fn test_get_event_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut log = EventLog::open(dir.path(), EventLogConfig::for_testing()).unwrap();
        let original = event("signup", "alice", "20130105");
        let id = log.add_event(&original, 0, 0).unwrap();
        assert_eq!(log.get_event(id).unwrap(), original);
        assert!(matches!(log.get_event(1), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_satisfy() {
        let dir = TempDir::new().unwrap();
        let mut log = EventLog::open(dir.path(), EventLogConfig::for_testing()).unwrap();
        let id = log.add_event(&event("a", "x", "20130101"), 0, 0).unwrap();

        assert!(log.satisfy(id, &[]).unwrap());
        assert!(log.satisfy(id, &[Criterion::new("plan", "free")]).unwrap());
        assert!(!log.satisfy(id, &[Criterion::new("plan", "paid")]).unwrap());
        assert!(!log
            .satisfy(id, &[Criterion::new("plan", "free"), Criterion::new("x", "y")])
            .unwrap());
        // Empty criteria never read the payload, even for unknown ids
        assert!(log.satisfy(99, &[]).unwrap());
        assert!(log.satisfy(99, &[Criterion::new("plan", "free")]).is_err());
    }

    #[test]
    fn test_metas_from() {
        let dir = TempDir::new().unwrap();
        let mut log = EventLog::open(dir.path(), EventLogConfig::for_testing()).unwrap();
        for user in 0..5 {
            log.add_event(&event("a", "x", "20130101"), user, 0).unwrap();
        }
        let tail: Vec<(EventId, UserId)> = log.metas_from(3).map(|(id, m)| (id, m.user_id)).collect();
        assert_eq!(tail, vec![(3, 3), (4, 4)]);
    }
}
