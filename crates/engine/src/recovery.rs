//! Index recovery from the event log
//!
//! The event log is the source of truth. On open:
//!
//! 1. The user event index (memory only) is rebuilt from the metadata
//!    mirror.
//! 2. The event-type index is caught up: every id at or above its
//!    watermark is re-indexed from the event's metadata and payload date.
//!
//! Catch-up is idempotent, so it also runs during ingestion whenever the
//! type index is found lagging behind the log.

use crate::index::{EventTypeIndex, UserEventIndex};
use std::time::Instant;
use tracing::{info, warn};
use tracker_core::{parse_day, Day, Error, EventId, Result};
use tracker_durability::EventLog;

/// Result of recovery
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Events replayed into the user event index
    pub user_events_rebuilt: u64,
    /// Events re-indexed into the event-type index
    pub events_reindexed: u64,
    /// Total recovery time (microseconds)
    pub recovery_time_micros: u64,
}

/// Rebuild indexes from `log`.
///
/// # Errors
///
/// Returns `Error::Corruption` if the log references an event type the
/// index never registered, or any error from reading payloads.
pub fn recover(log: &EventLog, types: &EventTypeIndex) -> Result<(UserEventIndex, RecoveryResult)> {
    let started = Instant::now();
    let user_events = rebuild_user_index(log);
    let events_reindexed = catch_up_type_index(log, types)?;
    let result = RecoveryResult {
        user_events_rebuilt: user_events.len(),
        events_reindexed,
        recovery_time_micros: started.elapsed().as_micros() as u64,
    };
    info!(
        target: "tracker::recovery",
        events = log.len(),
        users = user_events.users(),
        reindexed = events_reindexed,
        micros = result.recovery_time_micros,
        "Recovered indexes"
    );
    Ok((user_events, result))
}

/// Replay every event's owner into a fresh user event index.
pub fn rebuild_user_index(log: &EventLog) -> UserEventIndex {
    let mut index = UserEventIndex::new();
    for (event_id, meta) in log.metas_from(0) {
        index.add_event(meta.user_id, event_id);
    }
    index
}

/// Index every event of `log` the type index has not seen yet.
///
/// Returns the number of events indexed.
pub fn catch_up_type_index(log: &EventLog, types: &EventTypeIndex) -> Result<u64> {
    let watermark = types.watermark();
    let end = log.len();
    if watermark >= end {
        return Ok(0);
    }
    warn!(target: "tracker::recovery", watermark, events = end, "Event-type index behind event log, catching up");

    let mut indexed = 0;
    for (event_id, meta) in log.metas_from(watermark) {
        let name = types.event_type_name(meta.event_type_id).ok_or_else(|| {
            Error::corruption(format!(
                "event {} has unregistered event type id {}",
                event_id, meta.event_type_id
            ))
        })?;
        let day = event_day(log, event_id)?;
        if types.add_event(event_id, &name, day)? {
            indexed += 1;
        }
    }
    Ok(indexed)
}

fn event_day(log: &EventLog, event_id: EventId) -> Result<Day> {
    let event = log.get_event(event_id)?;
    parse_day(event.date()).map_err(|e| {
        Error::corruption(format!("event {} carries an invalid date: {}", event_id, e))
    })
}
