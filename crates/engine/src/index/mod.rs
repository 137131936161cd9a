//! Indexes derived from the event log
//!
//! - `dates`: date markers over time-ordered sequences
//! - `event_type`: per-type id sequences and index shards
//! - `sharded`: the sharded event-type index (EventTypeIndex)
//! - `user_event`: per-user event sequences (UserEventIndex)

pub mod dates;
pub mod event_type;
pub mod sharded;
pub mod user_event;

pub use dates::{DateMark, DateMarkers};
pub use event_type::{EventTypeShard, TypeSequence};
pub use sharded::{EventTypeIndex, EventTypeIndexConfig, EventTypeIndexStats};
pub use user_event::UserEventIndex;
