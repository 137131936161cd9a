//! eventtracker - Embeddable event-tracking store
//!
//! Clients register users and append time-stamped, schema-free events keyed
//! to a user and an event type; the store answers funnel-conversion and
//! retention-cohort queries without a general query planner.
//!
//! # Quick Start
//!
//! ```no_run
//! use eventtracker::{Event, FunnelQuery, RetentionQuery, Tracker};
//!
//! let tracker = Tracker::open("/tmp/events")?;
//! tracker.add_event(&Event::builder("signup", "alice", "20130101").build())?;
//! tracker.add_event(&Event::builder("purchase", "alice", "20130102").build())?;
//!
//! let funnel = FunnelQuery::new("20130101", "20130108", ["signup", "purchase"]).within_days(7);
//! assert_eq!(tracker.funnel_counts(&funnel)?, vec![1, 1]);
//!
//! let retention = RetentionQuery::new("20130101", "20130107", "signup", "purchase").columns(7);
//! let table = tracker.retention_table(&retention)?;
//! assert_eq!(table.len(), 7);
//! # Ok::<(), eventtracker::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `tracker-core`: data model, dates, errors, the `UserStorage` trait
//! - `tracker-storage`: memory-mapped record lists and the payload journal
//! - `tracker-durability`: the event log and journaled name tables
//! - `tracker-engine`: indexes, analytics and the `Tracker` handle

pub use tracker_core::{
    Criterion, Error, Event, EventBuilder, EventId, EventTypeId, Properties, Result, User, UserId,
    UserStorage, NO_EVENT_ID,
};
pub use tracker_engine::{
    FunnelQuery, JournalUserStorage, MemUserStorage, RetentionQuery, RetentionTable, Tracker,
    TrackerConfig, TrackerStats,
};
pub use tracker_storage::DurabilityMode;
