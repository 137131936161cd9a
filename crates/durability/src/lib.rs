//! Durability layer for the event tracker
//!
//! This crate owns the persisted source of truth:
//!
//! - EventLog: payload journal + fixed-size metadata list, replayed into an
//!   in-memory mirror on open
//! - MetaArena: chunked mirror whose entries never move
//! - NameTable: journaled append-only `name <-> id` table
//!
//! Indexes in the engine crate are derived from the event log and can be
//! caught up from it after a crash.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event_log;
pub mod mirror;
pub mod name_table;

pub use event_log::{EventLog, EventLogConfig, EventLogStats, EventMetaData};
pub use mirror::MetaArena;
pub use name_table::NameTable;
