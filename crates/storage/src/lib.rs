//! Storage layer for the event tracker
//!
//! This crate implements the two on-disk building blocks everything else is
//! made of:
//! - SegmentedRecordList: fixed-size-record append-only array over
//!   memory-mapped segments, with a bounded LRU segment pool
//! - Journal: segmented append-only log of variable-length, checksummed
//!   payloads addressed by fixed-size location tokens
//! - DurabilityMode: when appends reach the disk
//!
//! Both structures are single-writer: appends take `&mut self`, reads take
//! `&self` and are safe to share across threads.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod journal;
pub mod mode;
pub mod record;
pub mod segmented;

pub use journal::{Journal, JournalConfig, JournalStats, Location, LOCATION_SIZE};
pub use mode::DurabilityMode;
pub use record::Record;
pub use segmented::{ListConfig, PoolStats, SegmentedRecordList};
