//! Segmented, memory-mapped, fixed-record append-only lists
//!
//! - `config`: list configuration (ListConfig)
//! - `header`: committed-count header file
//! - `pool`: bounded LRU pool of mapped segments
//! - `list`: the list itself (SegmentedRecordList)

pub mod config;
mod header;
pub mod list;
mod pool;

pub use config::{ListConfig, MAX_SEGMENT_BYTES};
pub use header::{LIST_HEADER_FILE, LIST_HEADER_SIZE, LIST_MAGIC};
pub use list::{Iter, SegmentedRecordList};
pub use pool::PoolStats;
