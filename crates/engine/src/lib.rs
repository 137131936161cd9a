//! Event tracker engine
//!
//! This crate assembles the lower layers into an embeddable store:
//! - Tracker: the handle owning one store directory (open/close, ingestion)
//! - Indexes: sharded event-type index and per-user event sequences
//! - Users: journaled and in-memory `UserStorage` implementations
//! - Properties: autocomplete index over property keys and values
//! - Analytics: funnel counts and retention tables
//! - Recovery: catching indexes up with the event log on open
//!
//! The engine is the only component that knows about:
//! - The store directory layout and `tracker.toml`
//! - Ingestion ordering across components

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analytics;
pub mod config;
pub mod criteria;
pub mod index;
pub mod properties;
pub mod recovery;
pub mod tracker;
pub mod users;

pub use analytics::{Analytics, FunnelQuery, RetentionQuery, RetentionTable};
pub use config::{TrackerConfig, CONFIG_FILE_NAME};
pub use criteria::CriteriaEvaluator;
pub use index::{EventTypeIndex, EventTypeIndexConfig, EventTypeIndexStats, UserEventIndex};
pub use properties::{PrefixStore, PropertiesIndex};
pub use recovery::RecoveryResult;
pub use tracker::{Tracker, TrackerStats};
pub use users::{JournalUserStorage, MemUserStorage};
