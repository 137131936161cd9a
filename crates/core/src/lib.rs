//! Core types and traits for the event tracker
//!
//! This crate defines the foundational types used throughout the system:
//! - EventId / UserId / EventTypeId: dense identifiers
//! - Event, User, Criterion: the data model
//! - Day: `YYYYMMDD` dates as day numbers
//! - Error: Error type hierarchy
//! - Traits: `UserStorage`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod date;
pub mod error;
pub mod traits;
pub mod types;

pub use date::{days_between, format_day, parse_day, Day};
pub use error::{Error, Result};
pub use traits::UserStorage;
pub use types::{Criterion, Event, EventBuilder, EventId, EventTypeId, Properties, User, UserId};

/// Enumeration callbacks return `Continue(())` to keep going or `Break(())`
/// to stop the enumeration immediately.
pub use std::ops::ControlFlow;

/// Sentinel returned by bounded lookups meaning "no such event id".
pub const NO_EVENT_ID: EventId = EventId::MAX;
