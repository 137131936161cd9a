//! Funnel and retention analytics
//!
//! Both queries stream candidate ids out of the event-type index, resolve
//! their owners through the event log's metadata mirror and keep only
//! per-user state, so memory is proportional to the users touched rather
//! than to the events scanned.
//!
//! - [`FunnelQuery`]: how many users entering a funnel reached each step
//! - [`RetentionQuery`]: cohort × period table of returning users

mod funnel;
mod retention;

pub use funnel::FunnelQuery;
pub use retention::{RetentionQuery, RetentionTable};

use crate::index::{EventTypeIndex, UserEventIndex};
use tracker_core::UserStorage;
use tracker_durability::EventLog;

/// Read-only view over the store used to answer analytics queries.
///
/// Borrowed for the duration of one query, under the tracker's read lock.
pub struct Analytics<'a> {
    log: &'a EventLog,
    types: &'a EventTypeIndex,
    user_events: &'a UserEventIndex,
    users: &'a dyn UserStorage,
}

impl<'a> Analytics<'a> {
    /// Create a view over the given components.
    pub fn new(
        log: &'a EventLog,
        types: &'a EventTypeIndex,
        user_events: &'a UserEventIndex,
        users: &'a dyn UserStorage,
    ) -> Self {
        Analytics {
            log,
            types,
            user_events,
            users,
        }
    }
}

impl std::fmt::Debug for Analytics<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analytics")
            .field("events", &self.log.len())
            .field("users", &self.users.len())
            .finish()
    }
}
