//! Criteria evaluation against stored events and users
//!
//! A criteria list is a conjunction of property equality predicates. Event
//! criteria are checked against the event payload (read from the event
//! log only when the list is non-empty); user criteria against the user
//! record of the event's owner.

use tracker_core::{Criterion, EventId, Result, UserId, UserStorage};
use tracker_durability::EventLog;

/// Evaluates event and user criteria for one query.
pub struct CriteriaEvaluator<'a> {
    log: &'a EventLog,
    users: &'a dyn UserStorage,
    event_criteria: &'a [Criterion],
    user_criteria: &'a [Criterion],
}

impl<'a> CriteriaEvaluator<'a> {
    /// Create an evaluator for the given criteria lists.
    pub fn new(
        log: &'a EventLog,
        users: &'a dyn UserStorage,
        event_criteria: &'a [Criterion],
        user_criteria: &'a [Criterion],
    ) -> Self {
        CriteriaEvaluator {
            log,
            users,
            event_criteria,
            user_criteria,
        }
    }

    /// Whether no criterion restricts anything.
    pub fn is_unrestricted(&self) -> bool {
        self.event_criteria.is_empty() && self.user_criteria.is_empty()
    }

    /// Whether event `event_id` satisfies the event criteria.
    pub fn event_matches(&self, event_id: EventId) -> Result<bool> {
        self.log.satisfy(event_id, self.event_criteria)
    }

    /// Whether user `user_id` satisfies the user criteria.
    pub fn user_matches(&self, user_id: UserId) -> bool {
        self.users.satisfy(user_id, self.user_criteria)
    }

    /// Whether event `event_id` of `user_id` satisfies both lists.
    pub fn matches(&self, event_id: EventId, user_id: UserId) -> Result<bool> {
        Ok(self.event_matches(event_id)? && self.user_matches(user_id))
    }
}

impl std::fmt::Debug for CriteriaEvaluator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriteriaEvaluator")
            .field("event_criteria", &self.event_criteria)
            .field("user_criteria", &self.user_criteria)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::MemUserStorage;
    use tempfile::TempDir;
    use tracker_core::{Event, User};
    use tracker_durability::EventLogConfig;

    #[test]
    fn test_event_and_user_conjunction() {
        let dir = TempDir::new().unwrap();
        let mut log = EventLog::open(dir.path(), EventLogConfig::for_testing()).unwrap();
        let mut users = MemUserStorage::new();
        let alice = users.ensure_user("alice").unwrap();
        users
            .update_user(User::with_id("alice").property("country", "nz"))
            .unwrap();
        let bob = users.ensure_user("bob").unwrap();

        let red = log
            .add_event(
                &Event::builder("view", "alice", "20130101")
                    .property("color", "red")
                    .property("size", "l")
                    .build(),
                alice,
                0,
            )
            .unwrap();
        let blue = log
            .add_event(
                &Event::builder("view", "bob", "20130101")
                    .property("color", "blue")
                    .build(),
                bob,
                0,
            )
            .unwrap();

        let none = CriteriaEvaluator::new(&log, &users, &[], &[]);
        assert!(none.is_unrestricted());
        assert!(none.matches(red, alice).unwrap());
        assert!(none.matches(blue, 99).unwrap());

        let event_criteria = [Criterion::new("color", "red"), Criterion::new("size", "l")];
        let user_criteria = [Criterion::new("country", "nz")];
        let both = CriteriaEvaluator::new(&log, &users, &event_criteria, &user_criteria);
        assert!(!both.is_unrestricted());
        assert!(both.matches(red, alice).unwrap());
        assert!(!both.matches(blue, bob).unwrap());
        assert!(!both.matches(red, bob).unwrap());

        let absent = [Criterion::new("missing", "x")];
        let only_events = CriteriaEvaluator::new(&log, &users, &absent, &[]);
        assert!(!only_events.event_matches(red).unwrap());
        assert!(only_events.user_matches(bob));
    }
}
