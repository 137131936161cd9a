//! End-to-end scenarios through the public `eventtracker` API
//!
//! Each test opens a fresh store in a temp directory, ingests a small
//! event stream and checks query results or restart behavior.

use eventtracker::{
    Criterion, Error, Event, FunnelQuery, MemUserStorage, RetentionQuery, Tracker,
    TrackerConfig, User,
};
use proptest::prelude::*;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Tracker {
    Tracker::open_with_config(dir.path(), TrackerConfig::for_testing()).unwrap()
}

fn add(tracker: &Tracker, event_type: &str, user: &str, date: &str) -> u64 {
    tracker
        .add_event(&Event::builder(event_type, user, date).build())
        .unwrap()
}

// ============================================================================
// Funnels
// ============================================================================

mod funnels {
    use super::*;

    #[test]
    fn test_only_users_entering_in_range_count() {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);
        add(&tracker, "A", "u1", "20130101");
        add(&tracker, "B", "u1", "20130102");
        add(&tracker, "B", "u2", "20130105");

        let query = FunnelQuery::new("20130101", "20130110", ["A", "B"]).within_days(7);
        assert_eq!(tracker.funnel_counts(&query).unwrap(), vec![1, 1]);
    }

    #[test]
    fn test_entering_window_end_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);
        add(&tracker, "A", "u1", "20130101");
        add(&tracker, "A", "u2", "20130110");
        add(&tracker, "B", "u2", "20130111");

        let query = FunnelQuery::new("20130101", "20130110", ["A", "B"]);
        assert_eq!(tracker.funnel_counts(&query).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_user_criteria_follow_profile_updates() {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);
        add(&tracker, "A", "u1", "20130101");
        add(&tracker, "A", "u2", "20130101");
        tracker
            .add_or_update_user(&User::with_id("u2").property("tier", "gold"))
            .unwrap();

        let query = FunnelQuery::new("20130101", "20130102", ["A"]).user_criterion("tier", "gold");
        assert_eq!(tracker.funnel_counts(&query).unwrap(), vec![1]);

        tracker
            .add_or_update_user(&User::with_id("u2").property("tier", "silver"))
            .unwrap();
        assert_eq!(tracker.funnel_counts(&query).unwrap(), vec![0]);
    }
}

// ============================================================================
// Retention
// ============================================================================

mod retention {
    use super::*;

    #[test]
    fn test_cohort_retained_in_own_window() {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);
        add(&tracker, "A", "u1", "20130101");
        add(&tracker, "B", "u1", "20130101");
        add(&tracker, "A", "u2", "20130102");

        let query = RetentionQuery::new("20130101", "20130101", "A", "B").columns(1);
        assert_eq!(tracker.retention_table(&query).unwrap(), vec![vec![1, 1]]);
    }

    #[test]
    fn test_weekly_cohorts() {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);
        add(&tracker, "signup", "u1", "20130101");
        add(&tracker, "signup", "u2", "20130103");
        add(&tracker, "login", "u1", "20130109");
        add(&tracker, "signup", "u3", "20130110");
        add(&tracker, "login", "u2", "20130116");
        add(&tracker, "login", "u3", "20130117");

        let query = RetentionQuery::new("20130101", "20130114", "signup", "login")
            .days_per_cohort(7)
            .columns(2);
        let table = tracker.retention_table(&query).unwrap();
        assert_eq!(table, vec![vec![2, 0, 1], vec![1, 0, 1]]);
    }
}

// ============================================================================
// Users
// ============================================================================

mod users {
    use super::*;

    #[test]
    fn test_alias_to_missing_user_fails_without_mutation() {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);
        add(&tracker, "A", "u1", "20130101");

        let result = tracker.alias_user("new-id", "missing");
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(tracker.get_user_id("new-id"), None);
        assert_eq!(tracker.stats().users, 1);
    }

    #[test]
    fn test_alias_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let tracker = open(&dir);
            add(&tracker, "A", "u1", "20130101");
            tracker.alias_user("u1@mail", "u1").unwrap();
            tracker.close().unwrap();
        }
        let tracker = open(&dir);
        assert_eq!(tracker.get_user_id("u1@mail"), Some(0));
    }

    #[test]
    fn test_in_memory_user_storage() {
        let dir = TempDir::new().unwrap();
        let tracker = Tracker::open_with_user_storage(
            dir.path(),
            TrackerConfig::for_testing(),
            Box::new(MemUserStorage::new()),
        )
        .unwrap();
        add(&tracker, "A", "u1", "20130101");
        tracker
            .add_or_update_user(&User::with_id("u1").property("k", "v"))
            .unwrap();
        assert_eq!(tracker.get_user_id("u1"), Some(0));
        assert!(!dir.path().join("users").exists());
    }
}

// ============================================================================
// Durability
// ============================================================================

mod durability {
    use super::*;

    #[test]
    fn test_restart_appends_after_existing_events() {
        let dir = TempDir::new().unwrap();
        let n = 250;
        {
            let tracker = open(&dir);
            for i in 0..n {
                add(&tracker, "view", &format!("u{}", i % 10), "20130101");
            }
            tracker.close().unwrap();
        }

        let tracker = open(&dir);
        assert_eq!(tracker.stats().events, n);
        assert_eq!(add(&tracker, "view", "u0", "20130102"), n);
        assert_eq!(tracker.stats().events, n + 1);
        for id in [0, n / 2, n - 1] {
            let event = tracker.get_event(id).unwrap();
            assert_eq!(event.external_user_id(), format!("u{}", id % 10));
        }
    }

    #[test]
    fn test_always_mode_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = TrackerConfig {
            durability: "always".to_string(),
            ..TrackerConfig::for_testing()
        };
        {
            let tracker = Tracker::open_with_config(dir.path(), config.clone()).unwrap();
            add(&tracker, "A", "u1", "20130101");
        }
        let tracker = Tracker::open_with_config(dir.path(), config).unwrap();
        assert_eq!(tracker.get_event(0).unwrap().event_type(), "A");
    }
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn criteria_are_a_conjunction(
        properties in prop::collection::btree_map("[a-c]", "[x-z]", 0..3),
        criteria in prop::collection::vec(("[a-c]", "[x-z]"), 0..3),
    ) {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);
        let mut builder = Event::builder("A", "u", "20130101");
        for (key, value) in &properties {
            builder = builder.property(key.clone(), value.clone());
        }
        tracker.add_event(&builder.build()).unwrap();

        let mut query = FunnelQuery::new("20130101", "20130102", ["A"]);
        for (key, value) in &criteria {
            query = query.event_criterion(key.clone(), value.clone());
        }
        let expected = criteria
            .iter()
            .all(|(key, value)| Criterion::new(key.clone(), value.clone()).matches(&properties));
        prop_assert_eq!(tracker.funnel_counts(&query).unwrap(), vec![u64::from(expected)]);
    }
}
