//! Integration tests for Tracker::open() and recovery
//!
//! These tests verify the complete open flow including:
//! - Creating new stores and writing tracker.toml
//! - Reopening existing stores
//! - Catching indexes up with the event log
//! - Multiple write/close/reopen cycles

use std::sync::Arc;
use tempfile::TempDir;
use tracker_core::{Error, Event, User};
use tracker_durability::{EventLog, EventLogConfig};
use tracker_engine::{FunnelQuery, RetentionQuery, Tracker, TrackerConfig, CONFIG_FILE_NAME};

fn event(event_type: &str, user: &str, date: &str) -> Event {
    Event::builder(event_type, user, date).build()
}

fn open(path: &std::path::Path) -> Tracker {
    Tracker::open_with_config(path, TrackerConfig::for_testing()).expect("open tracker")
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_tracker_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lifecycle_test");

    // Phase 1: create and write
    {
        let tracker = open(&path);
        assert_eq!(tracker.add_event(&event("a", "x", "20130101")).unwrap(), 0);
        assert_eq!(tracker.add_event(&event("b", "y", "20130102")).unwrap(), 1);
        tracker
            .add_or_update_user(&User::with_id("x").property("plan", "pro"))
            .unwrap();
        tracker.close().unwrap();
    }

    // Phase 2: reopen, verify and append
    {
        let tracker = open(&path);
        let stats = tracker.stats();
        assert_eq!(stats.events, 2);
        assert_eq!(stats.users, 2);
        assert_eq!(stats.user_events, 2);
        assert_eq!(stats.recovery.events_reindexed, 0);

        assert_eq!(tracker.event_types(), vec!["a", "b"]);
        assert_eq!(tracker.get_event(1).unwrap(), event("b", "y", "20130102"));
        assert_eq!(tracker.get_user_id("x"), Some(0));
        let user = tracker.get_user(0).unwrap();
        assert_eq!(user.properties().get("plan").map(String::as_str), Some("pro"));

        assert_eq!(tracker.add_event(&event("a", "z", "20131111")).unwrap(), 2);
        tracker.close().unwrap();
    }

    // Phase 3: everything survives a second cycle
    {
        let tracker = open(&path);
        assert_eq!(tracker.stats().events, 3);
        assert_eq!(tracker.get_user_id("z"), Some(2));
        assert_eq!(tracker.user_keys(), vec!["plan"]);
    }
}

#[test]
fn test_open_writes_default_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("fresh");

    let tracker = Tracker::open(&path).unwrap();
    let config_path = path.join(CONFIG_FILE_NAME);
    assert!(config_path.exists());
    assert_eq!(tracker.config(), &TrackerConfig::default());
    tracker.close().unwrap();

    std::fs::write(&config_path, "event_type_shards = 0\n").unwrap();
    assert!(matches!(Tracker::open(&path), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_store_is_locked_while_open() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("locked");

    let tracker = open(&path);
    assert!(matches!(
        Tracker::open_with_config(&path, TrackerConfig::for_testing()),
        Err(Error::StorageError(_))
    ));
    tracker.close().unwrap();

    // lock released on close
    open(&path).close().unwrap();
}

#[test]
fn test_drop_without_close_keeps_events() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dropped");

    {
        let tracker = open(&path);
        for day in 1..=9 {
            tracker
                .add_event(&event("visit", "u", &format!("2013010{}", day)))
                .unwrap();
        }
        tracker.flush().unwrap();
    }

    let tracker = open(&path);
    assert_eq!(tracker.stats().events, 9);
    let events = tracker.get_user_events("u", 7, 10).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].date(), "20130108");
}

// ============================================================================
// Recovery
// ============================================================================

#[test]
fn test_type_index_caught_up_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lagging");

    {
        let tracker = open(&path);
        tracker.add_event(&event("A", "u1", "20130101")).unwrap();
        tracker.close().unwrap();
    }

    // An event that reached the log but none of the indexes
    {
        let config = TrackerConfig::for_testing();
        let mut log = EventLog::open(
            path.join("event_log"),
            EventLogConfig {
                list: config.list_config().unwrap(),
                journal: config.journal_config().unwrap(),
            },
        )
        .unwrap();
        log.add_event(&event("A", "u1", "20130102"), 0, 0).unwrap();
        log.close().unwrap();
    }

    let tracker = open(&path);
    let stats = tracker.stats();
    assert_eq!(stats.events, 2);
    assert_eq!(stats.recovery.events_reindexed, 1);
    assert_eq!(stats.event_index.indexed_events, 2);
    assert_eq!(tracker.get_user_events("u1", 0, 10).unwrap().len(), 2);

    let query = FunnelQuery::new("20130101", "20130110", ["A", "A"]);
    assert_eq!(tracker.funnel_counts(&query).unwrap(), vec![1, 1]);

    // ingestion continues from the recovered id
    assert_eq!(tracker.add_event(&event("A", "u2", "20130103")).unwrap(), 2);
}

// ============================================================================
// Ingestion rules
// ============================================================================

#[test]
fn test_invalid_date_rejected_before_write() {
    let temp_dir = TempDir::new().unwrap();
    let tracker = open(temp_dir.path());

    let result = tracker.add_event(&event("a", "x", "2013-01-01"));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(tracker.stats().events, 0);
    assert!(tracker.event_types().is_empty());
    assert_eq!(tracker.get_user_id("x"), None);
}

#[test]
fn test_strict_dates() {
    let temp_dir = TempDir::new().unwrap();
    let config = TrackerConfig {
        strict_dates: true,
        ..TrackerConfig::for_testing()
    };
    let tracker = Tracker::open_with_config(temp_dir.path(), config).unwrap();

    tracker.add_event(&event("a", "x", "20130105")).unwrap();
    tracker.add_event(&event("a", "x", "20130105")).unwrap();
    let result = tracker.add_event(&event("a", "y", "20130104"));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(tracker.stats().events, 2);
    assert_eq!(tracker.get_user_id("y"), None);
}

#[test]
fn test_lenient_dates_accept_late_events() {
    let temp_dir = TempDir::new().unwrap();
    let tracker = open(temp_dir.path());

    tracker.add_event(&event("a", "x", "20130105")).unwrap();
    tracker.add_event(&event("a", "y", "20130104")).unwrap();
    assert_eq!(tracker.stats().events, 2);

    // the late event is attributed to the latest day
    let query = RetentionQuery::new("20130105", "20130105", "a", "a").columns(0);
    assert_eq!(tracker.retention_table(&query).unwrap(), vec![vec![2]]);
}

#[test]
fn test_late_event_of_new_type_uses_latest_day() {
    let temp_dir = TempDir::new().unwrap();
    let tracker = open(temp_dir.path());

    tracker.add_event(&event("x", "u0", "20130105")).unwrap();
    tracker.add_event(&event("a", "u1", "20130103")).unwrap();

    let on_latest = RetentionQuery::new("20130105", "20130105", "a", "a").columns(0);
    assert_eq!(tracker.retention_table(&on_latest).unwrap(), vec![vec![1]]);
    let on_own_day = RetentionQuery::new("20130103", "20130103", "a", "a").columns(0);
    assert_eq!(tracker.retention_table(&on_own_day).unwrap(), vec![vec![0]]);

    // entry day and completion window agree
    tracker.add_event(&event("b", "u1", "20130106")).unwrap();
    let query = FunnelQuery::new("20130105", "20130106", ["a", "b"]).within_days(1);
    assert_eq!(tracker.funnel_counts(&query).unwrap(), vec![1, 0]);
    let query = query.within_days(2);
    assert_eq!(tracker.funnel_counts(&query).unwrap(), vec![1, 1]);
}

#[test]
fn test_empty_names_rejected_before_write() {
    let temp_dir = TempDir::new().unwrap();
    let tracker = open(temp_dir.path());

    let result = tracker.add_event(&event("ghost", "", "20130101"));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    let result = tracker.add_event(&event("", "x", "20130101"));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    assert!(tracker.event_types().is_empty());
    assert_eq!(tracker.get_user_id("x"), None);
    assert_eq!(tracker.stats().events, 0);
    assert!(!temp_dir.path().join("event_index/types/0").exists());
}

#[test]
fn test_alias_user() {
    let temp_dir = TempDir::new().unwrap();
    let tracker = open(temp_dir.path());
    tracker.add_event(&event("a", "anon-1", "20130101")).unwrap();

    let result = tracker.alias_user("alice", "nobody");
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(tracker.get_user_id("alice"), None);

    tracker.alias_user("alice", "anon-1").unwrap();
    assert_eq!(tracker.get_user_id("alice"), Some(0));

    // events of the alias land in the same sequence
    tracker.add_event(&event("b", "alice", "20130102")).unwrap();
    assert_eq!(tracker.get_user_events("anon-1", 0, 10).unwrap().len(), 2);
}

#[test]
fn test_property_autocomplete() {
    let temp_dir = TempDir::new().unwrap();
    let tracker = open(temp_dir.path());
    tracker
        .add_event(
            &Event::builder("purchase", "x", "20130101")
                .property("item", "hat")
                .build(),
        )
        .unwrap();
    tracker
        .add_or_update_user(&User::with_id("x").property("country", "nz"))
        .unwrap();

    assert_eq!(tracker.event_keys("purchase"), vec!["item"]);
    assert_eq!(tracker.event_values("purchase", "item", "h"), vec!["hat"]);
    assert_eq!(tracker.user_values("country", ""), vec!["nz"]);
}

#[test]
fn test_varz_lists_sections() {
    let temp_dir = TempDir::new().unwrap();
    let tracker = open(temp_dir.path());
    tracker.add_event(&event("a", "x", "20130101")).unwrap();

    let varz = tracker.stats().to_string();
    for section in ["Event Storage:", "User Storage:", "Event Index:", "User Event Index:"] {
        assert!(varz.contains(section), "missing {}", section);
    }
    assert!(varz.contains("events: 1"));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_readers_run_alongside_writer() {
    let temp_dir = TempDir::new().unwrap();
    let tracker = Arc::new(open(temp_dir.path()));
    tracker.add_event(&event("a", "seed", "20130101")).unwrap();

    let writer = {
        let tracker = Arc::clone(&tracker);
        std::thread::spawn(move || {
            for i in 0..200 {
                tracker
                    .add_event(&event("a", &format!("u{}", i % 17), "20130101"))
                    .unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                let query = FunnelQuery::new("20130101", "20130102", ["a"]);
                for _ in 0..50 {
                    let counts = tracker.funnel_counts(&query).unwrap();
                    assert!(counts[0] >= 1 && counts[0] <= 18);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(tracker.stats().events, 201);
    let query = FunnelQuery::new("20130101", "20130102", ["a"]);
    assert_eq!(tracker.funnel_counts(&query).unwrap(), vec![18]);
}
