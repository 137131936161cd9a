//! The tracker handle
//!
//! `Tracker` owns every component of one store directory and serializes
//! access to them: ingestion takes the write lock, queries the read lock.
//!
//! ```text
//! <dir>/tracker.toml     configuration (written on first open)
//! <dir>/.lock            exclusive process lock
//! <dir>/event_log/       payload journal + metadata list
//! <dir>/event_index/     sharded event-type index
//! <dir>/users/           user journal
//! <dir>/properties/      property autocomplete index
//! ```
//!
//! # Ingestion order
//!
//! `add_event` registers the event type and the user, appends to the event
//! log (the commit point), then indexes the event by type, by user and by
//! property. A failure after the commit point leaves the type index behind
//! the log; the next ingestion or open catches it up.

use crate::analytics::{Analytics, FunnelQuery, RetentionQuery, RetentionTable};
use crate::config::{TrackerConfig, CONFIG_FILE_NAME};
use crate::index::{EventTypeIndex, EventTypeIndexConfig, EventTypeIndexStats, UserEventIndex};
use crate::properties::PropertiesIndex;
use crate::recovery::{self, RecoveryResult};
use crate::users::JournalUserStorage;
use parking_lot::RwLock;
use std::fmt;
use std::fs::File;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracker_core::{
    parse_day, Error, Event, EventId, Result, User, UserId, UserStorage,
};
use tracker_durability::{EventLog, EventLogConfig, EventLogStats};

const EVENT_LOG_DIR: &str = "event_log";
const EVENT_INDEX_DIR: &str = "event_index";
const USERS_DIR: &str = "users";
const PROPERTIES_DIR: &str = "properties";
const LOCK_FILE_NAME: &str = ".lock";

/// Components guarded by the tracker lock.
struct Inner {
    log: EventLog,
    types: EventTypeIndex,
    user_events: UserEventIndex,
    users: Box<dyn UserStorage>,
    properties: PropertiesIndex,
}

impl Inner {
    fn analytics(&self) -> Analytics<'_> {
        Analytics::new(&self.log, &self.types, &self.user_events, self.users.as_ref())
    }

    fn flush(&mut self) -> Result<()> {
        self.log.flush()?;
        self.types.flush()?;
        self.users.flush()?;
        self.properties.flush()
    }
}

/// Embeddable event tracker over one store directory.
///
/// # Example
///
/// ```no_run
/// use tracker_engine::{FunnelQuery, Tracker};
/// use tracker_core::Event;
///
/// let tracker = Tracker::open("/tmp/tracker")?;
/// tracker.add_event(&Event::builder("signup", "alice", "20130101").build())?;
/// tracker.add_event(&Event::builder("purchase", "alice", "20130103").build())?;
///
/// let counts = tracker.funnel_counts(&FunnelQuery::new(
///     "20130101",
///     "20130108",
///     ["signup", "purchase"],
/// ))?;
/// assert_eq!(counts, vec![1, 1]);
/// # Ok::<(), tracker_core::Error>(())
/// ```
pub struct Tracker {
    dir: PathBuf,
    config: TrackerConfig,
    inner: RwLock<Inner>,
    recovery: RecoveryResult,
    _lock_file: File,
}

impl Tracker {
    /// Open the store in `dir`, creating it if needed.
    ///
    /// A default `tracker.toml` is written on first open; an existing one
    /// is loaded and validated.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfig` if `tracker.toml` is invalid
    /// - `Error::StorageError` if another process holds the store
    /// - `Error::Corruption` if any component fails to replay
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        TrackerConfig::write_default_if_missing(&config_path)?;
        let config = TrackerConfig::from_file(&config_path)?;
        Self::open_inner(dir, config, None)
    }

    /// Open the store in `dir` with `config`, replacing its `tracker.toml`.
    pub fn open_with_config(dir: impl AsRef<Path>, config: TrackerConfig) -> Result<Self> {
        let dir = dir.as_ref();
        config.validate()?;
        std::fs::create_dir_all(dir)?;
        config.write_to_file(&dir.join(CONFIG_FILE_NAME))?;
        Self::open_inner(dir, config, None)
    }

    /// Open the store with a caller-provided user storage instead of the
    /// journaled one under `<dir>/users`.
    pub fn open_with_user_storage(
        dir: impl AsRef<Path>,
        config: TrackerConfig,
        users: Box<dyn UserStorage>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        config.validate()?;
        std::fs::create_dir_all(dir)?;
        config.write_to_file(&dir.join(CONFIG_FILE_NAME))?;
        Self::open_inner(dir, config, Some(users))
    }

    fn open_inner(
        dir: &Path,
        config: TrackerConfig,
        users: Option<Box<dyn UserStorage>>,
    ) -> Result<Self> {
        let dir = dir.canonicalize()?;
        let lock_file = acquire_lock(&dir)?;

        let list = config.list_config()?;
        let journal = config.journal_config()?;

        let log = EventLog::open(
            dir.join(EVENT_LOG_DIR),
            EventLogConfig {
                list: list.clone(),
                journal: journal.clone(),
            },
        )?;
        let types = EventTypeIndex::open(
            dir.join(EVENT_INDEX_DIR),
            EventTypeIndexConfig {
                list,
                journal: journal.clone(),
                shards: config.event_type_shards,
            },
        )?;
        let users = match users {
            Some(users) => users,
            None => Box::new(JournalUserStorage::open(dir.join(USERS_DIR), journal.clone())?),
        };
        let properties = PropertiesIndex::open(dir.join(PROPERTIES_DIR), journal)?;

        let (user_events, recovery) = recovery::recover(&log, &types)?;

        info!(
            target: "tracker::db",
            path = %dir.display(),
            events = log.len(),
            users = users.len(),
            event_types = types.event_types().len(),
            durability = %config.durability,
            "Opened tracker"
        );

        Ok(Tracker {
            dir,
            config,
            inner: RwLock::new(Inner {
                log,
                types,
                user_events,
                users,
                properties,
            }),
            recovery,
            _lock_file: lock_file,
        })
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Record `event`, returning its id.
    ///
    /// Unknown event types and users are registered on the fly.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument` if the event type or external user id is
    ///   empty, if the date is not `YYYYMMDD`, or if `strict_dates` is set and
    ///   the date precedes the latest ingested one; nothing is written
    /// - storage errors from any component
    ///
    /// Once the event log has accepted the event it is stored: an error from
    /// the event-type index after that point leaves the index behind the log,
    /// and the next `add_event` or open catches it up. Retrying such a call
    /// records the event twice. A property-index failure is only logged.
    pub fn add_event(&self, event: &Event) -> Result<EventId> {
        if event.event_type().is_empty() {
            return Err(Error::invalid_argument("event type must not be empty"));
        }
        if event.external_user_id().is_empty() {
            return Err(Error::invalid_argument("external user id must not be empty"));
        }
        let day = parse_day(event.date())?;
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if self.config.strict_dates {
            if let Some(last) = inner.types.last_day() {
                if day < last {
                    return Err(Error::invalid_argument(format!(
                        "event dated {} precedes the latest ingested date {}",
                        event.date(),
                        tracker_core::format_day(last)
                    )));
                }
            }
        }

        let type_id = inner.types.ensure_event_type(event.event_type())?;
        let user_id = inner.users.ensure_user(event.external_user_id())?;
        if inner.types.watermark() < inner.log.len() {
            recovery::catch_up_type_index(&inner.log, &inner.types)?;
        }

        let id = inner.log.add_event(event, user_id, type_id)?;
        let indexed = inner.types.add_event(id, event.event_type(), day);
        inner.user_events.add_event(user_id, id);
        indexed?;
        if let Err(e) = inner.properties.add_event(event) {
            warn!(target: "tracker::properties", event_id = id, error = %e, "Property index update failed");
        }
        Ok(id)
    }

    /// Create `user` if needed and replace its properties.
    pub fn add_or_update_user(&self, user: &User) -> Result<UserId> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.users.ensure_user(user.external_id())?;
        let id = inner.users.update_user(user.clone())?;
        inner.properties.add_user(user)?;
        Ok(id)
    }

    /// Bind `from_external_id` to the user known as `to_external_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `to_external_id` is unknown or
    /// `from_external_id` already names another user; nothing is changed.
    pub fn alias_user(&self, from_external_id: &str, to_external_id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let user_id = inner.users.get_id(to_external_id).ok_or_else(|| {
            Error::invalid_argument(format!("cannot alias to unknown user '{}'", to_external_id))
        })?;
        inner.users.alias(from_external_id, user_id)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Read back event `id`.
    pub fn get_event(&self, id: EventId) -> Result<Event> {
        self.inner.read().log.get_event(id)
    }

    /// User record of `user_id`.
    pub fn get_user(&self, user_id: UserId) -> Option<User> {
        self.inner.read().users.get_user(user_id)
    }

    /// Id bound to `external_id`.
    pub fn get_user_id(&self, external_id: &str) -> Option<UserId> {
        self.inner.read().users.get_id(external_id)
    }

    /// Known event types in registration order.
    pub fn event_types(&self) -> Vec<String> {
        self.inner.read().types.event_types()
    }

    /// Up to `max_count` events of `external_id` starting at `offset`, in
    /// ingestion order. An unknown user has no events.
    pub fn get_user_events(
        &self,
        external_id: &str,
        offset: u64,
        max_count: u64,
    ) -> Result<Vec<Event>> {
        let inner = self.inner.read();
        let Some(user_id) = inner.users.get_id(external_id) else {
            return Ok(Vec::new());
        };
        let mut events = Vec::new();
        inner
            .user_events
            .enumerate_event_ids(user_id, offset, max_count, |event_id| {
                events.push(inner.log.get_event(event_id)?);
                Ok(ControlFlow::Continue(()))
            })?;
        Ok(events)
    }

    /// Property keys seen on events of `event_type`.
    pub fn event_keys(&self, event_type: &str) -> Vec<String> {
        self.inner.read().properties.event_keys(event_type)
    }

    /// Values of `key` on events of `event_type` starting with `prefix`.
    pub fn event_values(&self, event_type: &str, key: &str, prefix: &str) -> Vec<String> {
        self.inner.read().properties.event_values(event_type, key, prefix)
    }

    /// Property keys seen on users.
    pub fn user_keys(&self) -> Vec<String> {
        self.inner.read().properties.user_keys()
    }

    /// Values of user property `key` starting with `prefix`.
    pub fn user_values(&self, key: &str, prefix: &str) -> Vec<String> {
        self.inner.read().properties.user_values(key, prefix)
    }

    // ========================================================================
    // Analytics
    // ========================================================================

    /// Users reaching each step of a funnel.
    pub fn funnel_counts(&self, query: &FunnelQuery) -> Result<Vec<u64>> {
        self.inner.read().analytics().funnel_counts(query)
    }

    /// Cohort retention table.
    pub fn retention_table(&self, query: &RetentionQuery) -> Result<RetentionTable> {
        self.inner.read().analytics().retention_table(query)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Active configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Current counters.
    pub fn stats(&self) -> TrackerStats {
        let inner = self.inner.read();
        TrackerStats {
            events: inner.log.len(),
            users: inner.users.len(),
            user_events: inner.user_events.len(),
            property_entries: inner.properties.len(),
            event_log: inner.log.stats(),
            event_index: inner.types.stats(),
            recovery: self.recovery,
        }
    }

    /// Make every accepted mutation durable.
    pub fn flush(&self) -> Result<()> {
        self.inner.write().flush()
    }

    /// Flush and close the store, releasing the directory lock.
    pub fn close(self) -> Result<()> {
        let Tracker { dir, inner, .. } = self;
        let inner = inner.into_inner();
        let events = inner.log.len();
        inner.log.close()?;
        inner.types.close()?;
        let mut users = inner.users;
        users.flush()?;
        inner.properties.close()?;
        info!(target: "tracker::db", path = %dir.display(), events, "Closed tracker");
        Ok(())
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .finish()
    }
}

fn acquire_lock(dir: &Path) -> Result<File> {
    let lock_path = dir.join(LOCK_FILE_NAME);
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| Error::storage(format!("failed to open lock file: {}", e)))?;
    fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
        warn!(target: "tracker::db", path = %dir.display(), "Store directory is locked");
        Error::storage(format!(
            "tracker at '{}' is already in use by another process",
            dir.display()
        ))
    })?;
    Ok(lock_file)
}

/// Counters describing an open tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerStats {
    /// Committed events
    pub events: u64,
    /// Registered users
    pub users: u64,
    /// Events in the user event index
    pub user_events: u64,
    /// Property index entries
    pub property_entries: usize,
    /// Event log counters
    pub event_log: EventLogStats,
    /// Event-type index counters
    pub event_index: EventTypeIndexStats,
    /// Recovery performed when the store was opened
    pub recovery: RecoveryResult,
}

/// Human readable "varz" page.
impl fmt::Display for TrackerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool = &self.event_log.meta_pool;
        let journal = &self.event_log.payloads;
        writeln!(f, "Event Storage:")?;
        writeln!(f, "==============")?;
        writeln!(f, "  events: {}", self.events)?;
        writeln!(f, "  payload appends: {}", journal.appends)?;
        writeln!(f, "  payload bytes: {}", journal.bytes_written)?;
        writeln!(f, "  payload segments: {}", journal.segments)?;
        writeln!(f, "  payload syncs: {}", journal.syncs)?;
        writeln!(f, "  truncated bytes: {}", journal.truncated_bytes)?;
        writeln!(f, "  meta segments opened: {}", pool.segments_opened)?;
        writeln!(f, "  meta segments evicted: {}", pool.segments_evicted)?;
        writeln!(f, "  meta segments open: {}", pool.open_segments)?;
        writeln!(f)?;
        writeln!(f, "User Storage:")?;
        writeln!(f, "==============")?;
        writeln!(f, "  users: {}", self.users)?;
        writeln!(f, "  property entries: {}", self.property_entries)?;
        writeln!(f)?;
        writeln!(f, "Event Index:")?;
        writeln!(f, "==============")?;
        writeln!(f, "  event types: {}", self.event_index.event_types)?;
        writeln!(f, "  indexed events: {}", self.event_index.indexed_events)?;
        writeln!(f, "  shards: {}", self.event_index.shards)?;
        writeln!(f, "  largest shard: {}", self.event_index.largest_shard)?;
        writeln!(f)?;
        writeln!(f, "User Event Index:")?;
        writeln!(f, "==============")?;
        writeln!(f, "  events: {}", self.user_events)?;
        write!(
            f,
            "  recovered: {} events in {}us",
            self.recovery.events_reindexed, self.recovery.recovery_time_micros
        )
    }
}
