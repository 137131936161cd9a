//! Property key/value index for autocomplete
//!
//! Every property seen on an event or user is recorded twice in an ordered
//! key set, once as a key and once as a key/value pair:
//!
//! ```text
//! <type>@@__KEY<key>               event property key
//! <type>@@<key>@@<value>           event property value
//! __USER_KEY@@__KEY<key>           user property key
//! __USER_KEY@@<key>@@<value>       user property value
//! ```
//!
//! so listing keys or values is a prefix scan. The set lives in a
//! `PrefixStore`: a `BTreeSet` whose new entries are journaled as one
//! MessagePack batch per ingested record.
//!
//! The index is advisory. It is not caught up after a crash; a property
//! whose batch was lost reappears the next time it is ingested.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;
use tracker_core::{Error, Event, Properties, Result, User};
use tracker_storage::{Journal, JournalConfig};

const SEPARATOR: &str = "@@";
const KEY_MARKER: &str = "__KEY";
const USER_NAMESPACE: &str = "__USER_KEY";

/// Property keys never indexed.
const IGNORED_KEYS: [&str; 4] = ["", "date", "external_user_id", "event_type"];

/// Journaled ordered set of strings with prefix lookup.
pub struct PrefixStore {
    journal: Journal,
    keys: BTreeSet<String>,
}

impl PrefixStore {
    /// Open the store in `dir`, replaying every batch.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if a batch cannot be decoded.
    pub fn open(dir: impl AsRef<Path>, config: JournalConfig) -> Result<Self> {
        let journal = Journal::open(dir, config)?;
        let mut keys = BTreeSet::new();
        journal.replay(|location, payload| {
            let batch: Vec<String> = rmp_serde::from_slice(payload).map_err(|e| {
                Error::corruption(format!("undecodable key batch at {}: {}", location, e))
            })?;
            keys.extend(batch);
            Ok(())
        })?;
        debug!(target: "tracker::properties", keys = keys.len(), "Replayed property keys");
        Ok(PrefixStore { journal, keys })
    }

    /// Insert `candidates`, journaling the ones not yet present as a batch.
    ///
    /// Returns the number of new keys.
    pub fn insert_all<I>(&mut self, candidates: I) -> Result<usize>
    where
        I: IntoIterator<Item = String>,
    {
        let mut batch: Vec<String> = candidates
            .into_iter()
            .filter(|key| !self.keys.contains(key))
            .collect();
        batch.sort();
        batch.dedup();
        if batch.is_empty() {
            return Ok(0);
        }
        self.journal.append(&rmp_serde::to_vec(&batch)?)?;
        let added = batch.len();
        self.keys.extend(batch);
        Ok(added)
    }

    /// Keys starting with `prefix`, in sorted order, with the first
    /// `strip` bytes removed.
    pub fn find_by_prefix(&self, prefix: &str, strip: usize) -> Vec<String> {
        self.keys
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(|key| key.starts_with(prefix))
            .map(|key| key.get(strip..).unwrap_or_default().to_string())
            .collect()
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Sync the journal.
    pub fn flush(&mut self) -> Result<()> {
        self.journal.flush()
    }

    /// Sync and close the journal.
    pub fn close(self) -> Result<()> {
        self.journal.close()
    }
}

/// Autocomplete index over event and user properties.
pub struct PropertiesIndex {
    store: PrefixStore,
}

impl PropertiesIndex {
    /// Open the index stored in `dir`.
    pub fn open(dir: impl AsRef<Path>, config: JournalConfig) -> Result<Self> {
        Ok(PropertiesIndex {
            store: PrefixStore::open(dir, config)?,
        })
    }

    /// Record the properties of `event`.
    pub fn add_event(&mut self, event: &Event) -> Result<()> {
        let entries = entries(event.event_type(), event.properties());
        self.store.insert_all(entries)?;
        Ok(())
    }

    /// Record the properties of `user`.
    pub fn add_user(&mut self, user: &User) -> Result<()> {
        let entries = entries(USER_NAMESPACE, user.properties());
        self.store.insert_all(entries)?;
        Ok(())
    }

    /// Property keys seen on events of `event_type`.
    pub fn event_keys(&self, event_type: &str) -> Vec<String> {
        let prefix = key_prefix(event_type);
        self.store.find_by_prefix(&prefix, prefix.len())
    }

    /// Values of `key` seen on events of `event_type` starting with `value_prefix`.
    pub fn event_values(&self, event_type: &str, key: &str, value_prefix: &str) -> Vec<String> {
        let prefix = value_prefix_of(event_type, key);
        self.store
            .find_by_prefix(&format!("{}{}", prefix, value_prefix), prefix.len())
    }

    /// Property keys seen on users.
    pub fn user_keys(&self) -> Vec<String> {
        self.event_keys(USER_NAMESPACE)
    }

    /// Values of user property `key` starting with `value_prefix`.
    pub fn user_values(&self, key: &str, value_prefix: &str) -> Vec<String> {
        self.event_values(USER_NAMESPACE, key, value_prefix)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether nothing has been indexed.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Sync the journal.
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    /// Sync and close the journal.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}

impl std::fmt::Debug for PropertiesIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertiesIndex")
            .field("entries", &self.store.len())
            .finish()
    }
}

fn key_prefix(namespace: &str) -> String {
    format!("{}{}{}", namespace, SEPARATOR, KEY_MARKER)
}

fn value_prefix_of(namespace: &str, key: &str) -> String {
    format!("{}{}{}{}", namespace, SEPARATOR, key, SEPARATOR)
}

fn entries(namespace: &str, properties: &Properties) -> Vec<String> {
    let key_prefix = key_prefix(namespace);
    properties
        .iter()
        .filter(|(key, _)| !IGNORED_KEYS.contains(&key.as_str()))
        .flat_map(|(key, value)| {
            [
                format!("{}{}", key_prefix, key),
                format!("{}{}", value_prefix_of(namespace, key), value),
            ]
        })
        .collect()
}
