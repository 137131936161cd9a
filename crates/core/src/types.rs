//! Core data types for the event tracker
//!
//! This module defines:
//! - EventId / UserId / EventTypeId: dense numeric identifiers
//! - Event: an immutable, schema-free tracked event
//! - User: a mutable user record
//! - Criterion: a property equality predicate

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dense, monotonically increasing identifier assigned to every event.
///
/// The id space is contiguous from 0 and doubles as the row index into
/// every per-event array.
pub type EventId = u64;

/// Dense identifier assigned to a user on first sight of its external id.
pub type UserId = u64;

/// Dense identifier assigned to an event type on first sight of its name.
pub type EventTypeId = u32;

/// Property map attached to events and users.
///
/// A `BTreeMap` keeps serialization deterministic; key order carries no meaning.
pub type Properties = BTreeMap<String, String>;

/// A tracked event.
///
/// Immutable once constructed. `date` is a `YYYYMMDD` string; events of one
/// ingestion stream must arrive with non-decreasing dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    event_type: String,
    external_user_id: String,
    date: String,
    properties: Properties,
}

impl Event {
    /// Create a new event
    pub fn new(
        event_type: impl Into<String>,
        external_user_id: impl Into<String>,
        date: impl Into<String>,
        properties: Properties,
    ) -> Self {
        Event {
            event_type: event_type.into(),
            external_user_id: external_user_id.into(),
            date: date.into(),
            properties,
        }
    }

    /// Start building an event with no properties
    pub fn builder(
        event_type: impl Into<String>,
        external_user_id: impl Into<String>,
        date: impl Into<String>,
    ) -> EventBuilder {
        EventBuilder {
            event: Event::new(event_type, external_user_id, date, Properties::new()),
        }
    }

    /// Event type name
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// External (caller supplied) user id
    pub fn external_user_id(&self) -> &str {
        &self.external_user_id
    }

    /// Event date as `YYYYMMDD`
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Event properties
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Get a single property value
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Builder for [`Event`]
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    /// Add a property (later values for the same key win)
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.event.properties.insert(key.into(), value.into());
        self
    }

    /// Finish building
    pub fn build(self) -> Event {
        self.event
    }
}

/// A user record.
///
/// The only mutable entity in the store: `add_or_update_user` replaces
/// the property map of an existing user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    external_id: String,
    properties: Properties,
}

impl User {
    /// Create a new user record
    pub fn new(external_id: impl Into<String>, properties: Properties) -> Self {
        User {
            external_id: external_id.into(),
            properties,
        }
    }

    /// Create a user with no properties
    pub fn with_id(external_id: impl Into<String>) -> Self {
        User::new(external_id, Properties::new())
    }

    /// Add a property (builder style)
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// External (caller supplied) user id
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// User properties
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Consume the record, keeping its properties
    pub fn into_properties(self) -> Properties {
        self.properties
    }
}

/// Property equality predicate.
///
/// A criterion holds iff the property map contains `key` mapped to exactly
/// `value`. A list of criteria is a conjunction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Criterion {
    /// Property key
    pub key: String,
    /// Required property value
    pub value: String,
}

impl Criterion {
    /// Create a new criterion
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Criterion {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Check this criterion against a property map
    #[inline]
    pub fn matches(&self, properties: &Properties) -> bool {
        properties.get(&self.key) == Some(&self.value)
    }
}
