//! User storage implementations
//!
//! Both implementations share `UserTable`, the in-memory model: a dense
//! vector of user records indexed by `UserId` and a map from every bound
//! external id (canonical or alias) to its user id.
//!
//! - `MemUserStorage`: the table alone, nothing persisted
//! - `JournalUserStorage`: the table plus a journal of `UserRecord`s
//!   (MessagePack), replayed on open with last-write-wins semantics

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use tracker_core::{Criterion, Error, Properties, Result, User, UserId, UserStorage};
use tracker_storage::{Journal, JournalConfig};

/// In-memory user model shared by the storage implementations.
#[derive(Debug, Default)]
struct UserTable {
    users: Vec<User>,
    ids: FxHashMap<String, UserId>,
}

impl UserTable {
    fn next_id(&self) -> UserId {
        self.users.len() as UserId
    }

    fn insert(&mut self, external_id: &str) -> UserId {
        let id = self.next_id();
        self.users.push(User::with_id(external_id));
        self.ids.insert(external_id.to_string(), id);
        id
    }

    fn set_properties(&mut self, user_id: UserId, properties: Properties) {
        if let Some(slot) = self.users.get_mut(user_id as usize) {
            *slot = User::new(slot.external_id().to_string(), properties);
        }
    }

    fn contains(&self, user_id: UserId) -> bool {
        (user_id as usize) < self.users.len()
    }

    /// Check that `external_id` may be bound to `user_id`.
    ///
    /// Returns `false` when the binding already exists.
    fn check_alias(&self, external_id: &str, user_id: UserId) -> Result<bool> {
        if !self.contains(user_id) {
            return Err(Error::invalid_argument(format!(
                "cannot alias '{}': user {} does not exist",
                external_id, user_id
            )));
        }
        match self.ids.get(external_id) {
            Some(bound) if *bound == user_id => Ok(false),
            Some(bound) => Err(Error::invalid_argument(format!(
                "external id '{}' is already bound to user {}",
                external_id, bound
            ))),
            None => Ok(true),
        }
    }

    fn satisfy(&self, user_id: UserId, criteria: &[Criterion]) -> bool {
        if criteria.is_empty() {
            return true;
        }
        match self.users.get(user_id as usize) {
            Some(user) => criteria.iter().all(|c| c.matches(user.properties())),
            None => false,
        }
    }
}

/// Non-persistent `UserStorage`.
#[derive(Debug, Default)]
pub struct MemUserStorage {
    table: UserTable,
}

impl MemUserStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStorage for MemUserStorage {
    fn ensure_user(&mut self, external_id: &str) -> Result<UserId> {
        if let Some(id) = self.table.ids.get(external_id) {
            return Ok(*id);
        }
        if external_id.is_empty() {
            return Err(Error::invalid_argument("external user id must not be empty"));
        }
        Ok(self.table.insert(external_id))
    }

    fn get_id(&self, external_id: &str) -> Option<UserId> {
        self.table.ids.get(external_id).copied()
    }

    fn get_user(&self, user_id: UserId) -> Option<User> {
        self.table.users.get(user_id as usize).cloned()
    }

    fn update_user(&mut self, user: User) -> Result<UserId> {
        let id = self.get_id(user.external_id()).ok_or_else(|| {
            Error::precondition(format!("user '{}' does not exist", user.external_id()))
        })?;
        self.table.set_properties(id, user.into_properties());
        Ok(id)
    }

    fn alias(&mut self, external_id: &str, user_id: UserId) -> Result<()> {
        if self.table.check_alias(external_id, user_id)? {
            self.table.ids.insert(external_id.to_string(), user_id);
        }
        Ok(())
    }

    fn satisfy(&self, user_id: UserId, criteria: &[Criterion]) -> bool {
        self.table.satisfy(user_id, criteria)
    }

    fn len(&self) -> u64 {
        self.table.next_id()
    }
}

/// One journaled user mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum UserRecord {
    /// Create user `user_id` or replace its properties.
    Upsert {
        user_id: UserId,
        external_id: String,
        properties: Properties,
    },
    /// Bind `external_id` to `user_id`.
    Alias {
        external_id: String,
        user_id: UserId,
    },
}

/// `UserStorage` persisted as a journal of upserts and aliases.
pub struct JournalUserStorage {
    journal: Journal,
    table: UserTable,
}

impl JournalUserStorage {
    /// Open the storage in `dir`, replaying every recorded mutation.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if a record cannot be decoded or refers to
    /// a user that was never created.
    pub fn open(dir: impl AsRef<Path>, config: JournalConfig) -> Result<Self> {
        let journal = Journal::open(dir, config)?;
        let mut table = UserTable::default();
        let mut records = 0u64;

        journal.replay(|location, payload| {
            let record: UserRecord = rmp_serde::from_slice(payload).map_err(|e| {
                Error::corruption(format!("undecodable user record at {}: {}", location, e))
            })?;
            apply(&mut table, record).map_err(|e| {
                Error::corruption(format!("invalid user record at {}: {}", location, e))
            })?;
            records += 1;
            Ok(())
        })?;

        debug!(target: "tracker::users", users = table.users.len(), records, "Replayed user journal");

        Ok(JournalUserStorage { journal, table })
    }

    fn append(&mut self, record: &UserRecord) -> Result<()> {
        let bytes = rmp_serde::to_vec(record)?;
        self.journal.append(&bytes)?;
        Ok(())
    }

    /// Sync and close the journal.
    pub fn close(self) -> Result<()> {
        self.journal.close()
    }
}

fn apply(table: &mut UserTable, record: UserRecord) -> Result<()> {
    match record {
        UserRecord::Upsert {
            user_id,
            external_id,
            properties,
        } => {
            let next = table.next_id();
            if user_id == next {
                table.insert(&external_id);
            } else if user_id > next {
                return Err(Error::corruption(format!(
                    "user {} created before user {}",
                    user_id, next
                )));
            }
            table.set_properties(user_id, properties);
        }
        UserRecord::Alias {
            external_id,
            user_id,
        } => {
            if table.check_alias(&external_id, user_id)? {
                table.ids.insert(external_id, user_id);
            }
        }
    }
    Ok(())
}

impl UserStorage for JournalUserStorage {
    fn ensure_user(&mut self, external_id: &str) -> Result<UserId> {
        if let Some(id) = self.table.ids.get(external_id) {
            return Ok(*id);
        }
        if external_id.is_empty() {
            return Err(Error::invalid_argument("external user id must not be empty"));
        }
        let record = UserRecord::Upsert {
            user_id: self.table.next_id(),
            external_id: external_id.to_string(),
            properties: Properties::new(),
        };
        self.append(&record)?;
        Ok(self.table.insert(external_id))
    }

    fn get_id(&self, external_id: &str) -> Option<UserId> {
        self.table.ids.get(external_id).copied()
    }

    fn get_user(&self, user_id: UserId) -> Option<User> {
        self.table.users.get(user_id as usize).cloned()
    }

    fn update_user(&mut self, user: User) -> Result<UserId> {
        let id = self.get_id(user.external_id()).ok_or_else(|| {
            Error::precondition(format!("user '{}' does not exist", user.external_id()))
        })?;
        let record = UserRecord::Upsert {
            user_id: id,
            external_id: user.external_id().to_string(),
            properties: user.properties().clone(),
        };
        self.append(&record)?;
        self.table.set_properties(id, user.into_properties());
        Ok(id)
    }

    fn alias(&mut self, external_id: &str, user_id: UserId) -> Result<()> {
        if !self.table.check_alias(external_id, user_id)? {
            return Ok(());
        }
        self.append(&UserRecord::Alias {
            external_id: external_id.to_string(),
            user_id,
        })?;
        self.table.ids.insert(external_id.to_string(), user_id);
        Ok(())
    }

    fn satisfy(&self, user_id: UserId, criteria: &[Criterion]) -> bool {
        self.table.satisfy(user_id, criteria)
    }

    fn len(&self) -> u64 {
        self.table.next_id()
    }

    fn flush(&mut self) -> Result<()> {
        self.journal.flush()
    }
}

impl std::fmt::Debug for JournalUserStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalUserStorage")
            .field("users", &self.table.users.len())
            .field("bound_ids", &self.table.ids.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(storage: &mut dyn UserStorage) {
        assert_eq!(storage.ensure_user("alice").unwrap(), 0);
        assert_eq!(storage.ensure_user("bob").unwrap(), 1);
        assert_eq!(storage.ensure_user("alice").unwrap(), 0);
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.get_id("bob"), Some(1));
        assert_eq!(storage.get_id("carol"), None);

        let id = storage
            .update_user(User::with_id("bob").property("country", "nz"))
            .unwrap();
        assert_eq!(id, 1);
        assert!(storage.satisfy(1, &[Criterion::new("country", "nz")]));
        assert!(!storage.satisfy(0, &[Criterion::new("country", "nz")]));
        assert!(storage.satisfy(0, &[]));
        assert!(!storage.satisfy(9, &[Criterion::new("country", "nz")]));
        assert!(storage.satisfy(9, &[]));

        storage.alias("robert", 1).unwrap();
        assert_eq!(storage.get_id("robert"), Some(1));
        assert_eq!(storage.get_user(1).unwrap().external_id(), "bob");
    }

    #[test]
    fn test_mem_storage_operations() {
        let mut storage = MemUserStorage::new();
        exercise(&mut storage);
    }

    #[test]
    fn test_update_unknown_user_is_precondition() {
        let mut storage = MemUserStorage::new();
        let result = storage.update_user(User::with_id("ghost"));
        assert!(matches!(result, Err(Error::PreconditionViolation(_))));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_alias_to_missing_user_does_not_mutate() {
        let mut storage = MemUserStorage::new();
        storage.ensure_user("alice").unwrap();
        let result = storage.alias("al", 5);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(storage.get_id("al"), None);
    }

    #[test]
    fn test_alias_rebinding_rejected() {
        let mut storage = MemUserStorage::new();
        storage.ensure_user("alice").unwrap();
        storage.ensure_user("bob").unwrap();
        assert!(storage.alias("bob", 0).is_err());
        assert_eq!(storage.get_id("bob"), Some(1));
        storage.alias("alice", 0).unwrap();
    }

    #[test]
    fn test_update_through_alias_keeps_canonical_id() {
        let mut storage = MemUserStorage::new();
        storage.ensure_user("alice").unwrap();
        storage.alias("al", 0).unwrap();
        storage
            .update_user(User::with_id("al").property("plan", "pro"))
            .unwrap();
        let user = storage.get_user(0).unwrap();
        assert_eq!(user.external_id(), "alice");
        assert_eq!(user.properties().get("plan").map(String::as_str), Some("pro"));
    }

    #[test]
    fn test_journal_storage_operations() {
        let dir = TempDir::new().unwrap();
        let mut storage = JournalUserStorage::open(dir.path(), JournalConfig::for_testing()).unwrap();
        exercise(&mut storage);
    }

    #[test]
    fn test_journal_storage_replays_last_write() {
        let dir = TempDir::new().unwrap();
        {
            let mut storage =
                JournalUserStorage::open(dir.path(), JournalConfig::for_testing()).unwrap();
            storage.ensure_user("alice").unwrap();
            storage.ensure_user("bob").unwrap();
            storage
                .update_user(User::with_id("alice").property("plan", "free"))
                .unwrap();
            storage
                .update_user(User::with_id("alice").property("plan", "pro"))
                .unwrap();
            storage.alias("al", 0).unwrap();
            assert!(storage.alias("nobody", 7).is_err());
            storage.close().unwrap();
        }

        let mut storage = JournalUserStorage::open(dir.path(), JournalConfig::for_testing()).unwrap();
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.get_id("al"), Some(0));
        assert_eq!(storage.get_id("nobody"), None);
        assert!(storage.satisfy(0, &[Criterion::new("plan", "pro")]));
        assert!(!storage.satisfy(0, &[Criterion::new("plan", "free")]));
        assert_eq!(storage.ensure_user("carol").unwrap(), 2);
    }

    #[test]
    fn test_undecodable_record_is_corruption() {
        let dir = TempDir::new().unwrap();
        {
            let mut journal = Journal::open(dir.path(), JournalConfig::for_testing()).unwrap();
            journal.append(&[0xc1, 0xff, 0x00]).unwrap();
        }
        let result = JournalUserStorage::open(dir.path(), JournalConfig::for_testing());
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_user_created_out_of_order_is_corruption() {
        let dir = TempDir::new().unwrap();
        {
            let mut journal = Journal::open(dir.path(), JournalConfig::for_testing()).unwrap();
            let record = UserRecord::Upsert {
                user_id: 3,
                external_id: "x".to_string(),
                properties: Properties::new(),
            };
            journal.append(&rmp_serde::to_vec(&record).unwrap()).unwrap();
        }
        let result = JournalUserStorage::open(dir.path(), JournalConfig::for_testing());
        assert!(matches!(result, Err(Error::Corruption(_))));
    }
}
