//! Journaled append-only name table
//!
//! Assigns dense `u32` ids to names in first-seen order. Every new name is
//! appended to a journal as its UTF-8 bytes; on open the journal is
//! replayed and the id of a name is its position in the journal.

use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::debug;
use tracker_core::{Error, Result};
use tracker_storage::{Journal, JournalConfig};

/// Append-only `name <-> id` table backed by a journal.
pub struct NameTable {
    journal: Journal,
    names: Vec<String>,
    ids: FxHashMap<String, u32>,
}

impl NameTable {
    /// Open the table stored in `dir`, replaying every recorded name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if the journal holds a name that is not
    /// UTF-8 or that appears twice.
    pub fn open(dir: impl AsRef<Path>, config: JournalConfig) -> Result<Self> {
        let journal = Journal::open(dir, config)?;
        let mut names = Vec::new();
        let mut ids = FxHashMap::default();

        journal.replay(|location, payload| {
            let name = std::str::from_utf8(payload).map_err(|_| {
                Error::corruption(format!("name at {} is not valid UTF-8", location))
            })?;
            let id = u32::try_from(names.len())
                .map_err(|_| Error::corruption("name table exceeds u32 ids"))?;
            if ids.insert(name.to_string(), id).is_some() {
                return Err(Error::corruption(format!(
                    "name '{}' recorded twice in name table",
                    name
                )));
            }
            names.push(name.to_string());
            Ok(())
        })?;

        debug!(target: "tracker::durability", path = %journal.dir().display(), names = names.len(), "Replayed name table");

        Ok(NameTable {
            journal,
            names,
            ids,
        })
    }

    /// Id of `name`, assigning the next id if it is new.
    ///
    /// Returns the id and whether it was newly assigned.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty name.
    pub fn ensure(&mut self, name: &str) -> Result<(u32, bool)> {
        if let Some(id) = self.ids.get(name) {
            return Ok((*id, false));
        }
        if name.is_empty() {
            return Err(Error::invalid_argument("names must not be empty"));
        }
        let id = u32::try_from(self.names.len())
            .map_err(|_| Error::storage("name table exhausted the u32 id space"))?;
        self.journal.append(name.as_bytes())?;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        Ok((id, true))
    }

    /// Id of `name`, if known.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    /// Name assigned to `id`, if any.
    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    /// All names in id order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
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

impl std::fmt::Debug for NameTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameTable")
            .field("names", &self.names.len())
            .finish()
    }
}
