//! Store configuration via `tracker.toml`
//!
//! On first open, a default `tracker.toml` is created in the store
//! directory. To change settings, edit the file and reopen the store.
//! Layout settings (`records_per_segment`) are fixed once data exists:
//! reopening with a different value is rejected by the list headers.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracker_core::{Error, Result};
use tracker_storage::{DurabilityMode, JournalConfig, ListConfig};

/// Config file name placed in the store directory.
pub const CONFIG_FILE_NAME: &str = "tracker.toml";

/// Store configuration loaded from `tracker.toml`.
///
/// # Example
///
/// ```toml
/// durability = "standard"
/// records_per_segment = 65536
/// max_open_segments = 64
/// journal_segment_size = 67108864
/// event_type_shards = 16
/// strict_dates = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Durability mode: `"standard"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Records per segment file of every fixed-record list.
    #[serde(default = "default_records_per_segment")]
    pub records_per_segment: u64,
    /// Segments each list keeps mapped at once.
    #[serde(default = "default_max_open_segments")]
    pub max_open_segments: usize,
    /// Journal segment size in bytes.
    #[serde(default = "default_journal_segment_size")]
    pub journal_segment_size: u64,
    /// Number of event-type index shards.
    #[serde(default = "default_event_type_shards")]
    pub event_type_shards: usize,
    /// Reject events dated before the latest ingested date.
    #[serde(default)]
    pub strict_dates: bool,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

fn default_records_per_segment() -> u64 {
    64 * 1024
}

fn default_max_open_segments() -> usize {
    64
}

fn default_journal_segment_size() -> u64 {
    64 * 1024 * 1024
}

fn default_event_type_shards() -> usize {
    16
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            records_per_segment: default_records_per_segment(),
            max_open_segments: default_max_open_segments(),
            journal_segment_size: default_journal_segment_size(),
            event_type_shards: default_event_type_shards(),
            strict_dates: false,
        }
    }
}

impl TrackerConfig {
    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"standard"` or `"always"`.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        self.durability.parse()
    }

    /// Configuration for fixed-record lists.
    pub fn list_config(&self) -> Result<ListConfig> {
        Ok(ListConfig::new()
            .with_records_per_segment(self.records_per_segment)
            .with_max_open_segments(self.max_open_segments)
            .with_durability(self.durability_mode()?))
    }

    /// Configuration for journals.
    pub fn journal_config(&self) -> Result<JournalConfig> {
        Ok(JournalConfig::new()
            .with_segment_size(self.journal_segment_size)
            .with_durability(self.durability_mode()?))
    }

    /// Validate every setting.
    pub fn validate(&self) -> Result<()> {
        self.list_config()?.validate(8)?;
        self.journal_config()?.validate()?;
        if self.event_type_shards == 0 {
            return Err(Error::invalid_config("event_type_shards must be non-zero"));
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (tiny segments).
    pub fn for_testing() -> Self {
        let list = ListConfig::for_testing();
        Self {
            records_per_segment: list.records_per_segment,
            max_open_segments: list.max_open_segments,
            journal_segment_size: JournalConfig::for_testing().segment_size,
            event_type_shards: 4,
            ..Self::default()
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Event tracker configuration
#
# Durability mode: "standard" (default) or "always"
#   "standard" = flush on segment eviction, flush() and close
#   "always"   = flush every append, zero data loss
durability = "standard"

# Records per segment file of the fixed-record lists.
# Fixed once the store holds data.
records_per_segment = 65536

# Segments each list keeps memory mapped at once.
max_open_segments = 64

# Journal segment size in bytes (minimum 1024).
journal_segment_size = 67108864

# Number of independent event-type index shards.
event_type_shards = 16

# Reject events dated before the latest ingested date.
strict_dates = false
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: TrackerConfig = toml::from_str(&content).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::SerializationError(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
