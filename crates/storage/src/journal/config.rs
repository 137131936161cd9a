//! Journal configuration.

use crate::mode::DurabilityMode;
use tracker_core::{Error, Result};

/// Smallest segment size accepted by [`JournalConfig::validate`].
pub const MIN_JOURNAL_SEGMENT_SIZE: u64 = 1024;

/// Journal configuration parameters.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Maximum segment size in bytes (default: 64MB).
    ///
    /// When the next frame would push the active segment past this size, a
    /// new segment is started. A single frame larger than the limit still
    /// gets a segment of its own.
    pub segment_size: u64,

    /// When appends are synced.
    pub durability: DurabilityMode,
}

impl Default for JournalConfig {
    fn default() -> Self {
        JournalConfig {
            segment_size: 64 * 1024 * 1024, // 64MB
            durability: DurabilityMode::Standard,
        }
    }
}

impl JournalConfig {
    /// Create a new journal configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set segment size (builder pattern).
    pub fn with_segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Set the durability mode (builder pattern).
    pub fn with_durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.segment_size < MIN_JOURNAL_SEGMENT_SIZE {
            return Err(Error::invalid_config(format!(
                "journal segment size must be at least {} bytes, got {}",
                MIN_JOURNAL_SEGMENT_SIZE, self.segment_size
            )));
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (small segments).
    pub fn for_testing() -> Self {
        JournalConfig {
            segment_size: MIN_JOURNAL_SEGMENT_SIZE, // rotate every few frames
            durability: DurabilityMode::Standard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JournalConfig::default();
        assert_eq!(config.segment_size, 64 * 1024 * 1024);
        assert_eq!(config.durability, DurabilityMode::Standard);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = JournalConfig::new()
            .with_segment_size(4096)
            .with_durability(DurabilityMode::Always);
        assert_eq!(config.segment_size, 4096);
        assert_eq!(config.durability, DurabilityMode::Always);
    }

    #[test]
    fn test_validation_segment_too_small() {
        let config = JournalConfig::new().with_segment_size(100);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_testing_config() {
        assert!(JournalConfig::for_testing().validate().is_ok());
    }
}
