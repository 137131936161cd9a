//! Segmented list configuration.

use crate::mode::DurabilityMode;
use tracker_core::{Error, Result};

/// Largest segment the list will map.
///
/// A mapping is addressed with `usize` offsets and slices are bounded by
/// `isize::MAX` bytes.
pub const MAX_SEGMENT_BYTES: u64 = isize::MAX as u64;

/// Segmented list configuration parameters.
#[derive(Debug, Clone)]
pub struct ListConfig {
    /// Records per segment file (default: 65 536).
    ///
    /// Segment `i` holds records `[i * N, (i + 1) * N)`.
    pub records_per_segment: u64,

    /// Maximum number of segments mapped at once (default: 64).
    ///
    /// The least recently used segment is flushed and unmapped when the
    /// pool is full.
    pub max_open_segments: usize,

    /// When appends are flushed.
    pub durability: DurabilityMode,
}

impl Default for ListConfig {
    fn default() -> Self {
        ListConfig {
            records_per_segment: 64 * 1024,
            max_open_segments: 64,
            durability: DurabilityMode::Standard,
        }
    }
}

impl ListConfig {
    /// Create a new list configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set records per segment (builder pattern).
    pub fn with_records_per_segment(mut self, records: u64) -> Self {
        self.records_per_segment = records;
        self
    }

    /// Set the segment pool capacity (builder pattern).
    pub fn with_max_open_segments(mut self, segments: usize) -> Self {
        self.max_open_segments = segments;
        self
    }

    /// Set the durability mode (builder pattern).
    pub fn with_durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    /// Validate the configuration for a given record size.
    ///
    /// Returns the segment size in bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if any parameter is zero or a segment
    /// would exceed [`MAX_SEGMENT_BYTES`].
    pub fn validate(&self, record_size: usize) -> Result<usize> {
        if record_size == 0 {
            return Err(Error::invalid_config("record size must be non-zero"));
        }
        if self.records_per_segment == 0 {
            return Err(Error::invalid_config("records_per_segment must be non-zero"));
        }
        if self.max_open_segments == 0 {
            return Err(Error::invalid_config("max_open_segments must be non-zero"));
        }
        let segment_bytes = self
            .records_per_segment
            .checked_mul(record_size as u64)
            .filter(|bytes| *bytes <= MAX_SEGMENT_BYTES)
            .ok_or_else(|| {
                Error::invalid_config(format!(
                    "segment of {} records x {} bytes exceeds the {} byte mapping limit",
                    self.records_per_segment, record_size, MAX_SEGMENT_BYTES
                ))
            })?;
        usize::try_from(segment_bytes)
            .map_err(|_| Error::invalid_config("segment size does not fit in usize"))
    }

    /// Create a configuration optimized for testing (tiny segments, tiny pool).
    pub fn for_testing() -> Self {
        ListConfig {
            records_per_segment: 4,
            max_open_segments: 2,
            durability: DurabilityMode::Standard,
        }
    }
}
