//! Durability mode configuration
//!
//! Controls when mapped segments, list headers and journal files are flushed.

use std::fmt;
use std::str::FromStr;
use tracker_core::Error;

/// Durability mode for appends
///
/// # Modes
///
/// | Mode | flush | Data Loss Window |
/// |------|-------|-----------------|
/// | Always | Every append | Zero |
/// | Standard | Segment eviction and close | Dirty pages not yet written back by the OS |
///
/// In both modes the write order is payload first, committed count second,
/// so a crash never exposes a record whose bytes were not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// Flush after every append (slow, maximum durability)
    ///
    /// Use when losing even the latest event is unacceptable.
    Always,

    /// Flush on segment eviction, explicit `flush()` and close (the default)
    #[default]
    Standard,
}

impl DurabilityMode {
    /// Check if this mode requires a flush after every append
    pub fn requires_immediate_flush(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// Name used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            DurabilityMode::Always => "always",
            DurabilityMode::Standard => "standard",
        }
    }
}

impl fmt::Display for DurabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurabilityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(DurabilityMode::Always),
            "standard" => Ok(DurabilityMode::Standard),
            other => Err(Error::invalid_config(format!(
                "unknown durability mode '{}', expected \"standard\" or \"always\"",
                other
            ))),
        }
    }
}
