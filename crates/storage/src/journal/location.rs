//! Journal location tokens.

use tracker_core::{Error, Result};

/// Encoded size of a [`Location`] in bytes.
pub const LOCATION_SIZE: usize = 16;

/// Position of one framed payload inside a journal.
///
/// # Binary Format (16 bytes, little endian)
///
/// ```text
/// segment(4) + offset(8) + length(4)
/// ```
///
/// `offset` is the byte offset of the frame header inside the segment file
/// and `length` is the payload length (excluding the frame header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    /// Segment number
    pub segment: u32,
    /// Frame offset within the segment
    pub offset: u64,
    /// Payload length
    pub length: u32,
}

impl Location {
    /// Create a location.
    pub fn new(segment: u32, offset: u64, length: u32) -> Self {
        Location {
            segment,
            offset,
            length,
        }
    }

    /// Serialize to the fixed-size form.
    pub fn to_bytes(&self) -> [u8; LOCATION_SIZE] {
        let mut bytes = [0u8; LOCATION_SIZE];
        bytes[0..4].copy_from_slice(&self.segment.to_le_bytes());
        bytes[4..12].copy_from_slice(&self.offset.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }

    /// Deserialize from the fixed-size form.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if `bytes` is not exactly
    /// [`LOCATION_SIZE`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != LOCATION_SIZE {
            return Err(Error::corruption(format!(
                "location token must be {} bytes, got {}",
                LOCATION_SIZE,
                bytes.len()
            )));
        }
        let mut segment = [0u8; 4];
        let mut offset = [0u8; 8];
        let mut length = [0u8; 4];
        segment.copy_from_slice(&bytes[0..4]);
        offset.copy_from_slice(&bytes[4..12]);
        length.copy_from_slice(&bytes[12..16]);
        Ok(Location {
            segment: u32::from_le_bytes(segment),
            offset: u64::from_le_bytes(offset),
            length: u32::from_le_bytes(length),
        })
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}+{}", self.segment, self.offset, self.length)
    }
}
