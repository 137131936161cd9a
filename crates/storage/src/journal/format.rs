//! Journal segment and frame format.
//!
//! Segments are named `journal-NNNNNN.log` where `NNNNNN` is a zero-padded
//! segment number.
//!
//! # Segment Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Segment Header (16 bytes)          │
//! ├────────────────────────────────────┤
//! │ Frame 1                            │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Frame Layout
//!
//! ```text
//! ┌─────────────────┬─────────────────┬─────────────────────────┐
//! │ Length (4 bytes)│ CRC32 (4 bytes) │ Payload (Length bytes)  │
//! └─────────────────┴─────────────────┴─────────────────────────┘
//! ```
//!
//! The CRC covers the payload only. Empty payloads are not valid frames, so
//! a zero-filled region never decodes as data.

use std::path::{Path, PathBuf};
use tracker_core::{Error, Result};

/// Magic bytes identifying a journal segment file: "TRKJ"
pub const JOURNAL_MAGIC: [u8; 4] = *b"TRKJ";

/// Current segment format version
pub const JOURNAL_FORMAT_VERSION: u32 = 1;

/// Size of the segment header in bytes
pub const JOURNAL_HEADER_SIZE: usize = 16;

/// Size of the frame header (length + CRC) in bytes
pub const FRAME_HEADER_SIZE: usize = 8;

/// Journal segment header (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHeader {
    /// Magic bytes: "TRKJ"
    pub magic: [u8; 4],
    /// Format version
    pub format_version: u32,
    /// Segment number
    pub segment_number: u64,
}

impl JournalHeader {
    /// Create a header for `segment_number`.
    pub fn new(segment_number: u32) -> Self {
        JournalHeader {
            magic: JOURNAL_MAGIC,
            format_version: JOURNAL_FORMAT_VERSION,
            segment_number: segment_number as u64,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; JOURNAL_HEADER_SIZE] {
        let mut bytes = [0u8; JOURNAL_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.segment_number.to_le_bytes());
        bytes
    }

    /// Deserialize and validate a header read from segment `expected`.
    pub fn from_bytes(bytes: &[u8], expected: u32) -> Result<Self> {
        if bytes.len() < JOURNAL_HEADER_SIZE {
            return Err(Error::corruption(format!(
                "journal segment {} header truncated ({} bytes)",
                expected,
                bytes.len()
            )));
        }
        let mut version = [0u8; 4];
        let mut number = [0u8; 8];
        version.copy_from_slice(&bytes[4..8]);
        number.copy_from_slice(&bytes[8..16]);

        let header = JournalHeader {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            format_version: u32::from_le_bytes(version),
            segment_number: u64::from_le_bytes(number),
        };
        if header.magic != JOURNAL_MAGIC {
            return Err(Error::corruption(format!(
                "journal segment {} has invalid magic",
                expected
            )));
        }
        if header.format_version != JOURNAL_FORMAT_VERSION {
            return Err(Error::corruption(format!(
                "journal segment {} has unsupported format version {}",
                expected, header.format_version
            )));
        }
        if header.segment_number != expected as u64 {
            return Err(Error::corruption(format!(
                "journal segment {} claims to be segment {}",
                expected, header.segment_number
            )));
        }
        Ok(header)
    }
}

/// Path of segment `number` inside `dir`.
pub fn segment_path(dir: &Path, number: u32) -> PathBuf {
    dir.join(format!("journal-{:06}.log", number))
}

/// Parse a segment number out of a file name.
pub fn parse_segment_name(name: &str) -> Option<u32> {
    name.strip_prefix("journal-")?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

/// Encode one frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Result of decoding a frame from the front of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameDecode<'a> {
    /// A whole, checksummed frame
    Complete {
        /// Payload bytes
        payload: &'a [u8],
        /// Bytes consumed including the frame header
        consumed: usize,
    },
    /// The buffer ends inside the frame
    Incomplete,
    /// Frame header declares an empty payload
    Empty,
    /// The whole frame is present but its CRC does not match
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Checksum of the bytes found
        actual: u32,
        /// Bytes the frame spans
        consumed: usize,
    },
}

/// Decode the frame at the front of `buf`.
pub fn decode_frame(buf: &[u8]) -> FrameDecode<'_> {
    if buf.len() < FRAME_HEADER_SIZE {
        return FrameDecode::Incomplete;
    }
    let mut len = [0u8; 4];
    let mut crc = [0u8; 4];
    len.copy_from_slice(&buf[0..4]);
    crc.copy_from_slice(&buf[4..8]);
    let len = u32::from_le_bytes(len) as usize;
    let expected = u32::from_le_bytes(crc);

    if len == 0 {
        return FrameDecode::Empty;
    }
    let consumed = FRAME_HEADER_SIZE + len;
    if buf.len() < consumed {
        return FrameDecode::Incomplete;
    }
    let payload = &buf[FRAME_HEADER_SIZE..consumed];
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return FrameDecode::ChecksumMismatch {
            expected,
            actual,
            consumed,
        };
    }
    FrameDecode::Complete { payload, consumed }
}
