//! Fixed-size record encoding
//!
//! Every element stored in a [`SegmentedRecordList`](crate::SegmentedRecordList)
//! has the same byte size, so record `k` lives at a computable offset and a
//! list never needs per-record framing.

use tracker_core::Result;

/// A fixed-size, little-endian encodable record.
pub trait Record: Sized {
    /// Encoded size in bytes. Must be non-zero.
    const SIZE: usize;

    /// Encode into `buf`, which is exactly `Self::SIZE` bytes long.
    fn encode(&self, buf: &mut [u8]);

    /// Decode from `buf`, which is exactly `Self::SIZE` bytes long.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if the bytes do not form a valid record.
    fn decode(buf: &[u8]) -> Result<Self>;
}

impl Record for u64 {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(buf);
        Ok(u64::from_le_bytes(bytes))
    }
}
