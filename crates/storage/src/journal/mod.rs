//! Append-only journal of variable-length framed payloads
//!
//! - `config`: journal configuration (JournalConfig)
//! - `format`: segment header and frame encoding
//! - `location`: fixed-size location tokens returned by appends
//!
//! The journal is a directory of segment files. Appends go to the active
//! (highest numbered) segment and rotate when it reaches the configured
//! size. Every append returns a [`Location`] that reads the payload back.
//!
//! # Recovery
//!
//! On open, the active segment is scanned. A torn tail left by a crash (an
//! incomplete frame, a zero-filled region, or a final frame whose checksum
//! does not match) is truncated with a warning. Any other checksum mismatch
//! is corruption and refuses the open.

pub mod config;
pub mod format;
pub mod location;

pub use config::{JournalConfig, MIN_JOURNAL_SEGMENT_SIZE};
pub use format::{FRAME_HEADER_SIZE, JOURNAL_HEADER_SIZE, JOURNAL_MAGIC};
pub use location::{Location, LOCATION_SIZE};

use format::{decode_frame, encode_frame, parse_segment_name, segment_path, FrameDecode, JournalHeader};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracker_core::{Error, Result};

/// Cumulative journal counters.
///
/// These counters accumulate over the lifetime of the `Journal` and are
/// never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JournalStats {
    /// Payloads appended
    pub appends: u64,
    /// Frame bytes written (headers included)
    pub bytes_written: u64,
    /// sync_data calls
    pub syncs: u64,
    /// Segment files in the journal
    pub segments: u32,
    /// Bytes dropped from a torn tail when the journal was opened
    pub truncated_bytes: u64,
}

/// Segmented append-only journal.
pub struct Journal {
    dir: PathBuf,
    config: JournalConfig,
    active: File,
    active_segment: u32,
    active_size: u64,
    readers: Mutex<FxHashMap<u32, File>>,
    stats: JournalStats,
}

impl Journal {
    /// Open the journal stored in `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfig` if the configuration is invalid
    /// - `Error::Corruption` if segments are missing or a segment is damaged
    ///   anywhere other than its torn tail
    /// - `Error::IoError` on filesystem failures
    pub fn open(dir: impl AsRef<Path>, config: JournalConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let segments = list_segments(&dir)?;
        for (expected, found) in segments.iter().enumerate() {
            if *found != expected as u32 {
                return Err(Error::corruption(format!(
                    "journal '{}' is missing segment {}",
                    dir.display(),
                    expected
                )));
            }
        }

        let mut truncated_bytes = 0;
        let (active_segment, active_size) = match segments.last() {
            None => {
                create_segment(&dir, 0)?;
                (0, JOURNAL_HEADER_SIZE as u64)
            }
            Some(&last) => {
                let (valid_end, dropped) = recover_tail(&dir, last)?;
                truncated_bytes = dropped;
                (last, valid_end)
            }
        };

        let active = OpenOptions::new()
            .append(true)
            .open(segment_path(&dir, active_segment))?;

        debug!(
            target: "tracker::journal",
            path = %dir.display(),
            segments = active_segment + 1,
            active_size,
            "Opened journal"
        );

        Ok(Journal {
            dir,
            config,
            active,
            active_segment,
            active_size,
            readers: Mutex::new(FxHashMap::default()),
            stats: JournalStats {
                segments: active_segment + 1,
                truncated_bytes,
                ..JournalStats::default()
            },
        })
    }

    /// Append a payload, returning its location.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty payload or one longer
    /// than `u32::MAX` bytes.
    pub fn append(&mut self, payload: &[u8]) -> Result<Location> {
        if payload.is_empty() {
            return Err(Error::invalid_argument("journal payload must not be empty"));
        }
        let length = u32::try_from(payload.len()).map_err(|_| {
            Error::invalid_argument(format!(
                "journal payload of {} bytes exceeds the frame limit",
                payload.len()
            ))
        })?;

        let frame = encode_frame(payload);
        if self.active_size > JOURNAL_HEADER_SIZE as u64
            && self.active_size + frame.len() as u64 > self.config.segment_size
        {
            self.rotate()?;
        }

        let offset = self.active_size;
        self.active.write_all(&frame)?;
        self.active_size += frame.len() as u64;

        if self.config.durability.requires_immediate_flush() {
            self.active.sync_data()?;
            self.stats.syncs += 1;
        }
        self.stats.appends += 1;
        self.stats.bytes_written += frame.len() as u64;

        Ok(Location::new(self.active_segment, offset, length))
    }

    /// Read the payload stored at `location`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if the location does not point at an
    /// intact frame of the recorded length.
    pub fn read(&self, location: Location) -> Result<Vec<u8>> {
        if location.segment > self.active_segment
            || location.offset < JOURNAL_HEADER_SIZE as u64
            || location.length == 0
        {
            return Err(Error::corruption(format!(
                "malformed journal location {}",
                location
            )));
        }

        let mut readers = self.readers.lock();
        let file = match readers.entry(location.segment) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let path = segment_path(&self.dir, location.segment);
                let file = File::open(&path).map_err(|e| match e.kind() {
                    ErrorKind::NotFound => Error::corruption(format!(
                        "journal segment '{}' is missing",
                        path.display()
                    )),
                    _ => Error::IoError(e),
                })?;
                entry.insert(file)
            }
        };

        let truncated = |e: std::io::Error| match e.kind() {
            ErrorKind::UnexpectedEof => {
                Error::corruption(format!("truncated journal frame at {}", location))
            }
            _ => Error::IoError(e),
        };

        let frame_len = FRAME_HEADER_SIZE as u64 + u64::from(location.length);
        let segment_len = file.metadata()?.len();
        if location.offset.saturating_add(frame_len) > segment_len {
            return Err(Error::corruption(format!(
                "journal location {} extends past the end of its segment ({} bytes)",
                location, segment_len
            )));
        }

        file.seek(SeekFrom::Start(location.offset))?;
        let mut frame = vec![0u8; frame_len as usize];
        file.read_exact(&mut frame).map_err(truncated)?;

        match decode_frame(&frame) {
            FrameDecode::Complete { payload, consumed } if consumed == frame.len() => {
                Ok(payload.to_vec())
            }
            other => Err(Error::corruption(format!(
                "journal frame at {} does not match its location ({})",
                location,
                describe(&other)
            ))),
        }
    }

    /// Visit every payload in append order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` at the first damaged frame, or whatever
    /// error `visit` returns.
    pub fn replay<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(Location, &[u8]) -> Result<()>,
    {
        for segment in 0..=self.active_segment {
            let bytes = std::fs::read(segment_path(&self.dir, segment))?;
            JournalHeader::from_bytes(&bytes, segment)?;

            let mut offset = JOURNAL_HEADER_SIZE;
            while offset < bytes.len() {
                match decode_frame(&bytes[offset..]) {
                    FrameDecode::Complete { payload, consumed } => {
                        let location = Location::new(segment, offset as u64, payload.len() as u32);
                        visit(location, payload)?;
                        offset += consumed;
                    }
                    other => {
                        return Err(Error::corruption(format!(
                            "journal segment {} damaged at offset {} ({})",
                            segment,
                            offset,
                            describe(&other)
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    /// Sync the active segment.
    pub fn flush(&mut self) -> Result<()> {
        self.active.sync_data()?;
        self.stats.syncs += 1;
        Ok(())
    }

    /// Sync and close the journal.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        debug!(target: "tracker::journal", path = %self.dir.display(), "Closed journal");
        Ok(())
    }

    /// Directory holding the segment files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether nothing has ever been appended.
    pub fn is_empty(&self) -> bool {
        self.active_segment == 0 && self.active_size == JOURNAL_HEADER_SIZE as u64
    }

    /// Journal counters.
    pub fn stats(&self) -> JournalStats {
        self.stats
    }

    fn rotate(&mut self) -> Result<()> {
        self.active.sync_data()?;
        self.stats.syncs += 1;

        let next = self
            .active_segment
            .checked_add(1)
            .ok_or_else(|| Error::storage("journal segment numbers exhausted"))?;
        create_segment(&self.dir, next)?;
        self.active = OpenOptions::new()
            .append(true)
            .open(segment_path(&self.dir, next))?;
        self.active_segment = next;
        self.active_size = JOURNAL_HEADER_SIZE as u64;
        self.stats.segments = next + 1;

        debug!(target: "tracker::journal", segment = next, path = %self.dir.display(), "Rotated journal segment");
        Ok(())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("dir", &self.dir)
            .field("active_segment", &self.active_segment)
            .field("active_size", &self.active_size)
            .finish()
    }
}

/// Describe a frame decode outcome for error messages.
fn describe(decode: &FrameDecode<'_>) -> String {
    match decode {
        FrameDecode::Complete { consumed, .. } => format!("frame of {} bytes", consumed),
        FrameDecode::Incomplete => "incomplete frame".to_string(),
        FrameDecode::Empty => "empty frame".to_string(),
        FrameDecode::ChecksumMismatch {
            expected, actual, ..
        } => format!("checksum mismatch: expected {:08x}, got {:08x}", expected, actual),
    }
}

fn list_segments(dir: &Path) -> Result<Vec<u32>> {
    let mut segments = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(number) = entry.file_name().to_str().and_then(parse_segment_name) {
            segments.push(number);
        }
    }
    segments.sort_unstable();
    Ok(segments)
}

fn create_segment(dir: &Path, number: u32) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(segment_path(dir, number))?;
    file.write_all(&JournalHeader::new(number).to_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Where the valid prefix of a segment body ends.
#[derive(Debug, PartialEq, Eq)]
enum TailScan {
    /// Every byte belongs to an intact frame
    Clean,
    /// Bytes from `valid_end` on are a torn tail
    Torn { valid_end: usize },
}

/// Scan a segment body (bytes after the header).
fn scan_tail(body: &[u8]) -> std::result::Result<TailScan, usize> {
    let mut offset = 0;
    while offset < body.len() {
        let rest = &body[offset..];
        match decode_frame(rest) {
            FrameDecode::Complete { consumed, .. } => offset += consumed,
            FrameDecode::Incomplete => return Ok(TailScan::Torn { valid_end: offset }),
            FrameDecode::Empty if rest.iter().all(|b| *b == 0) => {
                return Ok(TailScan::Torn { valid_end: offset })
            }
            FrameDecode::ChecksumMismatch { consumed, .. } if consumed == rest.len() => {
                return Ok(TailScan::Torn { valid_end: offset })
            }
            _ => return Err(offset),
        }
    }
    Ok(TailScan::Clean)
}

/// Validate the active segment and cut off a torn tail.
///
/// Returns the segment size after recovery and the number of bytes dropped.
fn recover_tail(dir: &Path, number: u32) -> Result<(u64, u64)> {
    let path = segment_path(dir, number);
    let bytes = std::fs::read(&path)?;

    if bytes.len() < JOURNAL_HEADER_SIZE {
        // Creation was interrupted before the header was complete.
        warn!(target: "tracker::journal", path = %path.display(), "Rewriting incomplete journal segment header");
        let mut file = OpenOptions::new().write(true).truncate(true).open(&path)?;
        file.write_all(&JournalHeader::new(number).to_bytes())?;
        file.sync_all()?;
        return Ok((JOURNAL_HEADER_SIZE as u64, bytes.len() as u64));
    }

    JournalHeader::from_bytes(&bytes, number)?;
    match scan_tail(&bytes[JOURNAL_HEADER_SIZE..]) {
        Ok(TailScan::Clean) => Ok((bytes.len() as u64, 0)),
        Ok(TailScan::Torn { valid_end }) => {
            let valid_end = (JOURNAL_HEADER_SIZE + valid_end) as u64;
            let dropped = bytes.len() as u64 - valid_end;
            warn!(
                target: "tracker::journal",
                path = %path.display(),
                valid_end,
                dropped,
                "Truncating torn journal tail"
            );
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(valid_end)?;
            file.sync_all()?;
            Ok((valid_end, dropped))
        }
        Err(offset) => Err(Error::corruption(format!(
            "journal segment '{}' damaged at offset {}",
            path.display(),
            JOURNAL_HEADER_SIZE + offset
        ))),
    }
}
