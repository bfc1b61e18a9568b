//! Single writer implementation with exclusive ownership.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use l1ne_common::consts::{WAL_ENTRY_SIZE, WAL_SEGMENT_ENTRIES_MAX};
use tracing::{debug, info};

use crate::entry::WalEntry;
use crate::error::{WalError, WalResult};

/// Exclusive, append-only log writer.
///
/// Owns its file handle; concurrent appenders are not supported. Every
/// append writes exactly one 256-byte record and fsyncs before returning,
/// so a record acknowledged to the caller is durable. The file is never
/// truncated or rewound.
pub struct WalWriter {
    file: File,
    path: PathBuf,
    entries_written: u64,
    entries_in_segment: u64,
    segments_rotated: u32,
}

impl WalWriter {
    /// Open (or create) the log at `path` for appending.
    ///
    /// Reopening an existing log resumes the segment fill count from the
    /// file length so rotation keeps its bound across restarts.
    pub fn create(path: &Path) -> WalResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let entries_in_segment = file.metadata()?.len() / WAL_ENTRY_SIZE as u64;
        debug!(path = %path.display(), resumed_entries = entries_in_segment, "WAL writer ready");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            entries_written: 0,
            entries_in_segment,
            segments_rotated: 0,
        })
    }

    /// Append one record and make it durable.
    ///
    /// The record's CRC is re-verified before it reaches the disk; a
    /// corrupted in-memory record is rejected with [`WalError::BadCrc`].
    /// On any failure `entries_written` is unchanged.
    pub fn write_entry(&mut self, entry: &WalEntry) -> WalResult<()> {
        let computed = entry.compute_crc32();
        if entry.crc32 != computed {
            return Err(WalError::BadCrc {
                stored: entry.crc32,
                computed,
            });
        }

        self.file.write_all(&entry.to_bytes())?;
        self.file.sync_all()?;

        self.entries_written += 1;
        self.entries_in_segment += 1;
        if self.entries_in_segment >= WAL_SEGMENT_ENTRIES_MAX {
            self.rotate()?;
        }
        Ok(())
    }

    /// Rotate the filled segment aside and start a fresh one.
    ///
    /// The active file is renamed to `<path>.<segment_index>`; record order
    /// across segments follows the index.
    fn rotate(&mut self) -> WalResult<()> {
        let rotated = rotated_segment_path(&self.path, self.segments_rotated);
        std::fs::rename(&self.path, &rotated)?;
        self.file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&self.path)?;
        self.segments_rotated += 1;
        self.entries_in_segment = 0;
        info!(
            segment = self.segments_rotated,
            rotated_to = %rotated.display(),
            "rotated WAL segment"
        );
        Ok(())
    }

    /// Records appended by this writer instance.
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Segments rotated aside by this writer instance.
    pub fn segments_rotated(&self) -> u32 {
        self.segments_rotated
    }

    /// Path of the active segment.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Name a filled segment: `<path>.<index>`.
fn rotated_segment_path(path: &Path, index: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
