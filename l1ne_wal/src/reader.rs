//! Sequential log consumer.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use l1ne_common::consts::WAL_ENTRY_SIZE;

use crate::entry::WalEntry;
use crate::error::{WalError, WalResult};

/// Sequential reader over one log segment.
///
/// Owns its file handle and shares no state with the writer. Records are
/// verified as they are read: a short record is `CorruptEntry`, a checksum
/// mismatch is `BadCrc`.
pub struct WalReader {
    file: File,
    entries_read: u64,
}

impl WalReader {
    /// Open an existing log segment.
    pub fn open(path: &Path) -> WalResult<Self> {
        if !path.exists() {
            return Err(WalError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            file: File::open(path)?,
            entries_read: 0,
        })
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` on clean end-of-file (zero bytes at a record
    /// boundary).
    ///
    /// # Errors
    ///
    /// - [`WalError::CorruptEntry`] when the stream ends mid-record
    /// - [`WalError::BadCrc`] when the stored checksum does not match
    /// - [`WalError::InvalidEntryType`] on an unknown discriminant
    pub fn read_entry(&mut self) -> WalResult<Option<WalEntry>> {
        let mut bytes = [0u8; WAL_ENTRY_SIZE];
        let mut filled = 0usize;
        while filled < WAL_ENTRY_SIZE {
            match self.file.read(&mut bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < WAL_ENTRY_SIZE {
            return Err(WalError::CorruptEntry {
                bytes_read: filled,
                expected: WAL_ENTRY_SIZE,
            });
        }

        let entry = WalEntry::from_bytes(&bytes)?;
        let computed = entry.compute_crc32();
        if entry.crc32 != computed {
            return Err(WalError::BadCrc {
                stored: entry.crc32,
                computed,
            });
        }
        self.entries_read += 1;
        Ok(Some(entry))
    }

    /// Records successfully read so far.
    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }
}
