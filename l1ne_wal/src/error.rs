//! Error types for write-ahead log operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing or reading the log.
#[derive(Debug, Error)]
pub enum WalError {
    /// Log file not found.
    #[error("WAL file not found: {path}")]
    NotFound {
        /// Path that was probed.
        path: PathBuf,
    },

    /// Stored checksum does not match the record contents.
    #[error("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    BadCrc {
        /// Checksum found in the record header.
        stored: u32,
        /// Checksum computed over the record body.
        computed: u32,
    },

    /// A record was cut short mid-stream.
    #[error("truncated record: {bytes_read} of {expected} bytes")]
    CorruptEntry {
        /// Bytes actually read.
        bytes_read: usize,
        /// Record size expected.
        expected: usize,
    },

    /// Discriminant outside the defined range.
    #[error("unknown entry type {raw}")]
    InvalidEntryType {
        /// Raw discriminant byte.
        raw: u8,
    },

    /// IO error.
    #[error("IO error: {source}")]
    Io {
        /// Source IO error.
        #[from]
        source: std::io::Error,
    },
}

/// Result type for write-ahead log operations.
pub type WalResult<T> = Result<T, WalError>;
