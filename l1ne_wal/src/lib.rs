//! L1NE write-ahead log.
//!
//! Durable, CRC-protected event stream: a flat sequence of fixed 256-byte
//! little-endian records appended by exactly one [`WalWriter`] and consumed
//! sequentially by [`WalReader`]s. The record layout is part of the on-disk
//! contract and lives in [`entry`].
//!
//! # Design
//!
//! - Exclusive writer: a single owner appends; the file is never truncated
//!   or rewound. Every append is followed by a durability barrier (fsync).
//! - Verification on both ends: the writer re-checks a record's CRC before
//!   it reaches the disk, the reader rejects records whose CRC does not
//!   match.
//! - Bounded segments: after [`l1ne_common::consts::WAL_SEGMENT_ENTRIES_MAX`]
//!   entries the active file is rotated aside and a fresh segment begins.

pub mod entry;
pub mod error;
pub mod reader;
pub mod writer;

pub use entry::{EntryType, Payload, WalEntry};
pub use error::{WalError, WalResult};
pub use reader::WalReader;
pub use writer::WalWriter;
