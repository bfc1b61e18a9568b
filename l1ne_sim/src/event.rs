//! In-memory simulation event.

use l1ne_wal::{Payload, WalEntry};

/// One event in the simulator's buffer: a timestamp plus the typed payload
/// it was persisted with. The WAL record is the canonical form; `Event` is
/// its decoded, fixed-size in-memory twin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp_us: u64,
    pub payload: Payload,
}

impl Event {
    pub fn new(timestamp_us: u64, payload: Payload) -> Self {
        Self {
            timestamp_us,
            payload,
        }
    }

    /// Decode a WAL record into its in-memory form.
    pub fn from_entry(entry: &WalEntry) -> Self {
        Self {
            timestamp_us: entry.timestamp_us,
            payload: entry.payload(),
        }
    }

    /// Re-encode into a WAL record (CRC computed fresh).
    pub fn to_entry(&self) -> WalEntry {
        WalEntry::new(self.timestamp_us, &self.payload)
    }

    /// True for `TxBegin`/`TxCommit`/`TxAbort` frames.
    pub fn is_transaction_frame(&self) -> bool {
        matches!(
            self.payload,
            Payload::TxBegin { .. } | Payload::TxCommit { .. } | Payload::TxAbort { .. }
        )
    }
}
