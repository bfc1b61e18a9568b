//! WAL record layout and typed payloads.
//!
//! On-disk layout of one record (little-endian scalars, 256 bytes total):
//!
//! | Offset | Size | Field |
//! |--------|------|----------------------------------------|
//! | 0      | 4    | `crc32` — CRC-32/IEEE of bytes 4..256  |
//! | 4      | 8    | `timestamp_us`                         |
//! | 12     | 1    | `entry_type` (1..=9)                   |
//! | 13     | 3    | reserved (zero)                        |
//! | 16     | 128  | typed payload                          |
//! | 144    | 112  | reserved tail (zero)                   |
//!
//! Records are encoded and decoded explicitly rather than reinterpreted in
//! place, so the in-memory representation carries no layout constraints.

use l1ne_common::consts::{WAL_ENTRY_SIZE, WAL_PAYLOAD_SIZE};
use static_assertions::const_assert;

use crate::error::{WalError, WalResult};

/// Byte offset of the checksum field.
pub const CRC_OFFSET: usize = 0;
/// Byte offset of the timestamp field.
pub const TIMESTAMP_OFFSET: usize = 4;
/// Byte offset of the discriminant.
pub const ENTRY_TYPE_OFFSET: usize = 12;
/// Byte offset of the typed payload.
pub const PAYLOAD_OFFSET: usize = 16;

const_assert!(PAYLOAD_OFFSET + WAL_PAYLOAD_SIZE <= WAL_ENTRY_SIZE);
const_assert!(WAL_ENTRY_SIZE % 8 == 0);

/// Record discriminant. The numeric values are part of the file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryType {
    ServiceStart = 1,
    ServiceStop = 2,
    ProxyAccept = 3,
    ProxyClose = 4,
    ConfigReload = 5,
    Checkpoint = 6,
    TxBegin = 7,
    TxCommit = 8,
    TxAbort = 9,
}

impl EntryType {
    /// Decode a raw discriminant byte.
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::ServiceStart),
            2 => Some(Self::ServiceStop),
            3 => Some(Self::ProxyAccept),
            4 => Some(Self::ProxyClose),
            5 => Some(Self::ConfigReload),
            6 => Some(Self::Checkpoint),
            7 => Some(Self::TxBegin),
            8 => Some(Self::TxCommit),
            9 => Some(Self::TxAbort),
            _ => None,
        }
    }
}

/// Typed view of a record's 128-byte payload region.
///
/// Scalar fields are packed little-endian from payload offset 0; the rest
/// of the region is zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    ServiceStart {
        service_id: u32,
        port: u16,
    },
    ServiceStop {
        service_id: u32,
        exit_code: i32,
    },
    ProxyAccept {
        connection_id: u64,
        service_id: u32,
        client_port: u16,
    },
    ProxyClose {
        connection_id: u64,
        bytes_sent: u64,
        bytes_received: u64,
    },
    ConfigReload,
    Checkpoint,
    TxBegin {
        tx_id: u64,
        event_count: u32,
    },
    TxCommit {
        tx_id: u64,
        event_count: u32,
    },
    TxAbort {
        tx_id: u64,
        reason_code: u32,
    },
}

impl Payload {
    /// Discriminant this payload is stored under.
    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::ServiceStart { .. } => EntryType::ServiceStart,
            Self::ServiceStop { .. } => EntryType::ServiceStop,
            Self::ProxyAccept { .. } => EntryType::ProxyAccept,
            Self::ProxyClose { .. } => EntryType::ProxyClose,
            Self::ConfigReload => EntryType::ConfigReload,
            Self::Checkpoint => EntryType::Checkpoint,
            Self::TxBegin { .. } => EntryType::TxBegin,
            Self::TxCommit { .. } => EntryType::TxCommit,
            Self::TxAbort { .. } => EntryType::TxAbort,
        }
    }

    /// Pack the payload into its 128-byte on-disk form.
    pub fn encode(&self) -> [u8; WAL_PAYLOAD_SIZE] {
        let mut bytes = [0u8; WAL_PAYLOAD_SIZE];
        match *self {
            Self::ServiceStart { service_id, port } => {
                bytes[0..4].copy_from_slice(&service_id.to_le_bytes());
                bytes[4..6].copy_from_slice(&port.to_le_bytes());
            }
            Self::ServiceStop {
                service_id,
                exit_code,
            } => {
                bytes[0..4].copy_from_slice(&service_id.to_le_bytes());
                bytes[4..8].copy_from_slice(&exit_code.to_le_bytes());
            }
            Self::ProxyAccept {
                connection_id,
                service_id,
                client_port,
            } => {
                bytes[0..8].copy_from_slice(&connection_id.to_le_bytes());
                bytes[8..12].copy_from_slice(&service_id.to_le_bytes());
                bytes[12..14].copy_from_slice(&client_port.to_le_bytes());
            }
            Self::ProxyClose {
                connection_id,
                bytes_sent,
                bytes_received,
            } => {
                bytes[0..8].copy_from_slice(&connection_id.to_le_bytes());
                bytes[8..16].copy_from_slice(&bytes_sent.to_le_bytes());
                bytes[16..24].copy_from_slice(&bytes_received.to_le_bytes());
            }
            Self::ConfigReload | Self::Checkpoint => {}
            Self::TxBegin { tx_id, event_count } | Self::TxCommit { tx_id, event_count } => {
                bytes[0..8].copy_from_slice(&tx_id.to_le_bytes());
                bytes[8..12].copy_from_slice(&event_count.to_le_bytes());
            }
            Self::TxAbort { tx_id, reason_code } => {
                bytes[0..8].copy_from_slice(&tx_id.to_le_bytes());
                bytes[8..12].copy_from_slice(&reason_code.to_le_bytes());
            }
        }
        bytes
    }

    /// Interpret a payload region under the given discriminant.
    ///
    /// Total for every defined `EntryType`: all fields are plain scalars
    /// read from fixed offsets.
    pub fn decode(entry_type: EntryType, bytes: &[u8; WAL_PAYLOAD_SIZE]) -> Self {
        match entry_type {
            EntryType::ServiceStart => Self::ServiceStart {
                service_id: read_u32(bytes, 0),
                port: read_u16(bytes, 4),
            },
            EntryType::ServiceStop => Self::ServiceStop {
                service_id: read_u32(bytes, 0),
                exit_code: read_u32(bytes, 4) as i32,
            },
            EntryType::ProxyAccept => Self::ProxyAccept {
                connection_id: read_u64(bytes, 0),
                service_id: read_u32(bytes, 8),
                client_port: read_u16(bytes, 12),
            },
            EntryType::ProxyClose => Self::ProxyClose {
                connection_id: read_u64(bytes, 0),
                bytes_sent: read_u64(bytes, 8),
                bytes_received: read_u64(bytes, 16),
            },
            EntryType::ConfigReload => Self::ConfigReload,
            EntryType::Checkpoint => Self::Checkpoint,
            EntryType::TxBegin => Self::TxBegin {
                tx_id: read_u64(bytes, 0),
                event_count: read_u32(bytes, 8),
            },
            EntryType::TxCommit => Self::TxCommit {
                tx_id: read_u64(bytes, 0),
                event_count: read_u32(bytes, 8),
            },
            EntryType::TxAbort => Self::TxAbort {
                tx_id: read_u64(bytes, 0),
                reason_code: read_u32(bytes, 8),
            },
        }
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

/// One write-ahead log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalEntry {
    /// CRC-32/IEEE of bytes 4..256 of the encoded record.
    pub crc32: u32,
    /// Monotonic microseconds at write time, strictly positive.
    pub timestamp_us: u64,
    /// Record discriminant.
    pub entry_type: EntryType,
    /// Raw payload region.
    pub payload: [u8; WAL_PAYLOAD_SIZE],
}

impl WalEntry {
    /// Build a record from a typed payload; the CRC is computed last.
    pub fn new(timestamp_us: u64, payload: &Payload) -> Self {
        assert!(timestamp_us > 0, "WAL timestamps are strictly positive");
        let mut entry = Self {
            crc32: 0,
            timestamp_us,
            entry_type: payload.entry_type(),
            payload: payload.encode(),
        };
        entry.crc32 = entry.compute_crc32();
        entry
    }

    pub fn service_start(timestamp_us: u64, service_id: u32, port: u16) -> Self {
        Self::new(timestamp_us, &Payload::ServiceStart { service_id, port })
    }

    pub fn service_stop(timestamp_us: u64, service_id: u32, exit_code: i32) -> Self {
        Self::new(
            timestamp_us,
            &Payload::ServiceStop {
                service_id,
                exit_code,
            },
        )
    }

    pub fn proxy_accept(
        timestamp_us: u64,
        connection_id: u64,
        service_id: u32,
        client_port: u16,
    ) -> Self {
        Self::new(
            timestamp_us,
            &Payload::ProxyAccept {
                connection_id,
                service_id,
                client_port,
            },
        )
    }

    pub fn proxy_close(
        timestamp_us: u64,
        connection_id: u64,
        bytes_sent: u64,
        bytes_received: u64,
    ) -> Self {
        Self::new(
            timestamp_us,
            &Payload::ProxyClose {
                connection_id,
                bytes_sent,
                bytes_received,
            },
        )
    }

    pub fn config_reload(timestamp_us: u64) -> Self {
        Self::new(timestamp_us, &Payload::ConfigReload)
    }

    pub fn checkpoint(timestamp_us: u64) -> Self {
        Self::new(timestamp_us, &Payload::Checkpoint)
    }

    pub fn tx_begin(timestamp_us: u64, tx_id: u64, event_count: u32) -> Self {
        Self::new(timestamp_us, &Payload::TxBegin { tx_id, event_count })
    }

    pub fn tx_commit(timestamp_us: u64, tx_id: u64, event_count: u32) -> Self {
        Self::new(timestamp_us, &Payload::TxCommit { tx_id, event_count })
    }

    pub fn tx_abort(timestamp_us: u64, tx_id: u64, reason_code: u32) -> Self {
        Self::new(timestamp_us, &Payload::TxAbort { tx_id, reason_code })
    }

    /// Encode the record into its 256-byte on-disk form.
    pub fn to_bytes(&self) -> [u8; WAL_ENTRY_SIZE] {
        let mut bytes = [0u8; WAL_ENTRY_SIZE];
        bytes[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&self.crc32.to_le_bytes());
        bytes[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]
            .copy_from_slice(&self.timestamp_us.to_le_bytes());
        bytes[ENTRY_TYPE_OFFSET] = self.entry_type as u8;
        bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + WAL_PAYLOAD_SIZE].copy_from_slice(&self.payload);
        bytes
    }

    /// Decode a 256-byte record.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::InvalidEntryType`] on an unknown discriminant.
    /// The CRC is *not* checked here; callers decide when to verify.
    pub fn from_bytes(bytes: &[u8; WAL_ENTRY_SIZE]) -> WalResult<Self> {
        let raw = bytes[ENTRY_TYPE_OFFSET];
        let entry_type = EntryType::from_u8(raw).ok_or(WalError::InvalidEntryType { raw })?;
        let mut payload = [0u8; WAL_PAYLOAD_SIZE];
        payload.copy_from_slice(&bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + WAL_PAYLOAD_SIZE]);
        Ok(Self {
            crc32: read_u32(bytes, CRC_OFFSET),
            timestamp_us: read_u64(bytes, TIMESTAMP_OFFSET),
            entry_type,
            payload,
        })
    }

    /// CRC-32/IEEE over every encoded byte except the checksum itself.
    pub fn compute_crc32(&self) -> u32 {
        let bytes = self.to_bytes();
        crc32fast::hash(&bytes[TIMESTAMP_OFFSET..])
    }

    pub fn verify_crc32(&self) -> bool {
        self.crc32 == self.compute_crc32()
    }

    /// Typed view of the payload region.
    pub fn payload(&self) -> Payload {
        Payload::decode(self.entry_type, &self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_verifies() {
        let entry = WalEntry::service_start(1_000, 1, 8080);
        assert!(entry.verify_crc32());
        assert_eq!(entry.entry_type, EntryType::ServiceStart);
        assert_eq!(
            entry.payload(),
            Payload::ServiceStart {
                service_id: 1,
                port: 8080
            }
        );
    }

    #[test]
    fn byte_roundtrip_preserves_fields() {
        let entry = WalEntry::proxy_close(123_456, 42, 1024, 512);
        let bytes = entry.to_bytes();
        let decoded = WalEntry::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, entry);
        assert!(decoded.verify_crc32());
    }

    #[test]
    fn layout_matches_the_contract() {
        let entry = WalEntry::service_start(0x0102_0304_0506_0708, 0xAABB_CCDD, 0x1F90);
        let bytes = entry.to_bytes();
        // Timestamp little-endian at byte 4.
        assert_eq!(bytes[4], 0x08);
        assert_eq!(bytes[11], 0x01);
        // Discriminant at byte 12, reserved bytes zero.
        assert_eq!(bytes[12], 1);
        assert_eq!(&bytes[13..16], &[0, 0, 0]);
        // service_id little-endian at payload offset 0 (byte 16).
        assert_eq!(bytes[16], 0xDD);
        assert_eq!(bytes[19], 0xAA);
        // port at payload offset 4.
        assert_eq!(bytes[20], 0x90);
        assert_eq!(bytes[21], 0x1F);
        // Reserved tail is zero.
        assert!(bytes[PAYLOAD_OFFSET + WAL_PAYLOAD_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn corrupted_byte_fails_verification() {
        let entry = WalEntry::checkpoint(5_000);
        let mut bytes = entry.to_bytes();
        bytes[200] ^= 0xFF;
        let decoded = WalEntry::from_bytes(&bytes).unwrap();
        assert!(!decoded.verify_crc32());
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        let entry = WalEntry::checkpoint(5_000);
        let mut bytes = entry.to_bytes();
        bytes[ENTRY_TYPE_OFFSET] = 10;
        assert!(matches!(
            WalEntry::from_bytes(&bytes),
            Err(WalError::InvalidEntryType { raw: 10 })
        ));
        bytes[ENTRY_TYPE_OFFSET] = 0;
        assert!(matches!(
            WalEntry::from_bytes(&bytes),
            Err(WalError::InvalidEntryType { raw: 0 })
        ));
    }

    #[test]
    fn negative_exit_code_roundtrips() {
        let entry = WalEntry::service_stop(9_000, 3, -1);
        let decoded = WalEntry::from_bytes(&entry.to_bytes()).unwrap();
        assert_eq!(
            decoded.payload(),
            Payload::ServiceStop {
                service_id: 3,
                exit_code: -1
            }
        );
    }

    #[test]
    fn transaction_frames_carry_their_fields() {
        let begin = WalEntry::tx_begin(1_000, 7, 3);
        let commit = WalEntry::tx_commit(2_000, 7, 3);
        let abort = WalEntry::tx_abort(3_000, 7, 1);
        assert_eq!(
            begin.payload(),
            Payload::TxBegin {
                tx_id: 7,
                event_count: 3
            }
        );
        assert_eq!(
            commit.payload(),
            Payload::TxCommit {
                tx_id: 7,
                event_count: 3
            }
        );
        assert_eq!(
            abort.payload(),
            Payload::TxAbort {
                tx_id: 7,
                reason_code: 1
            }
        );
    }

    #[test]
    #[should_panic(expected = "strictly positive")]
    fn zero_timestamp_panics() {
        WalEntry::checkpoint(0);
    }
}
