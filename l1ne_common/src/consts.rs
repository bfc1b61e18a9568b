//! System-wide constants for the L1NE workspace.
//!
//! Single source of truth for all numeric limits and default paths.
//! Imported by all crates — no duplication permitted.

/// Maximum number of deployed service instances.
pub const MAX_SERVICE_INSTANCES: usize = 64;

/// Hard cap on configurable concurrent proxy connections.
pub const PROXY_CONNECTIONS_CAP: u32 = 4096;

/// Hard cap on the configurable proxy buffer size [bytes].
pub const PROXY_BUFFER_SIZE_CAP: u32 = 64 * 1024;

/// Splice buffer size used by the proxy data path [bytes].
pub const PROXY_BUFFER_SIZE: usize = 4096;

/// Hard cap on cgroup usage monitors.
pub const CGROUP_MONITORS_CAP: u32 = 64;

/// Hard cap on the bounded read of service-manager command output [bytes].
pub const SYSTEMD_BUFFER_SIZE_CAP: u32 = 16 * 1024;

/// Lowest port a managed service may bind (non-privileged range).
pub const SERVICE_PORT_MIN: u16 = 1024;

/// Maximum service name length [bytes].
pub const SERVICE_NAME_MAX: usize = 64;

/// On-disk WAL record size [bytes]. Part of the file-format contract.
pub const WAL_ENTRY_SIZE: usize = 256;

/// Typed payload region inside a WAL record [bytes].
pub const WAL_PAYLOAD_SIZE: usize = 128;

/// Entries per WAL segment before the writer rotates to a fresh file
/// (4096 × 256 B = 1 MiB per segment).
pub const WAL_SEGMENT_ENTRIES_MAX: u64 = 4096;

/// Simulator event buffer capacity.
pub const SIM_EVENTS_MAX: usize = 1024;

/// Buffered events inside one open transaction.
pub const TX_PENDING_MAX: usize = 64;

/// Scheduled-fault table capacity in the fault injector.
pub const FAULTS_PENDING_MAX: usize = 64;

/// Recorded violations before the verifier starts dropping.
pub const VIOLATIONS_MAX: usize = 64;

/// Violation message length cap [bytes].
pub const VIOLATION_MESSAGE_MAX: usize = 128;

/// Latency reservoir capacity in the metrics collector.
pub const LATENCY_SAMPLES_MAX: usize = 1024;

/// Readiness window granted to a freshly deployed service [ms].
pub const READY_TIMEOUT_MS: u64 = 1000;

/// Poll interval while waiting for service readiness [ms].
pub const READY_POLL_INTERVAL_MS: u64 = 100;

/// Sleep between accept retries when the listener reports WouldBlock [ms].
pub const ACCEPT_RETRY_DELAY_MS: u64 = 10;

/// Connect timeout towards a backend instance [ms].
pub const BACKEND_CONNECT_TIMEOUT_MS: u64 = 1000;

/// Default proxy bind address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7070";

/// Default state directory (WAL lives here).
pub const DEFAULT_STATE_DIR: &str = "/var/lib/l1ne";

/// WAL file name inside the state directory.
pub const WAL_FILE_NAME: &str = "l1ne.wal";

/// Prefix applied to every managed service-manager unit.
pub const UNIT_NAME_PREFIX: &str = "l1ne-";

// The bitmap-backed tables and the record layout are compile-time
// contracts, not runtime configuration.
static_assertions::const_assert!(MAX_SERVICE_INSTANCES <= 64);
static_assertions::const_assert!(TX_PENDING_MAX <= 64);
static_assertions::const_assert!(FAULTS_PENDING_MAX <= 64);
static_assertions::const_assert_eq!(WAL_ENTRY_SIZE % 8, 0);
static_assertions::const_assert!(WAL_PAYLOAD_SIZE < WAL_ENTRY_SIZE);
