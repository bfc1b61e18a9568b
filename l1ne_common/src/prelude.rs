//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use l1ne_common::prelude::*;` and get
//! the most important types without listing individual paths.

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    Config, ConfigError, ConfigLoader, FaultConfig, ScenarioConfig, ScenarioType,
    ServiceDescriptor, ServiceSpec,
};

// ─── Limits ─────────────────────────────────────────────────────────
pub use crate::limits::{LimitError, RuntimeLimits};

// ─── Clock ──────────────────────────────────────────────────────────
pub use crate::clock::{Clock, ClockMode};

// ─── Bounded substrate ──────────────────────────────────────────────
pub use crate::bounded::{AllocPhase, BoundedArray, BoundedError, SlotPool, StaticAllocator};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{MAX_SERVICE_INSTANCES, WAL_ENTRY_SIZE, WAL_PAYLOAD_SIZE};
