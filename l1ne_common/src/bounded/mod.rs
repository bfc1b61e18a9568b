//! Bounded static-allocation substrate.
//!
//! Everything the orchestrator and simulator hold at runtime lives in one
//! of these containers: capacity is fixed at initialization and never grows
//! afterwards. Exhaustion is surfaced to the caller (`Overflow`, `None`)
//! rather than absorbed by queueing.

mod alloc;
mod array;
mod pool;

pub use alloc::{AllocPhase, StaticAllocator};
pub use array::{BoundedArray, BoundedError};
pub use pool::SlotPool;
