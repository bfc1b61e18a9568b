//! L1NE deterministic simulator.
//!
//! Replays write-ahead log events against an in-memory state model and
//! service registry, and synthesizes event streams for chaos, load,
//! transaction and lifecycle scenarios from a seeded PRNG. Two runs with
//! the same seed and configuration produce identical results.
//!
//! # Module Structure
//!
//! - [`event`] - In-memory event decoded from a WAL record
//! - [`registry`] - Fixed-capacity service table
//! - [`state`] - Monotonic counter model
//! - [`simulator`] - Transactional replay engine
//! - [`prng`] - PCG32 deterministic generator
//! - [`fault`] - Probability-driven fault injection
//! - [`scenario`] - Scenario generation and the run result
//! - [`verifier`] - Bounded invariant-violation recorder
//! - [`metrics`] - Counters and a bounded latency reservoir

pub mod event;
pub mod fault;
pub mod metrics;
pub mod prng;
pub mod registry;
pub mod scenario;
pub mod simulator;
pub mod state;
pub mod verifier;

pub use event::Event;
pub use fault::{FaultError, FaultInjector, FaultKind, ScheduledFault};
pub use metrics::{LatencyStats, SimMetrics};
pub use prng::Pcg32;
pub use registry::{RegistryError, ServiceRecord, ServiceRegistry, ServiceState};
pub use scenario::{ScenarioError, ScenarioResult, ScenarioRunner};
pub use simulator::{SimError, Simulator};
pub use state::SimulatorState;
pub use verifier::{Verifier, Violation, ViolationKind};
