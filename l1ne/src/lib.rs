//! L1NE orchestrator library.
//!
//! The online half of the system: deploy the configured services through a
//! [`process::ProcessSupervisor`] capability, keep their lifecycle states,
//! and proxy inbound TCP connections to the first healthy instance while
//! recording every lifecycle and proxy event into the write-ahead log.
//!
//! The binary in `main.rs` wires these modules to the CLI; everything here
//! is also driven directly by the integration tests.

pub mod cgroup;
pub mod commands;
pub mod process;
pub mod proxy;
pub mod supervisor;
