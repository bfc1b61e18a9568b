//! Bounded invariant-violation recorder.
//!
//! The checks are defense-in-depth probes over a simulator's observable
//! state: the counter invariants they watch cannot break without a bug in
//! the state model itself. Recording is bounded at 64 violations; anything
//! past that is counted but dropped.

use l1ne_common::bounded::BoundedArray;
use l1ne_common::consts::{VIOLATION_MESSAGE_MAX, VIOLATIONS_MAX};
use tracing::warn;

use crate::simulator::Simulator;

/// Kinds of recorded violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// More stops than starts observed.
    ServiceCountMismatch,
    /// More closes than opens observed.
    ConnectionCountMismatch,
    /// A transaction is open with buffered events.
    TransactionIncomplete,
}

/// One recorded violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub timestamp_us: u64,
    pub message: heapless::String<VIOLATION_MESSAGE_MAX>,
}

/// Bounded violation log.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    violations: BoundedArray<Violation, VIOLATIONS_MAX>,
    dropped: u64,
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe the stop ≤ start invariant.
    pub fn check_service_count(&mut self, sim: &Simulator) {
        let state = sim.state();
        if state.services_stopped() > state.services_started() {
            self.record_violation(
                ViolationKind::ServiceCountMismatch,
                sim.clock_time_us(),
                format_args!(
                    "stopped {} exceeds started {}",
                    state.services_stopped(),
                    state.services_started()
                ),
            );
        }
    }

    /// Probe the close ≤ open invariant.
    pub fn check_connection_count(&mut self, sim: &Simulator) {
        let state = sim.state();
        if state.connections_closed() > state.connections_opened() {
            self.record_violation(
                ViolationKind::ConnectionCountMismatch,
                sim.clock_time_us(),
                format_args!(
                    "closed {} exceeds opened {}",
                    state.connections_closed(),
                    state.connections_opened()
                ),
            );
        }
    }

    /// Flag a transaction left open with buffered, unapplied events.
    pub fn check_transaction_state(&mut self, sim: &Simulator) {
        if sim.in_transaction() && sim.pending_count() > 0 {
            self.record_violation(
                ViolationKind::TransactionIncomplete,
                sim.clock_time_us(),
                format_args!(
                    "tx {} holds {} unapplied events",
                    sim.current_tx_id(),
                    sim.pending_count()
                ),
            );
        }
    }

    /// Record one violation; past capacity it is counted but dropped.
    pub fn record_violation(
        &mut self,
        kind: ViolationKind,
        timestamp_us: u64,
        message: core::fmt::Arguments<'_>,
    ) {
        let full = message.to_string();
        let mut bounded: heapless::String<VIOLATION_MESSAGE_MAX> = heapless::String::new();
        // Truncation on overflow is fine; the kind carries the meaning.
        for c in full.chars() {
            if bounded.push(c).is_err() {
                break;
            }
        }
        warn!(?kind, timestamp_us, message = %bounded, "invariant violation");
        if self
            .violations
            .push(Violation {
                kind,
                timestamp_us,
                message: bounded,
            })
            .is_err()
        {
            self.dropped += 1;
        }
    }

    pub fn violations(&self) -> &[Violation] {
        self.violations.as_slice()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.dropped == 0
    }

    /// Violations beyond the table's capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
