//! Probability-driven fault injection.
//!
//! Each `should_inject_*` call draws once from the caller's PRNG and bumps
//! the matching counter on a hit, so a scenario's fault total is itself
//! deterministic. Future faults can be parked in a bounded table and
//! collected once their timestamp comes due.

use l1ne_common::bounded::BoundedArray;
use l1ne_common::config::FaultConfig;
use l1ne_common::consts::FAULTS_PENDING_MAX;
use thiserror::Error;

use crate::prng::Pcg32;

/// Error type for fault scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FaultError {
    /// The scheduled-fault table is at capacity.
    #[error("too many pending faults ({max} scheduled)", max = FAULTS_PENDING_MAX)]
    TooManyPendingFaults,
}

/// Kinds of injectable faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultKind {
    #[default]
    Crash,
    Delay,
    ResourceExhaustion,
    ConnectionFailure,
}

/// A fault parked for a future timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduledFault {
    pub kind: FaultKind,
    pub service_id: u32,
    pub at_us: u64,
}

/// Draws faults against configured probabilities and tracks totals.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    config: FaultConfig,
    crashes_injected: u64,
    delays_injected: u64,
    resource_faults_injected: u64,
    connection_faults_injected: u64,
    pending: BoundedArray<ScheduledFault, FAULTS_PENDING_MAX>,
}

impl FaultInjector {
    /// The config is validated upstream (see `FaultConfig::validate`).
    pub fn new(config: FaultConfig) -> Self {
        Self {
            config,
            crashes_injected: 0,
            delays_injected: 0,
            resource_faults_injected: 0,
            connection_faults_injected: 0,
            pending: BoundedArray::new(),
        }
    }

    /// One crash draw; counts on a hit.
    pub fn should_inject_crash(&mut self, rng: &mut Pcg32) -> bool {
        let hit = rng.next_bool(self.config.crash_probability);
        if hit {
            self.crashes_injected += 1;
        }
        hit
    }

    /// One delay draw; on a hit returns a duration from the configured
    /// inclusive range.
    pub fn should_inject_delay(&mut self, rng: &mut Pcg32) -> Option<u64> {
        if !rng.next_bool(self.config.delay_probability) {
            return None;
        }
        self.delays_injected += 1;
        Some(rng.next_range(self.config.delay_min_us, self.config.delay_max_us))
    }

    /// One resource-exhaustion draw; counts on a hit.
    pub fn should_inject_resource_exhaustion(&mut self, rng: &mut Pcg32) -> bool {
        let hit = rng.next_bool(self.config.resource_exhaustion_probability);
        if hit {
            self.resource_faults_injected += 1;
        }
        hit
    }

    /// One connection-failure draw; counts on a hit.
    pub fn should_inject_connection_failure(&mut self, rng: &mut Pcg32) -> bool {
        let hit = rng.next_bool(self.config.connection_failure_probability);
        if hit {
            self.connection_faults_injected += 1;
        }
        hit
    }

    /// Park a fault for later collection.
    pub fn schedule_fault(&mut self, fault: ScheduledFault) -> Result<(), FaultError> {
        self.pending
            .push(fault)
            .map_err(|_| FaultError::TooManyPendingFaults)
    }

    /// Move every fault due at or before `timestamp_us` into `buffer`,
    /// returning how many were copied. Remaining faults stay parked.
    ///
    /// The buffer must hold the whole table (≥ 64 entries).
    pub fn get_due_faults(&mut self, timestamp_us: u64, buffer: &mut [ScheduledFault]) -> usize {
        assert!(
            buffer.len() >= FAULTS_PENDING_MAX,
            "due-fault buffer must hold the whole table"
        );
        let mut due = 0usize;
        for fault in &self.pending {
            if fault.at_us <= timestamp_us {
                buffer[due] = *fault;
                due += 1;
            }
        }
        self.pending.retain(|f| f.at_us > timestamp_us);
        due
    }

    /// Drop every parked fault.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn crashes_injected(&self) -> u64 {
        self.crashes_injected
    }

    pub fn delays_injected(&self) -> u64 {
        self.delays_injected
    }

    pub fn resource_faults_injected(&self) -> u64 {
        self.resource_faults_injected
    }

    pub fn connection_faults_injected(&self) -> u64 {
        self.connection_faults_injected
    }

    /// Sum over every fault kind.
    pub fn faults_injected_total(&self) -> u64 {
        self.crashes_injected
            + self.delays_injected
            + self.resource_faults_injected
            + self.connection_faults_injected
    }
}
