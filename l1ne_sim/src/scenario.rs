//! Scenario generation and execution.
//!
//! A `ScenarioRunner` owns everything one deterministic run needs: the
//! seeded PRNG, the fault injector, the simulator, a verifier and a
//! metrics collector. Generation works purely in simulated time from a
//! fixed base, so two runs of the same configuration are byte-identical.

use l1ne_common::bounded::BoundedArray;
use l1ne_common::config::{ScenarioConfig, ScenarioType, ServiceSpec};
use l1ne_common::consts::{FAULTS_PENDING_MAX, MAX_SERVICE_INSTANCES, SIM_EVENTS_MAX};
use l1ne_wal::Payload;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::event::Event;
use crate::fault::{FaultError, FaultInjector, FaultKind, ScheduledFault};
use crate::metrics::SimMetrics;
use crate::prng::Pcg32;
use crate::registry::RegistryError;
use crate::simulator::{SimError, Simulator};
use crate::verifier::Verifier;

/// Simulated base time every scenario starts from [µs].
pub const SCENARIO_BASE_TIME_US: u64 = 1_000_000;

/// Spacing between a connection's accept and close in a load test [µs].
const LOAD_CONNECTION_HOLD_US: u64 = 100_000;
/// Spacing between accepted connections in a load test [µs].
const LOAD_CONNECTION_GAP_US: u64 = 10_000;
/// Fault-injection cadence in a chaos test [µs].
const CHAOS_TICK_US: u64 = 100_000;
/// Delay before a crashed service restarts [µs].
const CHAOS_RESTART_AFTER_US: u64 = 1_000_000;
/// Spacing between events inside a transaction [µs].
const TX_EVENT_GAP_US: u64 = 500;
/// Spacing between transactions [µs].
const TX_GAP_US: u64 = 10_000;
/// Per-service stagger in a lifecycle test [µs].
const LIFECYCLE_STAGGER_US: u64 = 1_000_000;
/// Service uptime in a lifecycle test [µs].
const LIFECYCLE_UPTIME_US: u64 = 5_000_000;

/// Error type for scenario construction and generation.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Scenario seeds are strictly positive.
    #[error("scenario seed must be non-zero")]
    ZeroSeed,

    /// Simulator rejected an event or a replay step.
    #[error(transparent)]
    Sim(#[from] SimError),

    /// Fault scheduling overflowed its table.
    #[error(transparent)]
    Fault(#[from] FaultError),

    /// Service registration failed during setup.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Structured outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioResult {
    pub success: bool,
    pub events_processed: u64,
    pub faults_injected: u64,
    pub services_started: u64,
    pub services_stopped: u64,
    pub duration_us: u64,
    pub error_message: Option<String>,
}

/// One deterministic scenario run.
pub struct ScenarioRunner {
    config: ScenarioConfig,
    rng: Pcg32,
    injector: FaultInjector,
    simulator: Simulator,
    verifier: Verifier,
    metrics: SimMetrics,
    events_generated: u64,
}

impl ScenarioRunner {
    /// Construction requires a non-zero seed; everything else about the
    /// config was validated at load time.
    pub fn new(config: ScenarioConfig) -> Result<Self, ScenarioError> {
        if config.seed == 0 {
            return Err(ScenarioError::ZeroSeed);
        }
        Ok(Self {
            rng: Pcg32::new(config.seed),
            injector: FaultInjector::new(config.fault_config),
            simulator: Simulator::new(),
            verifier: Verifier::new(),
            metrics: SimMetrics::new(),
            events_generated: 0,
            config,
        })
    }

    /// Generate, replay and verify; always returns a structured result.
    pub fn run(&mut self) -> ScenarioResult {
        info!(
            name = %self.config.name,
            scenario_type = ?self.config.scenario_type,
            seed = self.config.seed,
            "running scenario"
        );
        let outcome = self.run_inner();

        self.verifier.check_service_count(&self.simulator);
        self.verifier.check_connection_count(&self.simulator);
        self.verifier.check_transaction_state(&self.simulator);

        let state = self.simulator.state();
        let (success, error_message) = match outcome {
            Ok(()) if self.verifier.is_clean() => (true, None),
            Ok(()) => (
                false,
                Some(format!(
                    "{} invariant violations recorded",
                    self.verifier.violations().len()
                )),
            ),
            Err(e) => (false, Some(e.to_string())),
        };
        ScenarioResult {
            success,
            events_processed: self.simulator.current_event() as u64,
            faults_injected: self.injector.faults_injected_total(),
            services_started: state.services_started(),
            services_stopped: state.services_stopped(),
            duration_us: self.config.duration_us,
            error_message,
        }
    }

    fn run_inner(&mut self) -> Result<(), ScenarioError> {
        for spec in self.config.services.as_slice() {
            self.simulator.registry_mut().register(spec.service_id, spec.port)?;
        }

        // Startup events first, ordered by their configured delay; the
        // scenario body begins once the last service is up.
        let mut starts: BoundedArray<Event, MAX_SERVICE_INSTANCES> = BoundedArray::new();
        let mut body_start_us = SCENARIO_BASE_TIME_US;
        for spec in self.config.services.as_slice() {
            let at_us = SCENARIO_BASE_TIME_US + spec.start_delay_us;
            body_start_us = body_start_us.max(at_us);
            starts
                .push(Event::new(
                    at_us,
                    Payload::ServiceStart {
                        service_id: spec.service_id,
                        port: spec.port,
                    },
                ))
                .map_err(|_| SimError::EventOverflow {
                    capacity: MAX_SERVICE_INSTANCES,
                })?;
        }
        starts.as_mut_slice().sort_by_key(|e| e.timestamp_us);
        for event in starts.as_slice() {
            self.emit(*event)?;
        }

        match self.config.scenario_type {
            ScenarioType::LoadTest => self.generate_load_test(body_start_us)?,
            ScenarioType::ChaosTest => self.generate_chaos_test(body_start_us)?,
            ScenarioType::TransactionStress => self.generate_transaction_stress(body_start_us)?,
            ScenarioType::LifecycleTest => self.generate_lifecycle_test(body_start_us)?,
            ScenarioType::Custom => {}
        }
        debug!(events = self.events_generated, "generation finished");

        while self.simulator.has_next() {
            let payload = self
                .simulator
                .peek_next()
                .map(|e| e.payload)
                .expect("has_next implies a peekable event");
            self.simulator.replay_next()?;
            self.metrics.record_event(&payload);
        }
        Ok(())
    }

    fn emit(&mut self, event: Event) -> Result<(), SimError> {
        self.simulator.push_event(event)?;
        self.events_generated += 1;
        Ok(())
    }

    /// Free space left in the simulator's event buffer.
    fn remaining_capacity(&self) -> usize {
        SIM_EVENTS_MAX - self.simulator.event_count()
    }

    /// Draw one configured service the way the scenario types share:
    /// an index from `[1, service_count]`.
    fn pick_service(&mut self) -> ServiceSpec {
        let count = self.config.services.len() as u64;
        let index = self.rng.next_range(1, count) as usize - 1;
        self.config.services[index]
    }

    /// Accept/close pairs against rotating services until the window (or
    /// the event budget) is spent.
    fn generate_load_test(&mut self, start_us: u64) -> Result<(), ScenarioError> {
        let end_us = start_us + self.config.duration_us;
        let mut t = start_us;
        let mut connection_id = 1u64;
        while t < end_us {
            if self.remaining_capacity() < 2 {
                debug!(t, "event budget exhausted; truncating load generation");
                break;
            }
            let service = self.pick_service();
            self.emit(Event::new(
                t,
                Payload::ProxyAccept {
                    connection_id,
                    service_id: service.service_id,
                    client_port: 50_000 + (connection_id % 10_000) as u16,
                },
            ))?;
            t += LOAD_CONNECTION_HOLD_US;
            self.emit(Event::new(
                t,
                Payload::ProxyClose {
                    connection_id,
                    bytes_sent: 1024,
                    bytes_received: 512,
                },
            ))?;
            t += LOAD_CONNECTION_GAP_US;
            connection_id += 1;
        }
        Ok(())
    }

    /// Every 100 ms consult the injector; a crash stops the drawn service
    /// and schedules its restart one second later.
    fn generate_chaos_test(&mut self, start_us: u64) -> Result<(), ScenarioError> {
        let end_us = start_us + self.config.duration_us;
        let mut due = [ScheduledFault::default(); FAULTS_PENDING_MAX];
        let mut t = start_us;
        while t < end_us {
            let n = self.injector.get_due_faults(t, &mut due);
            due[..n].sort_unstable_by_key(|f| f.at_us);
            for fault in &due[..n] {
                self.emit_restart(*fault)?;
            }
            if self.injector.should_inject_crash(&mut self.rng) {
                if self.remaining_capacity() < 2 {
                    debug!(t, "event budget exhausted; truncating chaos generation");
                    break;
                }
                let service = self.pick_service();
                self.emit(Event::new(
                    t,
                    Payload::ServiceStop {
                        service_id: service.service_id,
                        exit_code: -1,
                    },
                ))?;
                self.injector.schedule_fault(ScheduledFault {
                    kind: FaultKind::Crash,
                    service_id: service.service_id,
                    at_us: t + CHAOS_RESTART_AFTER_US,
                })?;
            }
            t += CHAOS_TICK_US;
        }

        // Restart anything still parked so every crash resolves.
        let n = self.injector.get_due_faults(u64::MAX, &mut due);
        due[..n].sort_unstable_by_key(|f| f.at_us);
        for fault in &due[..n] {
            self.emit_restart(*fault)?;
        }
        Ok(())
    }

    fn emit_restart(&mut self, fault: ScheduledFault) -> Result<(), ScenarioError> {
        let port = self
            .config
            .services
            .iter()
            .find(|s| s.service_id == fault.service_id)
            .map(|s| s.port)
            .expect("scheduled faults reference configured services");
        self.emit(Event::new(
            fault.at_us,
            Payload::ServiceStart {
                service_id: fault.service_id,
                port,
            },
        ))?;
        Ok(())
    }

    /// Begin/events/commit-or-abort blocks until the window closes.
    fn generate_transaction_stress(&mut self, start_us: u64) -> Result<(), ScenarioError> {
        let end_us = start_us + self.config.duration_us;
        let mut t = start_us;
        let mut tx_id = 1u64;
        while t < end_us {
            let event_count = self.rng.next_range(2, 10) as u32;
            if self.remaining_capacity() < event_count as usize + 2 {
                debug!(t, "event budget exhausted; truncating transaction generation");
                break;
            }
            self.emit(Event::new(
                t,
                Payload::TxBegin { tx_id, event_count },
            ))?;
            t += TX_EVENT_GAP_US;
            for _ in 0..event_count {
                let service = self.pick_service();
                self.emit(Event::new(
                    t,
                    Payload::ServiceStart {
                        service_id: service.service_id,
                        port: service.port,
                    },
                ))?;
                t += TX_EVENT_GAP_US;
            }
            if self.rng.next_bool(0.9) {
                self.emit(Event::new(
                    t,
                    Payload::TxCommit { tx_id, event_count },
                ))?;
            } else {
                self.emit(Event::new(
                    t,
                    Payload::TxAbort {
                        tx_id,
                        reason_code: 1,
                    },
                ))?;
            }
            t += TX_GAP_US;
            tx_id += 1;
        }
        Ok(())
    }

    /// Staggered start/stop pair per service.
    fn generate_lifecycle_test(&mut self, start_us: u64) -> Result<(), ScenarioError> {
        let mut staged: BoundedArray<Event, { 2 * MAX_SERVICE_INSTANCES }> = BoundedArray::new();
        for (i, spec) in self.config.services.iter().enumerate() {
            let up_at = start_us + i as u64 * LIFECYCLE_STAGGER_US;
            staged
                .push(Event::new(
                    up_at,
                    Payload::ServiceStart {
                        service_id: spec.service_id,
                        port: spec.port,
                    },
                ))
                .map_err(|_| SimError::EventOverflow {
                    capacity: 2 * MAX_SERVICE_INSTANCES,
                })?;
            staged
                .push(Event::new(
                    up_at + LIFECYCLE_UPTIME_US,
                    Payload::ServiceStop {
                        service_id: spec.service_id,
                        exit_code: 0,
                    },
                ))
                .map_err(|_| SimError::EventOverflow {
                    capacity: 2 * MAX_SERVICE_INSTANCES,
                })?;
        }
        // Stops of early services interleave with starts of late ones.
        staged.as_mut_slice().sort_by_key(|e| e.timestamp_us);
        for event in staged.as_slice() {
            self.emit(*event)?;
        }
        Ok(())
    }

    pub fn events_generated(&self) -> u64 {
        self.events_generated
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }
}
