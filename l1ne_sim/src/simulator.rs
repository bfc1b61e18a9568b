//! Transactional replay engine.
//!
//! The simulator owns a bounded event buffer, a replay cursor, the counter
//! state, the service registry and a simulated clock. Events are applied
//! in buffer order; the clock jumps to each event's timestamp, which also
//! enforces end-to-end timestamp monotonicity.
//!
//! Transactions (`TxBegin` … `TxCommit`/`TxAbort`) buffer their interior
//! events and apply them as one contiguous block at commit. Transactions
//! do not nest — a nested begin is a fatal contract violation, while
//! data-dependent problems (oversized declarations, buffer overflow, id
//! mismatches) come back as [`SimError`] values.

use l1ne_common::bounded::BoundedArray;
use l1ne_common::clock::{Clock, ClockMode};
use l1ne_common::consts::{SIM_EVENTS_MAX, TX_PENDING_MAX};
use l1ne_wal::{Payload, WalEntry, WalError, WalReader};
use thiserror::Error;
use tracing::debug;

use crate::event::Event;
use crate::registry::ServiceRegistry;
use crate::state::SimulatorState;

/// Error type for simulator operations.
#[derive(Debug, Error)]
pub enum SimError {
    /// Event buffer is at capacity.
    #[error("event buffer full ({capacity} events)")]
    EventOverflow { capacity: usize },

    /// `TxBegin` declares more events than the pending buffer holds.
    #[error("transaction {tx_id} declares {event_count} events (max {max})")]
    TransactionTooLarge {
        tx_id: u64,
        event_count: u32,
        max: usize,
    },

    /// More buffered events arrived than the transaction may hold.
    #[error("transaction {tx_id} overflowed the pending buffer ({max} events)", max = TX_PENDING_MAX)]
    TransactionBufferFull { tx_id: u64 },

    /// Commit or abort frame for a transaction that is not open.
    #[error("transaction frame for tx {found} but active transaction is {expected}")]
    TransactionIdMismatch { expected: u64, found: u64 },

    /// Strict mode: event names a service id the registry does not know.
    #[error("unknown service id {service_id}")]
    UnknownService { service_id: u32 },

    /// Error while loading events from a log.
    #[error(transparent)]
    Wal(#[from] WalError),
}

/// Deterministic replay engine over a bounded event buffer.
pub struct Simulator {
    events: Box<BoundedArray<Event, SIM_EVENTS_MAX>>,
    current_event: usize,
    state: SimulatorState,
    clock: Clock,
    registry: ServiceRegistry,
    in_transaction: bool,
    current_tx_id: u64,
    pending: BoundedArray<Event, TX_PENDING_MAX>,
    strict_services: bool,
}

impl Simulator {
    /// Simulator with a fresh simulated clock and lenient service lookup.
    pub fn new() -> Self {
        Self::with_clock(Clock::simulated())
    }

    /// Simulator driven by the given clock (must be simulated).
    pub fn with_clock(clock: Clock) -> Self {
        assert_eq!(
            clock.mode(),
            ClockMode::Simulated,
            "replay requires a simulated clock"
        );
        Self {
            events: Box::new(BoundedArray::new()),
            current_event: 0,
            state: SimulatorState::new(),
            clock,
            registry: ServiceRegistry::new(),
            in_transaction: false,
            current_tx_id: 0,
            pending: BoundedArray::new(),
            strict_services: false,
        }
    }

    /// Reject events naming unregistered service ids instead of ignoring
    /// them. Off by default: a lenient replay tolerates lazily registered
    /// services.
    pub fn with_strict_services(mut self, strict: bool) -> Self {
        self.strict_services = strict;
        self
    }

    /// Decode one WAL record into the event buffer.
    pub fn load_entry(&mut self, entry: &WalEntry) -> Result<(), SimError> {
        self.push_event(Event::from_entry(entry))
    }

    /// Append an in-memory event to the buffer.
    pub fn push_event(&mut self, event: Event) -> Result<(), SimError> {
        self.events.push(event).map_err(|_| SimError::EventOverflow {
            capacity: SIM_EVENTS_MAX,
        })
    }

    /// Drain a log into the event buffer; returns the number loaded.
    pub fn load_wal(&mut self, reader: &mut WalReader) -> Result<u64, SimError> {
        let mut loaded = 0u64;
        while let Some(entry) = reader.read_entry()? {
            self.load_entry(&entry)?;
            loaded += 1;
        }
        debug!(loaded, "events loaded from WAL");
        Ok(loaded)
    }

    pub fn has_next(&self) -> bool {
        self.current_event < self.events.len()
    }

    /// Event at the replay cursor, if any.
    pub fn peek_next(&self) -> Option<&Event> {
        self.events.get(self.current_event)
    }

    /// Replay the event at the cursor.
    ///
    /// Requires `has_next()`. On success the cursor advances; on a
    /// data-dependent error the cursor stays put and the caller decides
    /// whether to abandon the replay.
    pub fn replay_next(&mut self) -> Result<(), SimError> {
        assert!(self.has_next(), "replay past the end of the event buffer");
        let event = self.events[self.current_event];

        // Timestamp monotonicity across the whole replay rides on the
        // clock's own contract.
        self.clock.set_time(event.timestamp_us);

        match event.payload {
            Payload::TxBegin { tx_id, event_count } => {
                assert!(
                    !self.in_transaction,
                    "nested transaction begin: tx {tx_id} inside tx {}",
                    self.current_tx_id
                );
                if event_count as usize > TX_PENDING_MAX {
                    return Err(SimError::TransactionTooLarge {
                        tx_id,
                        event_count,
                        max: TX_PENDING_MAX,
                    });
                }
                self.in_transaction = true;
                self.current_tx_id = tx_id;
                self.pending.clear();
            }
            Payload::TxCommit { tx_id, .. } => {
                if !self.in_transaction || tx_id != self.current_tx_id {
                    return Err(SimError::TransactionIdMismatch {
                        expected: self.current_tx_id,
                        found: tx_id,
                    });
                }
                // Atomic: the buffered block applies in order with no
                // observable intermediate state between the events.
                for pending in self.pending.as_slice() {
                    self.state.apply_event(pending, &mut self.registry);
                }
                debug!(
                    tx_id,
                    applied = self.pending.len(),
                    "transaction committed"
                );
                self.in_transaction = false;
                self.current_tx_id = 0;
                self.pending.clear();
            }
            Payload::TxAbort { tx_id, reason_code } => {
                if !self.in_transaction || tx_id != self.current_tx_id {
                    return Err(SimError::TransactionIdMismatch {
                        expected: self.current_tx_id,
                        found: tx_id,
                    });
                }
                debug!(
                    tx_id,
                    reason_code,
                    discarded = self.pending.len(),
                    "transaction aborted"
                );
                self.in_transaction = false;
                self.current_tx_id = 0;
                self.pending.clear();
            }
            _ => {
                self.check_known_service(&event)?;
                if self.in_transaction {
                    self.pending.push(event).map_err(|_| {
                        SimError::TransactionBufferFull {
                            tx_id: self.current_tx_id,
                        }
                    })?;
                } else {
                    self.state.apply_event(&event, &mut self.registry);
                }
            }
        }

        self.current_event += 1;
        Ok(())
    }

    /// Replay everything left in the buffer; returns events processed.
    pub fn replay_all(&mut self) -> Result<u64, SimError> {
        let mut processed = 0u64;
        while self.has_next() {
            self.replay_next()?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Rewind for another deterministic run: cursor, state, registry,
    /// transaction bookkeeping and the clock are cleared; loaded events
    /// are preserved.
    pub fn reset(&mut self) {
        self.current_event = 0;
        self.state = SimulatorState::new();
        self.registry.clear();
        self.in_transaction = false;
        self.current_tx_id = 0;
        self.pending.clear();
        self.clock = Clock::simulated();
    }

    fn check_known_service(&self, event: &Event) -> Result<(), SimError> {
        if !self.strict_services {
            return Ok(());
        }
        let service_id = match event.payload {
            Payload::ServiceStart { service_id, .. } | Payload::ServiceStop { service_id, .. } => {
                service_id
            }
            _ => return Ok(()),
        };
        if self.registry.get(service_id).is_none() {
            return Err(SimError::UnknownService { service_id });
        }
        Ok(())
    }

    pub fn state(&self) -> &SimulatorState {
        &self.state
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Mutable registry access for pre-replay registration.
    pub fn registry_mut(&mut self) -> &mut ServiceRegistry {
        &mut self.registry
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn current_tx_id(&self) -> u64 {
        self.current_tx_id
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn current_event(&self) -> usize {
        self.current_event
    }

    /// Current simulated time.
    pub fn clock_time_us(&self) -> u64 {
        self.clock.simulated_time_us()
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(timestamp_us: u64, service_id: u32, port: u16) -> Event {
        Event::new(timestamp_us, Payload::ServiceStart { service_id, port })
    }

    #[test]
    fn immediate_events_apply_in_order() {
        let mut sim = Simulator::new();
        sim.push_event(start(1_000, 1, 8080)).unwrap();
        sim.push_event(Event::new(
            2_000,
            Payload::ServiceStop {
                service_id: 1,
                exit_code: 0,
            },
        ))
        .unwrap();

        assert_eq!(sim.replay_all().unwrap(), 2);
        assert_eq!(sim.state().services_started(), 1);
        assert_eq!(sim.state().services_stopped(), 1);
        assert_eq!(sim.clock_time_us(), 2_000);
    }

    #[test]
    fn buffer_capacity_is_enforced() {
        let mut sim = Simulator::new();
        for i in 0..SIM_EVENTS_MAX as u64 {
            sim.push_event(start(1 + i, 1, 8080)).unwrap();
        }
        assert!(matches!(
            sim.push_event(start(99_999, 1, 8080)),
            Err(SimError::EventOverflow { .. })
        ));
    }

    #[test]
    fn oversized_transaction_is_rejected_at_begin() {
        let mut sim = Simulator::new();
        sim.push_event(Event::new(
            1_000,
            Payload::TxBegin {
                tx_id: 1,
                event_count: 65,
            },
        ))
        .unwrap();
        assert!(matches!(
            sim.replay_next(),
            Err(SimError::TransactionTooLarge { tx_id: 1, event_count: 65, .. })
        ));
        assert!(!sim.in_transaction());
    }

    #[test]
    fn commit_with_wrong_id_is_rejected() {
        let mut sim = Simulator::new();
        sim.push_event(Event::new(
            1_000,
            Payload::TxBegin {
                tx_id: 1,
                event_count: 1,
            },
        ))
        .unwrap();
        sim.push_event(Event::new(
            2_000,
            Payload::TxCommit {
                tx_id: 2,
                event_count: 1,
            },
        ))
        .unwrap();

        sim.replay_next().unwrap();
        assert!(matches!(
            sim.replay_next(),
            Err(SimError::TransactionIdMismatch {
                expected: 1,
                found: 2
            })
        ));
        // Still inside tx 1; the bad frame did not advance the cursor.
        assert!(sim.in_transaction());
        assert_eq!(sim.current_event(), 1);
    }

    #[test]
    fn stray_commit_is_rejected() {
        let mut sim = Simulator::new();
        sim.push_event(Event::new(
            1_000,
            Payload::TxCommit {
                tx_id: 5,
                event_count: 0,
            },
        ))
        .unwrap();
        assert!(matches!(
            sim.replay_next(),
            Err(SimError::TransactionIdMismatch { found: 5, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "nested transaction")]
    fn nested_begin_is_fatal() {
        let mut sim = Simulator::new();
        sim.push_event(Event::new(
            1_000,
            Payload::TxBegin {
                tx_id: 1,
                event_count: 2,
            },
        ))
        .unwrap();
        sim.push_event(Event::new(
            2_000,
            Payload::TxBegin {
                tx_id: 2,
                event_count: 2,
            },
        ))
        .unwrap();
        sim.replay_next().unwrap();
        let _ = sim.replay_next();
    }

    #[test]
    fn pending_overflow_is_reported() {
        let mut sim = Simulator::new();
        sim.push_event(Event::new(
            1_000,
            Payload::TxBegin {
                tx_id: 1,
                event_count: 64,
            },
        ))
        .unwrap();
        for i in 0..65u64 {
            sim.push_event(start(2_000 + i, 1, 8080)).unwrap();
        }

        sim.replay_next().unwrap();
        for _ in 0..64 {
            sim.replay_next().unwrap();
        }
        assert!(matches!(
            sim.replay_next(),
            Err(SimError::TransactionBufferFull { tx_id: 1 })
        ));
    }

    #[test]
    fn strict_mode_rejects_unknown_ids() {
        let mut sim = Simulator::new().with_strict_services(true);
        sim.push_event(start(1_000, 42, 8080)).unwrap();
        assert!(matches!(
            sim.replay_next(),
            Err(SimError::UnknownService { service_id: 42 })
        ));
        assert_eq!(sim.state().services_started(), 0);
    }

    #[test]
    fn strict_mode_accepts_registered_ids() {
        let mut sim = Simulator::new().with_strict_services(true);
        sim.registry_mut().register(42, 8080).unwrap();
        sim.push_event(start(1_000, 42, 8080)).unwrap();
        sim.replay_next().unwrap();
        assert_eq!(sim.state().services_started(), 1);
        assert!(sim.registry().is_running(42));
    }

    #[test]
    fn reset_preserves_events_and_replays_identically() {
        let mut sim = Simulator::new();
        sim.push_event(start(1_000, 1, 8080)).unwrap();
        sim.push_event(Event::new(
            2_000,
            Payload::ProxyAccept {
                connection_id: 1,
                service_id: 1,
                client_port: 50_000,
            },
        ))
        .unwrap();

        sim.replay_all().unwrap();
        let first_state = *sim.state();
        let first_registry = sim.registry().clone();

        sim.reset();
        assert_eq!(sim.event_count(), 2);
        assert_eq!(sim.state().services_started(), 0);

        sim.replay_all().unwrap();
        assert_eq!(*sim.state(), first_state);
        assert_eq!(*sim.registry(), first_registry);
    }
}
