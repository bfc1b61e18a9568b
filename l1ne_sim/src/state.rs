//! Monotonic counter model driven by replayed events.

use l1ne_wal::Payload;
use tracing::trace;

use crate::event::Event;
use crate::registry::{RegistryError, ServiceRegistry};

/// Aggregate counters over every applied event.
///
/// All counters are monotonically non-decreasing; stops never exceed
/// starts and closes never exceed opens, so the derived active counts are
/// always representable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorState {
    services_started: u64,
    services_stopped: u64,
    connections_opened: u64,
    connections_closed: u64,
    bytes_sent_total: u64,
    bytes_received_total: u64,
}

impl SimulatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one non-transactional event.
    ///
    /// Total over every payload except transaction frames — feeding a
    /// `TxBegin`/`TxCommit`/`TxAbort` here is a caller bug. Registry
    /// updates are best-effort: the registry only tracks explicitly
    /// registered services, so `ServiceNotFound` is ignored.
    pub fn apply_event(&mut self, event: &Event, registry: &mut ServiceRegistry) {
        trace!(timestamp_us = event.timestamp_us, payload = ?event.payload, "apply");
        match event.payload {
            Payload::ServiceStart { service_id, .. } => {
                self.services_started += 1;
                if let Err(RegistryError::ServiceNotFound { .. }) =
                    registry.start_service(service_id, event.timestamp_us)
                {
                    // Unregistered id: counters advance, registry untouched.
                }
            }
            Payload::ServiceStop { service_id, .. } => {
                self.services_stopped += 1;
                if let Err(RegistryError::ServiceNotFound { .. }) =
                    registry.stop_service(service_id, event.timestamp_us)
                {}
            }
            Payload::ProxyAccept { .. } => {
                self.connections_opened += 1;
            }
            Payload::ProxyClose {
                bytes_sent,
                bytes_received,
                ..
            } => {
                self.connections_closed += 1;
                self.bytes_sent_total += bytes_sent;
                self.bytes_received_total += bytes_received;
            }
            Payload::ConfigReload | Payload::Checkpoint => {}
            Payload::TxBegin { .. } | Payload::TxCommit { .. } | Payload::TxAbort { .. } => {
                unreachable!("transaction frames are dispatched by the simulator, not applied")
            }
        }
    }

    pub fn services_started(&self) -> u64 {
        self.services_started
    }

    pub fn services_stopped(&self) -> u64 {
        self.services_stopped
    }

    pub fn connections_opened(&self) -> u64 {
        self.connections_opened
    }

    pub fn connections_closed(&self) -> u64 {
        self.connections_closed
    }

    pub fn bytes_sent_total(&self) -> u64 {
        self.bytes_sent_total
    }

    pub fn bytes_received_total(&self) -> u64 {
        self.bytes_received_total
    }

    /// Services currently running: starts minus stops.
    pub fn active_services(&self) -> u64 {
        self.services_started - self.services_stopped
    }

    /// Connections currently open: opens minus closes.
    pub fn active_connections(&self) -> u64 {
        self.connections_opened - self.connections_closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(payload: Payload) -> Event {
        Event::new(1_000, payload)
    }

    #[test]
    fn counters_follow_the_event_stream() {
        let mut state = SimulatorState::new();
        let mut registry = ServiceRegistry::new();
        registry.register(1, 8080).unwrap();

        state.apply_event(
            &event(Payload::ServiceStart {
                service_id: 1,
                port: 8080,
            }),
            &mut registry,
        );
        state.apply_event(
            &event(Payload::ProxyAccept {
                connection_id: 1,
                service_id: 1,
                client_port: 50_000,
            }),
            &mut registry,
        );
        state.apply_event(
            &event(Payload::ProxyClose {
                connection_id: 1,
                bytes_sent: 1024,
                bytes_received: 512,
            }),
            &mut registry,
        );

        assert_eq!(state.services_started(), 1);
        assert_eq!(state.active_services(), 1);
        assert_eq!(state.connections_opened(), 1);
        assert_eq!(state.connections_closed(), 1);
        assert_eq!(state.active_connections(), 0);
        assert_eq!(state.bytes_sent_total(), 1024);
        assert_eq!(state.bytes_received_total(), 512);
        assert!(registry.is_running(1));
    }

    #[test]
    fn unknown_service_advances_counters_only() {
        let mut state = SimulatorState::new();
        let mut registry = ServiceRegistry::new();

        state.apply_event(
            &event(Payload::ServiceStart {
                service_id: 99,
                port: 9999,
            }),
            &mut registry,
        );
        assert_eq!(state.services_started(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn bookkeeping_events_have_no_counter_effect() {
        let mut state = SimulatorState::new();
        let mut registry = ServiceRegistry::new();
        state.apply_event(&event(Payload::ConfigReload), &mut registry);
        state.apply_event(&event(Payload::Checkpoint), &mut registry);
        assert_eq!(state, SimulatorState::default());
    }

    #[test]
    #[should_panic(expected = "transaction frames")]
    fn transaction_frame_is_a_caller_bug() {
        let mut state = SimulatorState::new();
        let mut registry = ServiceRegistry::new();
        state.apply_event(
            &event(Payload::TxBegin {
                tx_id: 1,
                event_count: 1,
            }),
            &mut registry,
        );
    }
}
