//! Fixed-capacity service table.
//!
//! Built before replay (or lazily by the scenario engine) and driven by
//! `ServiceStart`/`ServiceStop` events. Lookups are a linear scan bounded
//! at 64 records.

use l1ne_common::bounded::BoundedArray;
use l1ne_common::consts::MAX_SERVICE_INSTANCES;
use thiserror::Error;

/// Error type for registry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Duplicate registration of a service id.
    #[error("service {service_id} already registered")]
    ServiceAlreadyRegistered { service_id: u32 },

    /// The table holds its maximum number of records.
    #[error("service registry full ({max} services)", max = MAX_SERVICE_INSTANCES)]
    RegistryFull,

    /// Lookup of an id that was never registered.
    #[error("service {service_id} not found")]
    ServiceNotFound { service_id: u32 },
}

/// Lifecycle state of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    #[default]
    Stopped,
    Running,
}

/// One registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceRecord {
    pub service_id: u32,
    pub port: u16,
    pub state: ServiceState,
    pub started_at_us: u64,
    pub stopped_at_us: u64,
}

/// Table of up to 64 services, keyed by unique `service_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRegistry {
    records: BoundedArray<ServiceRecord, MAX_SERVICE_INSTANCES>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service in `Stopped` state.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ServiceAlreadyRegistered`] on a duplicate id
    /// - [`RegistryError::RegistryFull`] at capacity
    pub fn register(&mut self, service_id: u32, port: u16) -> Result<(), RegistryError> {
        assert!(service_id > 0, "service ids are strictly positive");
        if self.get(service_id).is_some() {
            return Err(RegistryError::ServiceAlreadyRegistered { service_id });
        }
        self.records
            .push(ServiceRecord {
                service_id,
                port,
                state: ServiceState::Stopped,
                started_at_us: 0,
                stopped_at_us: 0,
            })
            .map_err(|_| RegistryError::RegistryFull)
    }

    /// Mark a service running and stamp `started_at_us`.
    pub fn start_service(&mut self, service_id: u32, timestamp_us: u64) -> Result<(), RegistryError> {
        let record = self.get_mut(service_id)?;
        record.state = ServiceState::Running;
        record.started_at_us = timestamp_us;
        Ok(())
    }

    /// Mark a service stopped and stamp `stopped_at_us`.
    pub fn stop_service(&mut self, service_id: u32, timestamp_us: u64) -> Result<(), RegistryError> {
        let record = self.get_mut(service_id)?;
        record.state = ServiceState::Stopped;
        record.stopped_at_us = timestamp_us;
        Ok(())
    }

    /// False for unknown ids.
    pub fn is_running(&self, service_id: u32) -> bool {
        self.get(service_id)
            .map(|r| r.state == ServiceState::Running)
            .unwrap_or(false)
    }

    pub fn count_running(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.state == ServiceState::Running)
            .count()
    }

    pub fn get(&self, service_id: u32) -> Option<&ServiceRecord> {
        self.records.iter().find(|r| r.service_id == service_id)
    }

    fn get_mut(&mut self, service_id: u32) -> Result<&mut ServiceRecord, RegistryError> {
        self.records
            .as_mut_slice()
            .iter_mut()
            .find(|r| r.service_id == service_id)
            .ok_or(RegistryError::ServiceNotFound { service_id })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[ServiceRecord] {
        self.records.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_start_stop_cycle() {
        let mut registry = ServiceRegistry::new();
        registry.register(1, 8080).unwrap();
        assert!(!registry.is_running(1));

        registry.start_service(1, 1_000).unwrap();
        assert!(registry.is_running(1));
        assert_eq!(registry.count_running(), 1);
        assert_eq!(registry.get(1).unwrap().started_at_us, 1_000);

        registry.stop_service(1, 2_000).unwrap();
        assert!(!registry.is_running(1));
        assert_eq!(registry.get(1).unwrap().stopped_at_us, 2_000);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut registry = ServiceRegistry::new();
        registry.register(1, 8080).unwrap();
        assert_eq!(
            registry.register(1, 9090),
            Err(RegistryError::ServiceAlreadyRegistered { service_id: 1 })
        );
    }

    #[test]
    fn full_table_is_rejected() {
        let mut registry = ServiceRegistry::new();
        for id in 1..=64 {
            registry.register(id, 8000 + id as u16).unwrap();
        }
        assert_eq!(registry.register(65, 9000), Err(RegistryError::RegistryFull));
        assert_eq!(registry.len(), 64);
    }

    #[test]
    fn unknown_ids_are_not_running() {
        let registry = ServiceRegistry::new();
        assert!(!registry.is_running(99));
    }

    #[test]
    fn lifecycle_of_unknown_service_errors() {
        let mut registry = ServiceRegistry::new();
        assert_eq!(
            registry.start_service(7, 1_000),
            Err(RegistryError::ServiceNotFound { service_id: 7 })
        );
        assert_eq!(
            registry.stop_service(7, 1_000),
            Err(RegistryError::ServiceNotFound { service_id: 7 })
        );
    }
}
