//! # Service Orchestrator
//!
//! Deploys each configured service as a managed unit through the
//! [`ProcessSupervisor`](crate::process::ProcessSupervisor) capability,
//! tracks per-instance lifecycle state, and records every lifecycle event
//! into the write-ahead log before it is considered effective.
//!
//! Deployment is all-or-nothing: one failing service fails the whole
//! `start` command, leaving no partially deployed orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use l1ne_common::bounded::BoundedArray;
use l1ne_common::clock::Clock;
use l1ne_common::config::{Config, ServiceDescriptor};
use l1ne_common::consts::{
    MAX_SERVICE_INSTANCES, READY_POLL_INTERVAL_MS, READY_TIMEOUT_MS, UNIT_NAME_PREFIX,
};
use l1ne_common::limits::RuntimeLimits;
use l1ne_wal::{WalEntry, WalError, WalWriter};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cgroup::CgroupReader;
use crate::process::{ProcessError, ProcessSupervisor, UnitSpec};

/// Lifecycle state of one deployed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// One deployed service instance.
#[derive(Debug, Clone)]
pub struct ServiceInstance {
    /// Ordinal id (1-based deployment order), used in WAL records.
    pub service_id: u32,
    /// Service name from the config.
    pub name: String,
    /// Managed unit name (`l1ne-{service}-{port}`).
    pub unit_name: String,
    /// Backend port the proxy forwards to.
    pub port: u16,
    pub state: InstanceState,
}

/// Shared, read-mostly instance table.
pub type InstanceTable = Arc<RwLock<BoundedArray<ServiceInstance, MAX_SERVICE_INSTANCES>>>;

/// Error type for deployment and shutdown.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Executable missing or not resolvable to an absolute path.
    #[error("binary not found: {path}")]
    BinaryNotFound { path: PathBuf },

    /// Executable exists but is not executable by us.
    #[error("binary not accessible: {path}")]
    BinaryNotAccessible { path: PathBuf },

    /// More services than the configured instance budget.
    #[error("too many services: {count} (limit {limit})")]
    TooManyServices { count: usize, limit: u32 },

    /// Service-manager operation failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// WAL append failed.
    #[error(transparent)]
    Wal(#[from] WalError),
}

/// Deploys, supervises and tears down the configured fleet.
pub struct Orchestrator {
    limits: RuntimeLimits,
    supervisor: Box<dyn ProcessSupervisor>,
    instances: InstanceTable,
    monitors: BoundedArray<CgroupReader, MAX_SERVICE_INSTANCES>,
    wal: Arc<Mutex<WalWriter>>,
    clock: Arc<Mutex<Clock>>,
}

impl Orchestrator {
    pub fn new(
        limits: RuntimeLimits,
        supervisor: Box<dyn ProcessSupervisor>,
        wal: WalWriter,
    ) -> Self {
        Self {
            limits,
            supervisor,
            instances: Arc::new(RwLock::new(BoundedArray::new())),
            monitors: BoundedArray::new(),
            wal: Arc::new(Mutex::new(wal)),
            clock: Arc::new(Mutex::new(Clock::real())),
        }
    }

    /// Deploy every configured service in order.
    pub fn deploy_all(&mut self, config: &Config) -> Result<(), OrchestratorError> {
        if config.services.len() > self.limits.service_instances_count() as usize {
            return Err(OrchestratorError::TooManyServices {
                count: config.services.len(),
                limit: self.limits.service_instances_count(),
            });
        }
        for (index, service) in config.services.iter().enumerate() {
            self.deploy(index as u32 + 1, service)?;
        }
        info!(deployed = config.services.len(), "fleet deployed");
        Ok(())
    }

    fn deploy(
        &mut self,
        service_id: u32,
        service: &ServiceDescriptor,
    ) -> Result<(), OrchestratorError> {
        let unit_name = format!("{UNIT_NAME_PREFIX}{}-{}", service.name, service.port);
        let exec_path = resolve_executable(&service.exec_path)?;
        info!(unit = %unit_name, exec = %exec_path.display(), port = service.port, "deploying");

        self.instances
            .write()
            .push(ServiceInstance {
                service_id,
                name: service.name.clone(),
                unit_name: unit_name.clone(),
                port: service.port,
                state: InstanceState::Starting,
            })
            .expect("instance table sized to the service budget");

        let spec = UnitSpec {
            unit_name: unit_name.clone(),
            exec_path,
            port: service.port,
            uid: None,
            gid: None,
            memory_max_bytes: Some(service.memory_mb as u64 * 1024 * 1024),
            cpu_quota_percent: Some(service.cpu_percent),
        };
        self.supervisor.start_unit(&spec)?;
        self.wait_for_ready(&unit_name);

        self.set_state(service_id, InstanceState::Running);
        let timestamp_us = self.clock.lock().now_us();
        self.wal
            .lock()
            .write_entry(&WalEntry::service_start(timestamp_us, service_id, service.port))?;

        if self.monitors.len() < self.limits.cgroup_monitors_count() as usize {
            let _ = self.monitors.push(CgroupReader::new(&unit_name));
        }
        Ok(())
    }

    /// Poll unit status within the readiness window. A unit that never
    /// reports `active`/`activating` keeps its instance (the proxy will
    /// route to it), but the anomaly is logged.
    fn wait_for_ready(&self, unit_name: &str) {
        let deadline = std::time::Instant::now() + Duration::from_millis(READY_TIMEOUT_MS);
        let mut last_state = String::new();
        loop {
            match self.supervisor.query_status(unit_name) {
                Ok(status) if status.is_ready() => return,
                Ok(status) => last_state = status.active_state,
                Err(e) => last_state = format!("query failed: {e}"),
            }
            if std::time::Instant::now() >= deadline {
                warn!(unit = unit_name, state = %last_state, "not ready within the window; keeping instance");
                return;
            }
            std::thread::sleep(Duration::from_millis(READY_POLL_INTERVAL_MS));
        }
    }

    /// Stop every instance in reverse deployment order.
    pub fn shutdown_all(&mut self) -> Result<(), OrchestratorError> {
        let deployed: Vec<ServiceInstance> = self.instances.read().iter().cloned().collect();
        for instance in deployed.iter().rev() {
            self.set_state(instance.service_id, InstanceState::Stopping);
            self.supervisor.stop_unit(&instance.unit_name)?;
            self.set_state(instance.service_id, InstanceState::Stopped);

            let timestamp_us = self.clock.lock().now_us();
            self.wal
                .lock()
                .write_entry(&WalEntry::service_stop(timestamp_us, instance.service_id, 0))?;
            info!(unit = %instance.unit_name, "stopped");
        }
        Ok(())
    }

    fn set_state(&self, service_id: u32, state: InstanceState) {
        let mut table = self.instances.write();
        if let Some(instance) = table
            .as_mut_slice()
            .iter_mut()
            .find(|i| i.service_id == service_id)
        {
            instance.state = state;
        }
    }

    /// One supervision pass over the running instances: a unit the
    /// service manager reports as `failed` is demoted to `Failed` and the
    /// exit recorded in the WAL. Query trouble is logged and skipped —
    /// the next pass will see the unit again.
    pub fn health_check(&self) {
        let running: Vec<(u32, String)> = self
            .instances
            .read()
            .iter()
            .filter(|i| i.state == InstanceState::Running)
            .map(|i| (i.service_id, i.unit_name.clone()))
            .collect();
        for (service_id, unit_name) in running {
            match self.supervisor.query_status(&unit_name) {
                Ok(status) if status.active_state == "failed" => {
                    warn!(unit = %unit_name, sub = %status.sub_state, "unit failed");
                    if let Err(e) = self.mark_failed(service_id, 1) {
                        warn!(unit = %unit_name, error = %e, "recording failure");
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(unit = %unit_name, error = %e, "status query failed"),
            }
        }
    }

    /// Mark an instance failed after an observed non-zero exit.
    pub fn mark_failed(&self, service_id: u32, exit_code: i32) -> Result<(), OrchestratorError> {
        self.set_state(service_id, InstanceState::Failed);
        let timestamp_us = self.clock.lock().now_us();
        self.wal
            .lock()
            .write_entry(&WalEntry::service_stop(timestamp_us, service_id, exit_code))?;
        Ok(())
    }

    pub fn instances(&self) -> InstanceTable {
        Arc::clone(&self.instances)
    }

    pub fn wal(&self) -> Arc<Mutex<WalWriter>> {
        Arc::clone(&self.wal)
    }

    pub fn clock(&self) -> Arc<Mutex<Clock>> {
        Arc::clone(&self.clock)
    }

    pub fn limits(&self) -> &RuntimeLimits {
        &self.limits
    }

    pub fn monitors(&self) -> &[CgroupReader] {
        self.monitors.as_slice()
    }
}

/// Resolve a configured executable to an absolute, accessible file.
fn resolve_executable(path: &Path) -> Result<PathBuf, OrchestratorError> {
    let resolved = std::fs::canonicalize(path).map_err(|_| OrchestratorError::BinaryNotFound {
        path: path.to_path_buf(),
    })?;
    let metadata =
        std::fs::metadata(&resolved).map_err(|_| OrchestratorError::BinaryNotFound {
            path: resolved.clone(),
        })?;
    use std::os::unix::fs::PermissionsExt;
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return Err(OrchestratorError::BinaryNotAccessible { path: resolved });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::UnitStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Recording supervisor double: accepts every unit, reports it active
    /// until `failing` is raised.
    struct MockSupervisor {
        started: Arc<Mutex<Vec<UnitSpec>>>,
        stopped: Arc<Mutex<Vec<String>>>,
        queries: Arc<AtomicUsize>,
        failing: Arc<std::sync::atomic::AtomicBool>,
    }

    impl MockSupervisor {
        fn new() -> Self {
            Self {
                started: Arc::new(Mutex::new(Vec::new())),
                stopped: Arc::new(Mutex::new(Vec::new())),
                queries: Arc::new(AtomicUsize::new(0)),
                failing: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            }
        }
    }

    impl ProcessSupervisor for MockSupervisor {
        fn start_unit(&mut self, spec: &UnitSpec) -> Result<(), ProcessError> {
            self.started.lock().push(spec.clone());
            Ok(())
        }

        fn stop_unit(&mut self, unit_name: &str) -> Result<(), ProcessError> {
            self.stopped.lock().push(unit_name.to_string());
            Ok(())
        }

        fn query_status(&self, _unit_name: &str) -> Result<UnitStatus, ProcessError> {
            self.queries.fetch_add(1, Ordering::Relaxed);
            let active_state = if self.failing.load(Ordering::Relaxed) {
                "failed"
            } else {
                "active"
            };
            Ok(UnitStatus {
                load_state: "loaded".to_string(),
                active_state: active_state.to_string(),
                sub_state: "running".to_string(),
                main_pid: Some(std::process::id()),
            })
        }

        fn list_units(&self, _pattern: &str) -> Result<Vec<String>, ProcessError> {
            Ok(self
                .started
                .lock()
                .iter()
                .map(|s| s.unit_name.clone())
                .collect())
        }
    }

    fn test_config(services: Vec<ServiceDescriptor>) -> Config {
        Config {
            limits: RuntimeLimits::default(),
            services,
        }
    }

    fn sh_service(name: &str, port: u16) -> ServiceDescriptor {
        ServiceDescriptor {
            name: name.to_string(),
            exec_path: PathBuf::from("/bin/sh"),
            port,
            memory_mb: 128,
            cpu_percent: 50,
        }
    }

    fn orchestrator_with_mock() -> (Orchestrator, Arc<Mutex<Vec<UnitSpec>>>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let wal = WalWriter::create(&dir.path().join("test.wal")).unwrap();
        let mock = MockSupervisor::new();
        let started = Arc::clone(&mock.started);
        let orchestrator = Orchestrator::new(RuntimeLimits::default(), Box::new(mock), wal);
        (orchestrator, started, dir)
    }

    #[test]
    fn deploy_hands_budgets_and_port_to_the_supervisor() {
        let (mut orchestrator, started, _dir) = orchestrator_with_mock();
        orchestrator
            .deploy_all(&test_config(vec![sh_service("api", 8080)]))
            .unwrap();

        let specs = started.lock();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].unit_name, "l1ne-api-8080");
        assert_eq!(specs[0].port, 8080);
        assert_eq!(specs[0].memory_max_bytes, Some(128 * 1024 * 1024));
        assert_eq!(specs[0].cpu_quota_percent, Some(50));
        assert!(specs[0].exec_path.is_absolute());
    }

    #[test]
    fn deployed_instances_are_running_in_order() {
        let (mut orchestrator, _, _dir) = orchestrator_with_mock();
        orchestrator
            .deploy_all(&test_config(vec![
                sh_service("api", 8080),
                sh_service("worker", 8081),
            ]))
            .unwrap();

        let table = orchestrator.instances();
        let instances = table.read();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].service_id, 1);
        assert_eq!(instances[0].state, InstanceState::Running);
        assert_eq!(instances[1].name, "worker");
    }

    #[test]
    fn missing_binary_fails_the_whole_start() {
        let (mut orchestrator, started, _dir) = orchestrator_with_mock();
        let result = orchestrator.deploy_all(&test_config(vec![ServiceDescriptor {
            name: "ghost".to_string(),
            exec_path: PathBuf::from("/nonexistent/ghost"),
            port: 8080,
            memory_mb: 64,
            cpu_percent: 10,
        }]));
        assert!(matches!(
            result,
            Err(OrchestratorError::BinaryNotFound { .. })
        ));
        assert!(started.lock().is_empty());
    }

    #[test]
    fn non_executable_file_is_inaccessible() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.txt");
        std::fs::write(&plain, "data").unwrap();
        let result = resolve_executable(&plain);
        assert!(matches!(
            result,
            Err(OrchestratorError::BinaryNotAccessible { .. })
        ));
    }

    #[test]
    fn over_budget_fleet_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let wal = WalWriter::create(&dir.path().join("test.wal")).unwrap();
        let limits = RuntimeLimits::new(1, 16, 4096, 4, 4096).unwrap();
        let mut orchestrator = Orchestrator::new(limits, Box::new(MockSupervisor::new()), wal);

        let result = orchestrator.deploy_all(&test_config(vec![
            sh_service("a", 8080),
            sh_service("b", 8081),
        ]));
        assert!(matches!(
            result,
            Err(OrchestratorError::TooManyServices { count: 2, limit: 1 })
        ));
    }

    #[test]
    fn health_check_demotes_failed_units() {
        let dir = tempfile::tempdir().unwrap();
        let wal_path = dir.path().join("test.wal");
        let wal = WalWriter::create(&wal_path).unwrap();
        let mock = MockSupervisor::new();
        let failing = Arc::clone(&mock.failing);
        let mut orchestrator =
            Orchestrator::new(RuntimeLimits::default(), Box::new(mock), wal);
        orchestrator
            .deploy_all(&test_config(vec![sh_service("api", 8080)]))
            .unwrap();

        // Healthy pass changes nothing.
        orchestrator.health_check();
        assert_eq!(
            orchestrator.instances().read()[0].state,
            InstanceState::Running
        );

        failing.store(true, Ordering::Relaxed);
        orchestrator.health_check();
        assert_eq!(
            orchestrator.instances().read()[0].state,
            InstanceState::Failed
        );

        // Start record plus the failure stop record.
        let mut reader = l1ne_wal::WalReader::open(&wal_path).unwrap();
        let mut entries = Vec::new();
        while let Some(entry) = reader.read_entry().unwrap() {
            entries.push(entry);
        }
        assert_eq!(entries.len(), 2);
        match entries[1].payload() {
            l1ne_wal::Payload::ServiceStop {
                service_id,
                exit_code,
            } => {
                assert_eq!(service_id, 1);
                assert_eq!(exit_code, 1);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn shutdown_stops_in_reverse_order_and_logs_to_wal() {
        let dir = tempfile::tempdir().unwrap();
        let wal_path = dir.path().join("test.wal");
        let wal = WalWriter::create(&wal_path).unwrap();
        let mock = MockSupervisor::new();
        let stopped = Arc::clone(&mock.stopped);
        let mut orchestrator =
            Orchestrator::new(RuntimeLimits::default(), Box::new(mock), wal);

        orchestrator
            .deploy_all(&test_config(vec![
                sh_service("api", 8080),
                sh_service("worker", 8081),
            ]))
            .unwrap();
        orchestrator.shutdown_all().unwrap();

        assert_eq!(
            *stopped.lock(),
            vec!["l1ne-worker-8081".to_string(), "l1ne-api-8080".to_string()]
        );

        // Two starts then two stops, all verifying.
        let mut reader = l1ne_wal::WalReader::open(&wal_path).unwrap();
        let mut kinds = Vec::new();
        while let Some(entry) = reader.read_entry().unwrap() {
            kinds.push(entry.entry_type);
        }
        use l1ne_wal::EntryType::*;
        assert_eq!(kinds, vec![ServiceStart, ServiceStart, ServiceStop, ServiceStop]);
    }
}
