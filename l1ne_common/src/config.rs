//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration
//! files across L1NE binaries: the orchestrator's [`Config`] (services +
//! runtime limits) and the simulator's [`ScenarioConfig`]. Both are typed
//! values; the declarative surface syntax is a collaborator of the core,
//! and anything that deserializes into these structs and passes
//! `validate()` is acceptable.
//!
//! # Usage
//!
//! ```rust,no_run
//! use l1ne_common::config::{Config, ConfigLoader};
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("l1ne.toml")).expect("load config");
//! println!("services: {}", config.services.len());
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::bounded::BoundedArray;
use crate::consts::{MAX_SERVICE_INSTANCES, SERVICE_NAME_MAX, SERVICE_PORT_MIN};
use crate::limits::{LimitError, RuntimeLimits};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path that was probed.
        path: PathBuf,
    },

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),

    /// A service entry is missing or malformed in a required field.
    #[error("service '{service}' has an invalid {field}")]
    IncompleteServiceConfig {
        /// Service name (or placeholder when the name itself is bad).
        service: String,
        /// Offending field.
        field: &'static str,
    },

    /// More services declared than the instance table holds.
    #[error("too many services: {count} (max {max})")]
    TooManyServices {
        /// Declared service count.
        count: usize,
        /// Instance table capacity.
        max: usize,
    },

    /// Runtime limit out of range.
    #[error(transparent)]
    Limit(#[from] LimitError),
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
/// - Returns `ConfigError::ValidationError` (or a more specific variant)
///   if semantic validation fails
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load and validate a configuration file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        tracing::debug!(path = %path.display(), "loading configuration");
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation beyond what serde enforces.
    fn validate(&self) -> Result<(), ConfigError>;
}

/// One long-running workload to deploy and proxy.
///
/// # TOML Example
///
/// ```toml
/// [[services]]
/// name = "api"
/// exec_path = "/usr/bin/api-server"
/// port = 8080
/// memory_mb = 256
/// cpu_percent = 50
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDescriptor {
    /// Service name, unique within the config.
    pub name: String,
    /// Executable to launch; must resolve to an absolute, accessible file.
    pub exec_path: PathBuf,
    /// Port the service binds (handed over via the `PORT` environment
    /// variable) and the proxy forwards to.
    pub port: u16,
    /// Memory budget passed to the service manager [MiB].
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,
    /// CPU quota passed to the service manager [% of one core].
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: u32,
}

fn default_memory_mb() -> u32 {
    256
}

fn default_cpu_percent() -> u32 {
    100
}

impl ServiceDescriptor {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() || self.name.len() > SERVICE_NAME_MAX {
            return Err(ConfigError::IncompleteServiceConfig {
                service: self.name.clone(),
                field: "name",
            });
        }
        if self.exec_path.as_os_str().is_empty() || !self.exec_path.is_absolute() {
            return Err(ConfigError::IncompleteServiceConfig {
                service: self.name.clone(),
                field: "exec_path",
            });
        }
        if self.port < SERVICE_PORT_MIN {
            return Err(ConfigError::IncompleteServiceConfig {
                service: self.name.clone(),
                field: "port",
            });
        }
        if self.memory_mb == 0 || self.cpu_percent == 0 {
            return Err(ConfigError::IncompleteServiceConfig {
                service: self.name.clone(),
                field: "resource budget",
            });
        }
        Ok(())
    }
}

/// Orchestrator configuration: the service fleet plus runtime limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Runtime dimensioning; defaults apply when the table is omitted.
    #[serde(default)]
    pub limits: RuntimeLimits,
    /// Deployed services, in deployment (and load-balancing) order.
    pub services: Vec<ServiceDescriptor>,
}

impl ConfigLoader for Config {
    fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;
        if self.services.is_empty() {
            return Err(ConfigError::ValidationError(
                "no services defined".to_string(),
            ));
        }
        if self.services.len() > MAX_SERVICE_INSTANCES {
            return Err(ConfigError::TooManyServices {
                count: self.services.len(),
                max: MAX_SERVICE_INSTANCES,
            });
        }
        for service in &self.services {
            service.validate()?;
        }
        for (i, a) in self.services.iter().enumerate() {
            for b in &self.services[i + 1..] {
                if a.name == b.name {
                    return Err(ConfigError::ValidationError(format!(
                        "duplicate service name '{}'",
                        a.name
                    )));
                }
                if a.port == b.port {
                    return Err(ConfigError::ValidationError(format!(
                        "services '{}' and '{}' share port {}",
                        a.name, b.name, a.port
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Fault probabilities and delay range for chaos scenarios.
///
/// All probabilities are in `[0, 1]`; the delay range is inclusive with
/// `delay_min_us ≤ delay_max_us`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaultConfig {
    pub crash_probability: f64,
    pub delay_probability: f64,
    pub resource_exhaustion_probability: f64,
    pub connection_failure_probability: f64,
    pub delay_min_us: u64,
    pub delay_max_us: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            crash_probability: 0.0,
            delay_probability: 0.0,
            resource_exhaustion_probability: 0.0,
            connection_failure_probability: 0.0,
            delay_min_us: 0,
            delay_max_us: 0,
        }
    }
}

impl FaultConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, p) in [
            ("crash_probability", self.crash_probability),
            ("delay_probability", self.delay_probability),
            (
                "resource_exhaustion_probability",
                self.resource_exhaustion_probability,
            ),
            (
                "connection_failure_probability",
                self.connection_failure_probability,
            ),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} = {p} outside [0, 1]"
                )));
            }
        }
        if self.delay_min_us > self.delay_max_us {
            return Err(ConfigError::ValidationError(format!(
                "delay range inverted: {} > {}",
                self.delay_min_us, self.delay_max_us
            )));
        }
        Ok(())
    }
}

/// Closed set of scenario kinds the engine can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioType {
    LoadTest,
    ChaosTest,
    TransactionStress,
    LifecycleTest,
    Custom,
}

/// One simulated service inside a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    /// Registry id, strictly positive and unique within the scenario.
    pub service_id: u32,
    /// Simulated listen port.
    pub port: u16,
    /// Offset of this service's start event from the scenario base time.
    #[serde(default)]
    pub start_delay_us: u64,
}

/// A deterministic simulation run description.
///
/// # TOML Example
///
/// ```toml
/// name = "chaos-two-services"
/// scenario_type = "chaos_test"
/// duration_us = 10_000_000
/// seed = 42
///
/// [[services]]
/// service_id = 1
/// port = 8080
///
/// [[services]]
/// service_id = 2
/// port = 8081
///
/// [fault_config]
/// crash_probability = 0.1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    pub name: String,
    pub scenario_type: ScenarioType,
    /// Simulated services; the table is bounded at deserialization time.
    pub services: BoundedArray<ServiceSpec, MAX_SERVICE_INSTANCES>,
    /// Simulated duration of the generation window [µs], strictly positive.
    pub duration_us: u64,
    /// PRNG seed, strictly positive.
    pub seed: u64,
    #[serde(default)]
    pub fault_config: FaultConfig,
}

impl ConfigLoader for ScenarioConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "scenario name cannot be empty".to_string(),
            ));
        }
        if self.duration_us == 0 {
            return Err(ConfigError::ValidationError(
                "duration_us must be strictly positive".to_string(),
            ));
        }
        if self.seed == 0 {
            return Err(ConfigError::ValidationError(
                "seed must be strictly positive".to_string(),
            ));
        }
        if self.services.is_empty() {
            return Err(ConfigError::ValidationError(
                "scenario declares no services".to_string(),
            ));
        }
        for spec in &self.services {
            if spec.service_id == 0 {
                return Err(ConfigError::ValidationError(
                    "service_id must be strictly positive".to_string(),
                ));
            }
            if spec.port < SERVICE_PORT_MIN {
                return Err(ConfigError::ValidationError(format!(
                    "service {} port {} below {}",
                    spec.service_id, spec.port, SERVICE_PORT_MIN
                )));
            }
        }
        for (i, a) in self.services.iter().enumerate() {
            for b in &self.services[i + 1..] {
                if a.service_id == b.service_id {
                    return Err(ConfigError::ValidationError(format!(
                        "duplicate service_id {}",
                        a.service_id
                    )));
                }
            }
        }
        self.fault_config.validate()
    }
}
