//! Validated runtime dimensioning.
//!
//! `RuntimeLimits` is the value object every online component is sized by.
//! All five fields are strictly positive and capped; the struct is immutable
//! after construction, so a successfully built instance can be copied around
//! without re-checking.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{
    CGROUP_MONITORS_CAP, MAX_SERVICE_INSTANCES, PROXY_BUFFER_SIZE_CAP, PROXY_CONNECTIONS_CAP,
    SYSTEMD_BUFFER_SIZE_CAP,
};

/// Error type for limit validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    /// A limit field is zero or above its hard cap.
    #[error("limit {field} = {value} outside (0, {max}]")]
    LimitExceeded {
        /// Name of the offending field.
        field: &'static str,
        /// Configured value.
        value: u32,
        /// Hard cap for this field.
        max: u32,
    },
}

/// Runtime dimensioning for the orchestrator.
///
/// Deserialized from the `[limits]` table of the configuration file, then
/// validated before any component is constructed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeLimits {
    service_instances_count: u32,
    proxy_connections_max: u32,
    proxy_buffer_size: u32,
    cgroup_monitors_count: u32,
    systemd_buffer_size: u32,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            service_instances_count: MAX_SERVICE_INSTANCES as u32,
            proxy_connections_max: 1024,
            proxy_buffer_size: 4096,
            cgroup_monitors_count: 16,
            systemd_buffer_size: 4096,
        }
    }
}

impl RuntimeLimits {
    /// Build a validated limits object.
    ///
    /// # Errors
    ///
    /// Returns [`LimitError::LimitExceeded`] when any field is zero or
    /// above its cap.
    pub fn new(
        service_instances_count: u32,
        proxy_connections_max: u32,
        proxy_buffer_size: u32,
        cgroup_monitors_count: u32,
        systemd_buffer_size: u32,
    ) -> Result<Self, LimitError> {
        let limits = Self {
            service_instances_count,
            proxy_connections_max,
            proxy_buffer_size,
            cgroup_monitors_count,
            systemd_buffer_size,
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Re-check every field against its cap.
    pub fn validate(&self) -> Result<(), LimitError> {
        check(
            "service_instances_count",
            self.service_instances_count,
            MAX_SERVICE_INSTANCES as u32,
        )?;
        check(
            "proxy_connections_max",
            self.proxy_connections_max,
            PROXY_CONNECTIONS_CAP,
        )?;
        check(
            "proxy_buffer_size",
            self.proxy_buffer_size,
            PROXY_BUFFER_SIZE_CAP,
        )?;
        check(
            "cgroup_monitors_count",
            self.cgroup_monitors_count,
            CGROUP_MONITORS_CAP,
        )?;
        check(
            "systemd_buffer_size",
            self.systemd_buffer_size,
            SYSTEMD_BUFFER_SIZE_CAP,
        )?;
        Ok(())
    }

    pub fn service_instances_count(&self) -> u32 {
        self.service_instances_count
    }

    pub fn proxy_connections_max(&self) -> u32 {
        self.proxy_connections_max
    }

    pub fn proxy_buffer_size(&self) -> u32 {
        self.proxy_buffer_size
    }

    pub fn cgroup_monitors_count(&self) -> u32 {
        self.cgroup_monitors_count
    }

    pub fn systemd_buffer_size(&self) -> u32 {
        self.systemd_buffer_size
    }
}

fn check(field: &'static str, value: u32, max: u32) -> Result<(), LimitError> {
    if value == 0 || value > max {
        return Err(LimitError::LimitExceeded { field, value, max });
    }
    Ok(())
}
