//! # Process Supervisor Capability
//!
//! Defines the contract the orchestrator uses to start, stop and inspect
//! managed units, plus the systemd-backed implementation used in
//! production.
//!
//! # Design
//!
//! The trait is deliberately thin — it captures the four operations any
//! service-manager integration must provide, without mandating systemd.
//! Tests substitute a recording mock; the `start` command injects
//! [`SystemdRun`], which shells out to `systemd-run`/`systemctl` and reads
//! their output through a bounded buffer.

use std::path::PathBuf;
use std::process::Command;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use thiserror::Error;
use tracing::debug;

/// Everything the service manager needs to launch one unit.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    /// Unique unit name (`l1ne-{service}-{port}`).
    pub unit_name: String,
    /// Absolute path of the executable.
    pub exec_path: PathBuf,
    /// Port handed to the child via the `PORT` environment variable.
    pub port: u16,
    /// Optional run-as uid.
    pub uid: Option<u32>,
    /// Optional run-as gid.
    pub gid: Option<u32>,
    /// MemoryMax budget [bytes].
    pub memory_max_bytes: Option<u64>,
    /// CPUQuota [% of one core].
    pub cpu_quota_percent: Option<u32>,
}

/// Unit status triple as the service manager reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitStatus {
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    /// Main PID when the manager reports one.
    pub main_pid: Option<u32>,
}

impl UnitStatus {
    /// States accepted during the readiness window.
    pub fn is_ready(&self) -> bool {
        matches!(self.active_state.as_str(), "active" | "activating")
    }
}

/// Error type for service-manager operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Failed to start the requested unit.
    #[error("failed to start unit {unit}: {reason}")]
    SpawnFailed { unit: String, reason: String },

    /// Failed to stop a unit.
    #[error("failed to stop unit {unit}: {reason}")]
    StopFailed { unit: String, reason: String },

    /// Status query failed.
    #[error("status query for {unit} failed: {reason}")]
    QueryFailed { unit: String, reason: String },

    /// Generic I/O or system error.
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Supervisor contract for managed service lifecycles.
pub trait ProcessSupervisor: Send + Sync {
    /// Launch one unit; returns once the manager accepted it.
    fn start_unit(&mut self, spec: &UnitSpec) -> Result<(), ProcessError>;

    /// Stop a unit by name.
    fn stop_unit(&mut self, unit_name: &str) -> Result<(), ProcessError>;

    /// Query the load/active/sub state of a unit.
    fn query_status(&self, unit_name: &str) -> Result<UnitStatus, ProcessError>;

    /// List unit names matching a glob pattern.
    fn list_units(&self, pattern: &str) -> Result<Vec<String>, ProcessError>;
}

/// Probe whether a PID is alive (signal 0).
pub fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// systemd-backed implementation driving `systemd-run` / `systemctl`.
pub struct SystemdRun {
    /// Cap on command output read into memory [bytes].
    buffer_size: usize,
}

impl SystemdRun {
    pub fn new(systemd_buffer_size: u32) -> Self {
        Self {
            buffer_size: systemd_buffer_size as usize,
        }
    }

    /// Truncate command output to the configured bound, lossily decoded.
    fn bounded_text(&self, mut raw: Vec<u8>) -> String {
        raw.truncate(self.buffer_size);
        String::from_utf8_lossy(&raw).into_owned()
    }
}

impl ProcessSupervisor for SystemdRun {
    fn start_unit(&mut self, spec: &UnitSpec) -> Result<(), ProcessError> {
        let mut command = Command::new("systemd-run");
        command
            .arg(format!("--unit={}", spec.unit_name))
            .arg("--collect")
            .arg(format!("--setenv=PORT={}", spec.port));
        if let Some(memory_max) = spec.memory_max_bytes {
            command.arg(format!("--property=MemoryMax={memory_max}"));
        }
        if let Some(cpu_quota) = spec.cpu_quota_percent {
            command.arg(format!("--property=CPUQuota={cpu_quota}%"));
        }
        if let Some(uid) = spec.uid {
            command.arg(format!("--uid={uid}"));
        }
        if let Some(gid) = spec.gid {
            command.arg(format!("--gid={gid}"));
        }
        command.arg(&spec.exec_path);

        debug!(unit = %spec.unit_name, exec = %spec.exec_path.display(), "systemd-run");
        let output = command.output()?;
        if !output.status.success() {
            return Err(ProcessError::SpawnFailed {
                unit: spec.unit_name.clone(),
                reason: self.bounded_text(output.stderr),
            });
        }
        Ok(())
    }

    fn stop_unit(&mut self, unit_name: &str) -> Result<(), ProcessError> {
        let output = Command::new("systemctl").arg("stop").arg(unit_name).output()?;
        if !output.status.success() {
            return Err(ProcessError::StopFailed {
                unit: unit_name.to_string(),
                reason: self.bounded_text(output.stderr),
            });
        }
        Ok(())
    }

    fn query_status(&self, unit_name: &str) -> Result<UnitStatus, ProcessError> {
        let output = Command::new("systemctl")
            .arg("show")
            .arg("--property=LoadState,ActiveState,SubState,MainPID")
            .arg(unit_name)
            .output()?;
        if !output.status.success() {
            return Err(ProcessError::QueryFailed {
                unit: unit_name.to_string(),
                reason: self.bounded_text(output.stderr),
            });
        }

        let text = self.bounded_text(output.stdout);
        let mut status = UnitStatus::default();
        for line in text.lines() {
            match line.split_once('=') {
                Some(("LoadState", value)) => status.load_state = value.to_string(),
                Some(("ActiveState", value)) => status.active_state = value.to_string(),
                Some(("SubState", value)) => status.sub_state = value.to_string(),
                Some(("MainPID", value)) => {
                    status.main_pid = value.parse::<u32>().ok().filter(|&pid| pid > 0);
                }
                _ => {}
            }
        }
        Ok(status)
    }

    fn list_units(&self, pattern: &str) -> Result<Vec<String>, ProcessError> {
        let output = Command::new("systemctl")
            .arg("list-units")
            .arg("--plain")
            .arg("--no-legend")
            .arg("--all")
            .arg(pattern)
            .output()?;
        if !output.status.success() {
            return Err(ProcessError::QueryFailed {
                unit: pattern.to_string(),
                reason: self.bounded_text(output.stderr),
            });
        }

        let text = self.bounded_text(output.stdout);
        Ok(text
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(|unit| unit.trim_end_matches(".service").to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_accepts_active_and_activating() {
        for state in ["active", "activating"] {
            let status = UnitStatus {
                active_state: state.to_string(),
                ..UnitStatus::default()
            };
            assert!(status.is_ready());
        }
        let failed = UnitStatus {
            active_state: "failed".to_string(),
            ..UnitStatus::default()
        };
        assert!(!failed.is_ready());
    }

    #[test]
    fn own_pid_is_alive() {
        assert!(pid_alive(std::process::id()));
    }

    #[test]
    fn bounded_text_truncates() {
        let systemd = SystemdRun::new(8);
        let text = systemd.bounded_text(b"0123456789abcdef".to_vec());
        assert_eq!(text, "01234567");
    }
}
