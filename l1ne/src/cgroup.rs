//! Cgroup v2 resource usage reader.
//!
//! One reader per deployed unit, keyed by the unit name under the systemd
//! slice hierarchy. Reads `memory.current` and the `usage_usec` line of
//! `cpu.stat`. The orchestrator creates at most `cgroup_monitors_count`
//! of these.

use std::io;
use std::path::{Path, PathBuf};

/// Point-in-time resource usage of one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CgroupUsage {
    pub memory_bytes: u64,
    pub cpu_usage_usec: u64,
}

/// Reads usage counters for one unit's cgroup.
#[derive(Debug, Clone)]
pub struct CgroupReader {
    unit_name: String,
    base: PathBuf,
}

impl CgroupReader {
    /// Reader rooted at the standard systemd system slice.
    pub fn new(unit_name: &str) -> Self {
        let base = PathBuf::from(format!(
            "/sys/fs/cgroup/system.slice/{unit_name}.service"
        ));
        Self {
            unit_name: unit_name.to_string(),
            base,
        }
    }

    /// Reader rooted elsewhere (tests point this at a temp directory).
    pub fn with_base(unit_name: &str, base: &Path) -> Self {
        Self {
            unit_name: unit_name.to_string(),
            base: base.to_path_buf(),
        }
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Read both counters; errors bubble to the caller (the unit may have
    /// exited and dropped its cgroup).
    pub fn usage(&self) -> io::Result<CgroupUsage> {
        let memory_bytes = std::fs::read_to_string(self.base.join("memory.current"))?
            .trim()
            .parse::<u64>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let cpu_stat = std::fs::read_to_string(self.base.join("cpu.stat"))?;
        let cpu_usage_usec = cpu_stat
            .lines()
            .find_map(|line| line.strip_prefix("usage_usec "))
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "cpu.stat missing usage_usec")
            })?;

        Ok(CgroupUsage {
            memory_bytes,
            cpu_usage_usec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_cgroup(memory: &str, cpu_stat: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("memory.current"), memory).unwrap();
        std::fs::write(dir.path().join("cpu.stat"), cpu_stat).unwrap();
        dir
    }

    #[test]
    fn counters_are_parsed() {
        let dir = fake_cgroup(
            "1048576\n",
            "usage_usec 250000\nuser_usec 200000\nsystem_usec 50000\n",
        );
        let reader = CgroupReader::with_base("l1ne-api-8080", dir.path());
        let usage = reader.usage().unwrap();
        assert_eq!(usage.memory_bytes, 1_048_576);
        assert_eq!(usage.cpu_usage_usec, 250_000);
    }

    #[test]
    fn missing_cgroup_is_an_error() {
        let reader = CgroupReader::with_base("gone", Path::new("/nonexistent/cgroup"));
        assert!(reader.usage().is_err());
    }

    #[test]
    fn malformed_cpu_stat_is_an_error() {
        let dir = fake_cgroup("42\n", "user_usec 1\n");
        let reader = CgroupReader::with_base("l1ne-api-8080", dir.path());
        assert!(reader.usage().is_err());
    }
}
