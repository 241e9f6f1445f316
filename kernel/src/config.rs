//! Kernel Configuration
//!
//! Sizes of the simulated machine, scheduler limits, timer pacing and the
//! initial workload. Stored as JSON; durations use humantime strings.

use crate::sys::{DeviceClaim, ProcessSpec, SchedulingPolicy};
use crate::{KernelError, KernelResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Kernel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Physical memory
    pub memory: MemoryConfig,

    /// Resource pool capacities
    pub resources: ResourceConfig,

    /// Scheduler settings
    pub scheduler: SchedulerConfig,

    /// Timer and loop pacing
    pub timer: TimerConfig,

    /// Processes created at boot
    pub workload: Vec<ProcessSpec>,

    /// Logging level
    pub log_level: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            resources: ResourceConfig::default(),
            scheduler: SchedulerConfig::default(),
            timer: TimerConfig::default(),
            workload: default_workload(),
            log_level: "info".into(),
        }
    }
}

impl KernelConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> KernelResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                KernelError::MissingConfiguration(path.display().to_string())
            }
            _ => KernelError::InvalidConfiguration(e.to_string()),
        })?;

        serde_json::from_str(&content)
            .map_err(|e| KernelError::InvalidConfiguration(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> KernelResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| KernelError::InvalidConfiguration(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| KernelError::InvalidConfiguration(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> KernelResult<()> {
        if self.memory.total_frames == 0 {
            return Err(KernelError::InvalidConfiguration(
                "memory.total_frames must be at least 1".into(),
            ));
        }

        if self.memory.frame_size_kb == 0 {
            return Err(KernelError::InvalidConfiguration(
                "memory.frame_size_kb must be at least 1".into(),
            ));
        }

        if self.scheduler.max_steps == 0 {
            return Err(KernelError::InvalidConfiguration(
                "scheduler.max_steps must be at least 1".into(),
            ));
        }

        if self.timer.enabled && self.timer.interval.is_zero() {
            return Err(KernelError::InvalidConfiguration(
                "timer.interval must be non-zero when the timer is enabled".into(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &self.workload {
            if !seen.insert(spec.pid) {
                return Err(KernelError::InvalidConfiguration(format!(
                    "duplicate pid {} in workload",
                    spec.pid
                )));
            }
        }

        Ok(())
    }
}

/// Physical memory configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of frames
    pub total_frames: usize,

    /// Frame size in KB
    pub frame_size_kb: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            total_frames: 256,
            frame_size_kb: 4,
        }
    }
}

/// Resource pool capacities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// CPUs
    pub cpu: u32,

    /// Disks
    pub disk: u32,

    /// Printers
    pub printer: u32,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            cpu: 2,
            disk: 1,
            printer: 1,
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Selection policy
    pub policy: SchedulingPolicy,

    /// Step bound before a run is aborted.
    ///
    /// The kernel loop takes one step per cycle and the count carries
    /// across cycles, so a bound below `timer.max_cycles` ends a run with
    /// `StepLimitExceeded` before the cycle cap is reached.
    pub max_steps: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: SchedulingPolicy::Fcfs,
            max_steps: 100,
        }
    }
}

/// Timer and kernel loop pacing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Start the timer at boot
    pub enabled: bool,

    /// Timer interrupt period
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Pause between kernel loop cycles
    #[serde(with = "humantime_serde")]
    pub cycle_pause: Duration,

    /// Kernel loop cycle cap. Only reachable when `scheduler.max_steps`
    /// is at least as large.
    pub max_cycles: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(100),
            cycle_pause: Duration::from_millis(10),
            max_cycles: 1000,
        }
    }
}

/// Demo workload: a plain process, a disk user, a printer user and a
/// dependent of the first
fn default_workload() -> Vec<ProcessSpec> {
    vec![
        ProcessSpec::new(101, 10).memory(8).priority(3),
        ProcessSpec::new(102, 6).memory(12).arrival(2).priority(2).device(DeviceClaim::Disk),
        ProcessSpec::new(103, 8).memory(6).arrival(4).priority(1).device(DeviceClaim::Printer),
        ProcessSpec::new(104, 12).memory(10).arrival(3).priority(4).after(&[101]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.total_frames * config.memory.frame_size_kb, 1024);
        assert_eq!(config.workload.len(), 4);
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = KernelConfig::default();
        config.memory.total_frames = 0;
        assert!(config.validate().is_err());

        let mut config = KernelConfig::default();
        config.scheduler.max_steps = 0;
        assert!(config.validate().is_err());

        let mut config = KernelConfig::default();
        config.timer.interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.timer.enabled = false;
        assert!(config.validate().is_ok());

        let mut config = KernelConfig::default();
        config.workload.push(ProcessSpec::new(101, 1));
        assert!(matches!(config.validate(), Err(KernelError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(
            KernelConfig::load(&path),
            Err(KernelError::MissingConfiguration(_))
        ));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            KernelConfig::load(&path),
            Err(KernelError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_partial_json() {
        let config: KernelConfig = serde_json::from_str(
            r#"{"scheduler": {"policy": "hrrn"}, "timer": {"interval": "250ms"}, "workload": []}"#,
        )
        .unwrap();

        assert_eq!(config.scheduler.policy, SchedulingPolicy::Hrrn);
        assert_eq!(config.scheduler.max_steps, 100);
        assert_eq!(config.timer.interval, Duration::from_millis(250));
        assert_eq!(config.memory, MemoryConfig::default());
        assert!(config.workload.is_empty());
    }
}
