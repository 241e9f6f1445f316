//! Process Descriptors
//!
//! A process is the schedulable entity:
//! - Service demand (remaining runtime) and arrival time
//! - Memory demand in KB
//! - Optional device claim (disk or printer)
//! - Lifecycle state

use super::resource::ResourceKind;
use crate::{KernelError, KernelResult};
use serde::{Deserialize, Serialize};

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// Get raw value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// Created, arrival time not reached
    New,
    /// Arrived, waiting to be scheduled
    Ready,
    /// Waiting on a resource or I/O
    Blocked,
    /// Holding its resources
    Running,
    /// Finished; record is dropped
    Terminated,
}

/// Extra device a process needs besides CPU and memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClaim {
    /// CPU and memory only (attribute 0)
    #[default]
    None,
    /// Needs the disk (attribute 1)
    Disk,
    /// Needs the printer (attribute 2)
    Printer,
}

impl DeviceClaim {
    /// Numeric attribute code
    pub fn code(&self) -> u8 {
        match self {
            DeviceClaim::None => 0,
            DeviceClaim::Disk => 1,
            DeviceClaim::Printer => 2,
        }
    }

    /// Resource pool this claim draws from
    pub fn resource(&self) -> Option<ResourceKind> {
        match self {
            DeviceClaim::None => None,
            DeviceClaim::Disk => Some(ResourceKind::Disk),
            DeviceClaim::Printer => Some(ResourceKind::Printer),
        }
    }
}

impl TryFrom<u8> for DeviceClaim {
    type Error = KernelError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(DeviceClaim::None),
            1 => Ok(DeviceClaim::Disk),
            2 => Ok(DeviceClaim::Printer),
            other => Err(KernelError::InvalidAttribute(other)),
        }
    }
}

/// Why a blocked process is waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Parked on a resource pool's semaphore
    Resource(ResourceKind),
    /// Waiting for an I/O completion interrupt
    Io,
}

/// Parameters for creating a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Caller-chosen pid
    pub pid: ProcessId,
    /// Memory demand in KB
    #[serde(default)]
    pub memory_kb: usize,
    /// Service time in ticks
    pub runtime: u64,
    /// Arrival time in ticks
    #[serde(default)]
    pub arrival_time: u64,
    /// Priority (advisory)
    #[serde(default)]
    pub priority: u8,
    /// Extra device needed
    #[serde(default)]
    pub device: DeviceClaim,
    /// Predecessor pids (advisory)
    #[serde(default)]
    pub predecessors: Vec<ProcessId>,
}

impl ProcessSpec {
    /// Spec with no memory, device, or predecessors, arriving at 0
    pub fn new(pid: u32, runtime: u64) -> Self {
        Self {
            pid: ProcessId(pid),
            memory_kb: 0,
            runtime,
            arrival_time: 0,
            priority: 0,
            device: DeviceClaim::None,
            predecessors: Vec::new(),
        }
    }

    /// Set memory demand
    pub fn memory(mut self, kb: usize) -> Self {
        self.memory_kb = kb;
        self
    }

    /// Set arrival time
    pub fn arrival(mut self, at: u64) -> Self {
        self.arrival_time = at;
        self
    }

    /// Set priority
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set device claim
    pub fn device(mut self, device: DeviceClaim) -> Self {
        self.device = device;
        self
    }

    /// Set device claim from its numeric attribute code
    pub fn attribute(self, code: u8) -> KernelResult<Self> {
        Ok(self.device(DeviceClaim::try_from(code)?))
    }

    /// Set predecessors
    pub fn after(mut self, predecessors: &[u32]) -> Self {
        self.predecessors = predecessors.iter().copied().map(ProcessId).collect();
        self
    }
}

/// Process structure
#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    /// Process ID
    pub id: ProcessId,
    /// Process state
    pub state: ProcessState,
    /// Ticks of service still needed
    pub remaining_runtime: u64,
    /// Arrival time
    pub arrival_time: u64,
    /// Priority (advisory)
    pub priority: u8,
    /// Memory demand in KB
    pub memory_kb: usize,
    /// Extra device needed
    pub device: DeviceClaim,
    /// Predecessor pids (stored, not enforced)
    pub predecessors: Vec<ProcessId>,
    /// What a blocked process waits on
    pub blocked_on: Option<BlockReason>,
}

impl Process {
    /// Create new process in the `New` state
    pub fn new(spec: ProcessSpec) -> Self {
        Self {
            id: spec.pid,
            state: ProcessState::New,
            remaining_runtime: spec.runtime,
            arrival_time: spec.arrival_time,
            priority: spec.priority,
            memory_kb: spec.memory_kb,
            device: spec.device,
            predecessors: spec.predecessors,
            blocked_on: None,
        }
    }

    /// Check if the process has arrived by `now`
    pub fn has_arrived(&self, now: u64) -> bool {
        self.arrival_time <= now
    }

    /// Check if the process is parked for I/O completion
    pub fn is_waiting_io(&self) -> bool {
        self.blocked_on == Some(BlockReason::Io)
    }

    /// HRRN response ratio: (wait + service) / service
    pub fn response_ratio(&self, now: u64) -> KernelResult<f64> {
        if self.remaining_runtime == 0 {
            return Err(KernelError::DegenerateScheduleInput(self.id));
        }
        let wait = now.saturating_sub(self.arrival_time);
        Ok(wait.saturating_add(self.remaining_runtime) as f64 / self.remaining_runtime as f64)
    }

    /// Pool demand: CPU always, plus the claimed device.
    ///
    /// Memory is requested from the paging manager, not a pool.
    pub fn pool_demand(&self) -> Vec<(ResourceKind, u32)> {
        let mut demand = vec![(ResourceKind::Cpu, 1)];
        if let Some(kind) = self.device.resource() {
            demand.push((kind, 1));
        }
        demand
    }

    /// Everything the process needs, memory included, as (kind, amount)
    pub fn required_resources(&self) -> Vec<(ResourceKind, u64)> {
        let mut required = vec![(ResourceKind::Cpu, 1)];
        if self.memory_kb > 0 {
            required.push((ResourceKind::Memory, self.memory_kb as u64));
        }
        if let Some(kind) = self.device.resource() {
            required.push((kind, 1));
        }
        required
    }
}
