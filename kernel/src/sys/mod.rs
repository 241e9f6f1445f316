//! Core Kernel Services
//!
//! Provides the process control plane:
//! - Process descriptors
//! - Resource pools and semaphores
//! - Scheduler

pub mod process;
pub mod resource;
pub mod scheduler;
pub mod semaphore;

pub use process::{BlockReason, DeviceClaim, Process, ProcessId, ProcessSpec, ProcessState};
pub use resource::{PoolStatus, RequestOutcome, ResourceDemand, ResourceKind, ResourceManager};
pub use scheduler::{RunSummary, Scheduler, SchedulingPolicy, StepOutcome};
pub use semaphore::Semaphore;
