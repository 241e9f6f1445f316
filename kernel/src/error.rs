//! Error types for the kernel simulator
//!
//! One error enum covers every subsystem. Shortages are recoverable (the
//! process waits on the Blocked queue); translation, configuration and
//! step-limit errors are surfaced to the caller.

use crate::mm::FrameIndex;
use crate::sys::{ProcessId, ProcessState, ResourceKind};
use thiserror::Error;

/// Result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Kernel error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    // ========== Process Errors ==========

    /// A process with this pid is already live
    #[error("Process already exists: {0}")]
    ProcessAlreadyExists(ProcessId),

    /// No live process (or no allocation) with this pid
    #[error("Unknown process: {0}")]
    UnknownProcess(ProcessId),

    /// Operation not valid in the process's current state
    #[error("Process {pid} is {state:?}")]
    InvalidState {
        /// Offending process
        pid: ProcessId,
        /// State it was found in
        state: ProcessState,
    },

    /// Attribute code outside {0, 1, 2}
    #[error("Invalid process attribute: {0}")]
    InvalidAttribute(u8),

    // ========== Memory Errors ==========

    /// The pid already owns a page table
    #[error("Process {0} already has a memory allocation")]
    AlreadyAllocated(ProcessId),

    /// Not enough free frames for the request
    #[error("Insufficient frames: need {needed}, {available} free")]
    InsufficientFrames {
        /// Pages the request needs
        needed: usize,
        /// Frames currently free
        available: usize,
    },

    /// Logical page beyond the end of the page table
    #[error("Page {page} out of range ({pages} pages mapped)")]
    PageOutOfRange {
        /// Requested page number
        page: usize,
        /// Page table length
        pages: usize,
    },

    /// Page table entry holds no frame
    #[error("Page {0} is not mapped")]
    UnmappedPage(usize),

    /// Frame index outside the physical pool, or freed twice
    #[error("Invalid frame: {0}")]
    InvalidFrame(FrameIndex),

    /// Victim eviction requested but swapping is not available
    #[error("Cannot swap out process {0}")]
    SwapUnsupported(ProcessId),

    // ========== Resource Errors ==========

    /// A resource pool cannot cover the request
    #[error("Insufficient resource: {0}")]
    InsufficientResource(ResourceKind),

    // ========== Scheduling Errors ==========

    /// HRRN response ratio with zero remaining runtime
    #[error("Degenerate scheduling input for process {0}: zero remaining runtime")]
    DegenerateScheduleInput(ProcessId),

    /// Run loop exceeded its step bound with work still pending
    #[error("Step limit of {steps} exceeded with {pending} processes pending")]
    StepLimitExceeded {
        /// Steps executed
        steps: usize,
        /// Live processes left behind
        pending: usize,
    },

    // ========== Interrupt Errors ==========

    /// Interrupt tag outside the vector table
    #[error("Invalid interrupt type: {0}")]
    InvalidInterruptType(u8),

    /// Timer thread could not be started
    #[error("Timer failure: {0}")]
    TimerFailure(String),

    // ========== Configuration Errors ==========

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Missing configuration
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),
}

impl KernelError {
    /// Check if this error is recovered locally through the Blocked queue
    pub fn is_recoverable(&self) -> bool {
        matches!(self,
            KernelError::InsufficientFrames { .. } |
            KernelError::InsufficientResource(_)
        )
    }

    /// Check if this error is a memory translation misuse
    pub fn is_translation_fault(&self) -> bool {
        matches!(self,
            KernelError::UnknownProcess(_) |
            KernelError::PageOutOfRange { .. } |
            KernelError::UnmappedPage(_)
        )
    }
}
