//! simkernel: Kernel Control Plane Simulator
//!
//! Simulates the control plane of a single-machine kernel:
//! - Process lifecycle and FCFS/SRTF/HRRN scheduling
//! - Resource pools with all-or-nothing requests and semaphore wait queues
//! - Paged memory with per-process page tables and address translation
//! - Interrupt vector table, pending-interrupt controller and interval timer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Timer thread ──trigger──► InterruptController (Mutex<FIFO>) │
//! ├──────────────────────────────────┬──────────────────────────┤
//! │                      Kernel loop │ drain                    │
//! │                                  ▼                          │
//! │                           VectorTable ──► handlers          │
//! │                                  │                          │
//! │  ┌───────────────────────────────▼───────────────────────┐  │
//! │  │                      Scheduler                        │  │
//! │  │  New ─► Ready ─► Running ─► Terminated                │  │
//! │  │           ▲  ╲                                        │  │
//! │  │           └── Blocked                                 │  │
//! │  └───────────────────────────────┬───────────────────────┘  │
//! │  ┌──────────────────┐  ┌─────────▼──────────┐               │
//! │  │ ResourceManager  │──│ PagingMemoryManager │               │
//! │  │ CPU/Disk/Printer │  │ frames, page tables │               │
//! │  │   + semaphores   │  │   translation       │               │
//! │  └──────────────────┘  └────────────────────┘               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod drivers;
pub mod error;
pub mod kernel;
pub mod mm;
pub mod sys;

pub use config::KernelConfig;
pub use error::{KernelError, KernelResult};
pub use kernel::Kernel;

/// Kernel version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Kernel name
pub const NAME: &str = "simkernel";
