//! Memory Management Subsystem
//!
//! Paged memory over a fixed pool of physical frames:
//! - Physical frame pool (FIFO free queue)
//! - Per-process page tables
//! - Logical -> physical address translation
//!
//! # Translation
//!
//! ```text
//! logical address
//! ┌───────────────────────┬──────────────┐
//! │      page number      │    offset    │   page = addr / frame_bytes
//! └───────────┬───────────┴──────┬───────┘   offset = addr % frame_bytes
//!             │ page table       │
//!             ▼                  │
//!          frame index           │
//!             │                  ▼
//!             └──► frame * frame_bytes + offset = physical address
//! ```
//!
//! There is no secondary storage. When frames run out, the resource
//! manager may ask a [`VictimSelector`] for a process to evict; the
//! default selector never picks one.

pub mod frame;
pub mod page;

use crate::config::MemoryConfig;
use crate::sys::ProcessId;
use crate::{KernelError, KernelResult};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub use frame::{Frame, FrameAllocator, FrameIndex};
pub use page::{PageTable, PageTableEntry};

/// Bytes per kilobyte
pub const KB: u64 = 1024;

/// Logical (per-process) address, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct LogicalAddr(u64);

impl LogicalAddr {
    /// Create new logical address
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get raw address value
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Split into (page number, offset) for the given frame size
    pub const fn split(self, frame_bytes: u64) -> (usize, u64) {
        ((self.0 / frame_bytes) as usize, self.0 % frame_bytes)
    }
}

/// Physical address type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    /// Create new physical address
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get raw address value
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Frame containing this address
    pub const fn frame(self, frame_bytes: u64) -> FrameIndex {
        (self.0 / frame_bytes) as FrameIndex
    }
}

/// Page-replacement hook consulted when an allocation runs out of frames.
///
/// `candidates` lists processes that hold memory and are not running.
pub trait VictimSelector: Send {
    /// Pick a process whose frames may be reclaimed
    fn select_victim(&mut self, memory: &PagingMemoryManager, candidates: &[ProcessId]) -> Option<ProcessId>;
}

/// Selector that never evicts anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVictim;

impl VictimSelector for NoVictim {
    fn select_victim(&mut self, _memory: &PagingMemoryManager, _candidates: &[ProcessId]) -> Option<ProcessId> {
        None
    }
}

/// Snapshot of physical memory
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStatus {
    /// Total frames
    pub total_frames: usize,
    /// Free frames
    pub free_frames: usize,
    /// Frame size in KB
    pub frame_size_kb: usize,
    /// Occupied frames: (frame, owner, logical page)
    pub occupied: Vec<(FrameIndex, ProcessId, usize)>,
    /// Page mappings per process
    pub page_tables: BTreeMap<ProcessId, Vec<(usize, Option<FrameIndex>)>>,
    /// Utilization percentage
    pub utilization: f64,
}

/// Paging memory manager
#[derive(Debug, Clone)]
pub struct PagingMemoryManager {
    /// Physical frames
    frames: FrameAllocator,
    /// Frame size in KB
    frame_size_kb: usize,
    /// Page tables by owner
    tables: BTreeMap<ProcessId, PageTable>,
}

impl PagingMemoryManager {
    /// Create manager with `total_frames` frames of `frame_size_kb` KB each.
    ///
    /// A zero frame size is rejected.
    pub fn new(total_frames: usize, frame_size_kb: usize) -> KernelResult<Self> {
        if frame_size_kb == 0 {
            return Err(KernelError::InvalidConfiguration(
                "frame size must be at least 1 KB".into(),
            ));
        }

        debug!(
            "Paging initialized: {} frames x {} KB = {} KB",
            total_frames,
            frame_size_kb,
            total_frames * frame_size_kb
        );

        Ok(Self {
            frames: FrameAllocator::new(total_frames),
            frame_size_kb,
            tables: BTreeMap::new(),
        })
    }

    /// Create manager from configuration
    pub fn from_config(config: &MemoryConfig) -> KernelResult<Self> {
        Self::new(config.total_frames, config.frame_size_kb)
    }

    /// Pages needed to hold `size_kb`
    pub fn pages_needed(&self, size_kb: usize) -> usize {
        size_kb.div_ceil(self.frame_size_kb)
    }

    /// Frame size in bytes
    pub fn frame_bytes(&self) -> u64 {
        self.frame_size_kb as u64 * KB
    }

    /// Allocate memory for a process, building its page table.
    ///
    /// Returns the number of pages mapped.
    pub fn allocate(&mut self, pid: ProcessId, size_kb: usize) -> KernelResult<usize> {
        if self.tables.contains_key(&pid) {
            return Err(KernelError::AlreadyAllocated(pid));
        }

        let pages = self.pages_needed(size_kb);
        let frames = self.frames.allocate(pid, pages)?;
        self.tables.insert(pid, PageTable::from_frames(&frames));

        debug!("Allocated {} pages ({} KB) to process {}: frames {:?}", pages, size_kb, pid, frames);

        Ok(pages)
    }

    /// Release all frames owned by a process.
    ///
    /// Returns the number of frames freed.
    pub fn deallocate(&mut self, pid: ProcessId) -> KernelResult<usize> {
        let mut table = self.tables.remove(&pid).ok_or(KernelError::UnknownProcess(pid))?;

        let mut freed = 0;
        for frame in table.mapped_frames() {
            match self.frames.deallocate(frame) {
                Ok(()) => freed += 1,
                Err(e) => warn!("Process {} page table referenced bad frame: {}", pid, e),
            }
        }
        table.clear();

        debug!("Released {} frames from process {}", freed, pid);

        Ok(freed)
    }

    /// Reclaim a victim's frames. Contents are discarded (no backing store).
    pub fn evict(&mut self, victim: ProcessId) -> KernelResult<usize> {
        if !self.tables.contains_key(&victim) {
            return Err(KernelError::SwapUnsupported(victim));
        }
        warn!("Evicting process {} from memory", victim);
        self.deallocate(victim)
    }

    /// Translate a logical address of `pid`
    pub fn translate(&self, pid: ProcessId, addr: LogicalAddr) -> KernelResult<PhysAddr> {
        let table = self.tables.get(&pid).ok_or(KernelError::UnknownProcess(pid))?;

        let frame_bytes = self.frame_bytes();
        let (page, offset) = addr.split(frame_bytes);
        let frame = table.lookup(page)?;

        Ok(PhysAddr::new(frame as u64 * frame_bytes + offset))
    }

    /// Check if a process owns a page table
    pub fn has_allocation(&self, pid: ProcessId) -> bool {
        self.tables.contains_key(&pid)
    }

    /// Get a process's page table
    pub fn page_table(&self, pid: ProcessId) -> Option<&PageTable> {
        self.tables.get(&pid)
    }

    /// Processes that currently own memory
    pub fn holders(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.tables.keys().copied()
    }

    /// Get number of free frames
    pub fn free_frames(&self) -> usize {
        self.frames.free_frames()
    }

    /// Get number of occupied frames
    pub fn occupied_frames(&self) -> usize {
        self.frames.occupied_frames()
    }

    /// Get total number of frames
    pub fn total_frames(&self) -> usize {
        self.frames.total_frames()
    }

    /// Frame size in KB
    pub fn frame_size_kb(&self) -> usize {
        self.frame_size_kb
    }

    /// Free memory in KB
    pub fn free_memory_kb(&self) -> usize {
        self.free_frames() * self.frame_size_kb
    }

    /// Total memory in KB
    pub fn total_memory_kb(&self) -> usize {
        self.total_frames() * self.frame_size_kb
    }

    /// Percentage of frames in use
    pub fn utilization(&self) -> f64 {
        if self.total_frames() == 0 {
            return 0.0;
        }
        self.occupied_frames() as f64 / self.total_frames() as f64 * 100.0
    }

    /// Snapshot of frame and page-table state
    pub fn status(&self) -> MemoryStatus {
        let occupied = self.frames.frames()
            .filter_map(|(index, frame)| Some((index, frame.owner?, frame.page?)))
            .collect();

        let page_tables = self.tables.iter()
            .map(|(pid, table)| (*pid, table.mappings()))
            .collect();

        MemoryStatus {
            total_frames: self.total_frames(),
            free_frames: self.free_frames(),
            frame_size_kb: self.frame_size_kb,
            occupied,
            page_tables,
            utilization: self.utilization(),
        }
    }
}
