//! Resource Semaphores
//!
//! One semaphore per resource pool. The counter starts at zero and only
//! goes negative while processes wait: `value == -(waiters)`. A signal
//! with nobody waiting is dropped rather than stored.

use super::process::ProcessId;
use super::resource::ResourceKind;
use std::collections::VecDeque;
use tracing::debug;

/// Counting semaphore with a FIFO wait queue
#[derive(Debug, Clone)]
pub struct Semaphore {
    /// Pool this semaphore guards
    kind: ResourceKind,
    /// Counter
    value: i64,
    /// Parked processes, oldest first
    waiters: VecDeque<ProcessId>,
}

impl Semaphore {
    /// Create semaphore with an empty wait queue
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            value: 0,
            waiters: VecDeque::new(),
        }
    }

    /// P: park `pid` on the queue. A process already queued is not added twice.
    pub fn wait(&mut self, pid: ProcessId) {
        if self.waiters.contains(&pid) {
            return;
        }
        self.value -= 1;
        self.waiters.push_back(pid);
        debug!("Process {} blocked waiting for {}", pid, self.kind);
    }

    /// V: wake the oldest waiter, if any
    pub fn signal(&mut self) -> Option<ProcessId> {
        let pid = self.waiters.pop_front()?;
        self.value += 1;
        debug!("Process {} woken up for {}", pid, self.kind);
        Some(pid)
    }

    /// Remove `pid` from the queue without waking anyone
    pub fn cancel(&mut self, pid: ProcessId) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|&w| w != pid);
        let removed = before - self.waiters.len();
        self.value += removed as i64;
        removed > 0
    }

    /// Get counter value
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Pool guarded by this semaphore
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Check if anyone is waiting
    pub fn has_waiters(&self) -> bool {
        !self.waiters.is_empty()
    }

    /// Get the waiters in wake order
    pub fn waiters(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.waiters.iter().copied()
    }

    /// Check if `pid` is waiting here
    pub fn is_waiting(&self, pid: ProcessId) -> bool {
        self.waiters.contains(&pid)
    }
}
