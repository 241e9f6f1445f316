//! Resource Management
//!
//! Finite pools (CPU, Disk, Printer) plus memory delegated to the paging
//! manager. Requests are all-or-nothing: every pool is checked before any
//! is debited. A process that cannot be served is parked on the semaphore
//! of the first resource that came up short.

use super::process::{Process, ProcessId};
use super::semaphore::Semaphore;
use crate::config::ResourceConfig;
use crate::mm::{NoVictim, PagingMemoryManager, VictimSelector};
use crate::{KernelError, KernelResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Resource pool names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Processor
    Cpu,
    /// Physical memory (paging manager)
    Memory,
    /// Disk
    Disk,
    /// Printer
    Printer,
}

impl ResourceKind {
    /// All resource kinds, in reporting order
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Cpu,
        ResourceKind::Memory,
        ResourceKind::Disk,
        ResourceKind::Printer,
    ];
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Cpu => write!(f, "CPU"),
            ResourceKind::Memory => write!(f, "Memory"),
            ResourceKind::Disk => write!(f, "Disk"),
            ResourceKind::Printer => write!(f, "Printer"),
        }
    }
}

/// A counted resource pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePool {
    /// Pool name
    pub kind: ResourceKind,
    /// Capacity
    pub total: u32,
    /// Units not granted
    pub available: u32,
}

impl ResourcePool {
    /// Create a full pool
    pub fn new(kind: ResourceKind, total: u32) -> Self {
        Self { kind, total, available: total }
    }

    /// Check if `amount` units can be granted
    pub fn can_take(&self, amount: u32) -> bool {
        self.available >= amount
    }

    /// Debit `amount` units
    pub fn take(&mut self, amount: u32) -> KernelResult<()> {
        if !self.can_take(amount) {
            return Err(KernelError::InsufficientResource(self.kind));
        }
        self.available -= amount;
        Ok(())
    }

    /// Credit `amount` units, never beyond capacity
    pub fn give(&mut self, amount: u32) {
        let restored = self.available.saturating_add(amount);
        if restored > self.total {
            warn!("{} pool over-released: {} > {}", self.kind, restored, self.total);
        }
        self.available = restored.min(self.total);
    }
}

/// Pool status snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    /// Pool name
    pub kind: ResourceKind,
    /// Capacity (KB for memory)
    pub total: u64,
    /// Available (KB for memory)
    pub available: u64,
    /// Semaphore counter
    pub semaphore: i64,
    /// Processes parked on the semaphore
    pub waiting: usize,
}

/// Aggregate demand of a set of processes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceDemand {
    /// CPUs
    pub cpu: u64,
    /// Memory in KB
    pub memory_kb: u64,
    /// Disks
    pub disk: u64,
    /// Printers
    pub printer: u64,
}

impl ResourceDemand {
    /// Add one process's requirements
    pub fn add(&mut self, process: &Process) {
        for (kind, amount) in process.required_resources() {
            match kind {
                ResourceKind::Cpu => self.cpu += amount,
                ResourceKind::Memory => self.memory_kb += amount,
                ResourceKind::Disk => self.disk += amount,
                ResourceKind::Printer => self.printer += amount,
            }
        }
    }
}

/// Result of a resource request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Everything granted
    Granted,
    /// Parked on this resource's semaphore
    Blocked(ResourceKind),
}

/// Resource manager
pub struct ResourceManager {
    /// Counted pools (memory excluded)
    pools: BTreeMap<ResourceKind, ResourcePool>,
    /// One semaphore per resource, memory included
    semaphores: BTreeMap<ResourceKind, Semaphore>,
    /// Pool grants held per process
    ledger: HashMap<ProcessId, Vec<(ResourceKind, u32)>>,
    /// KB requested by processes parked on the memory semaphore
    memory_waits: HashMap<ProcessId, usize>,
    /// Paging memory manager
    memory: PagingMemoryManager,
    /// Page-replacement hook
    victim_selector: Box<dyn VictimSelector>,
}

impl ResourceManager {
    /// Create manager with configured pool sizes
    pub fn new(config: &ResourceConfig, memory: PagingMemoryManager) -> Self {
        let pools = [
            ResourcePool::new(ResourceKind::Cpu, config.cpu),
            ResourcePool::new(ResourceKind::Disk, config.disk),
            ResourcePool::new(ResourceKind::Printer, config.printer),
        ]
        .into_iter()
        .map(|pool| (pool.kind, pool))
        .collect();

        let semaphores = ResourceKind::ALL
            .into_iter()
            .map(|kind| (kind, Semaphore::new(kind)))
            .collect();

        Self {
            pools,
            semaphores,
            ledger: HashMap::new(),
            memory_waits: HashMap::new(),
            memory,
            victim_selector: Box::new(NoVictim),
        }
    }

    /// Install a page-replacement hook
    pub fn set_victim_selector(&mut self, selector: Box<dyn VictimSelector>) {
        self.victim_selector = selector;
    }

    /// Get the paging manager
    pub fn memory(&self) -> &PagingMemoryManager {
        &self.memory
    }

    /// Get the paging manager mutably
    pub fn memory_mut(&mut self) -> &mut PagingMemoryManager {
        &mut self.memory
    }

    /// Request everything `process` needs.
    ///
    /// Memory first (with one eviction retry), then the pools atomically.
    /// Memory obtained here is kept even if a pool comes up short.
    pub fn request_resources(&mut self, process: &Process) -> RequestOutcome {
        let pid = process.id;

        if self.ledger.contains_key(&pid) {
            debug!("Process {} already holds its resources", pid);
            return RequestOutcome::Granted;
        }

        if process.memory_kb > 0 && !self.memory.has_allocation(pid) {
            if let Err(e) = self.memory.allocate(pid, process.memory_kb) {
                debug!("Memory allocation for process {} failed: {}", pid, e);
                if !self.handle_memory_shortage(process) {
                    self.park(pid, ResourceKind::Memory);
                    self.memory_waits.insert(pid, process.memory_kb);
                    return RequestOutcome::Blocked(ResourceKind::Memory);
                }
            }
        }

        let demand = process.pool_demand();
        if let Some(short) = self.first_shortage(&demand) {
            debug!("Process {} short of {}", pid, short);
            self.park(pid, short);
            return RequestOutcome::Blocked(short);
        }

        for &(kind, amount) in &demand {
            if let Some(pool) = self.pools.get_mut(&kind) {
                if let Err(e) = pool.take(amount) {
                    warn!("Pool changed between check and commit: {}", e);
                }
            }
            debug!("Allocated {} {} to process {}", amount, kind, pid);
        }
        self.ledger.insert(pid, demand);
        self.forget(pid);

        RequestOutcome::Granted
    }

    /// Check, without allocating, whether a request would be granted now
    pub fn can_satisfy(&self, process: &Process) -> bool {
        if self.ledger.contains_key(&process.id) {
            return true;
        }

        let memory_ok = process.memory_kb == 0
            || self.memory.has_allocation(process.id)
            || self.memory.pages_needed(process.memory_kb) <= self.memory.free_frames();

        memory_ok && self.first_shortage(&process.pool_demand()).is_none()
    }

    /// Release memory and every ledgered grant of `pid`.
    ///
    /// The memory semaphore wakes its head waiter only once enough frames
    /// are free to cover that waiter's request.
    ///
    /// Returns processes woken from the semaphores, in wake order.
    pub fn release_resources(&mut self, pid: ProcessId) -> Vec<ProcessId> {
        let mut woken = Vec::new();

        match self.memory.deallocate(pid) {
            Ok(freed) if freed > 0 => woken.extend(self.wake_memory_waiter()),
            Ok(_) => {}
            Err(e) => debug!("No memory to release for process {}: {}", pid, e),
        }

        if let Some(grants) = self.ledger.remove(&pid) {
            for (kind, amount) in grants {
                if let Some(pool) = self.pools.get_mut(&kind) {
                    pool.give(amount);
                }
                debug!("Released {} {} from process {}", amount, kind, pid);
                woken.extend(self.wake(kind));
            }
        }

        woken.dedup();
        woken
    }

    /// Drop `pid` from every wait queue
    pub fn forget(&mut self, pid: ProcessId) {
        for sem in self.semaphores.values_mut() {
            sem.cancel(pid);
        }
        self.memory_waits.remove(&pid);
    }

    /// Check if `pid` holds pool grants
    pub fn holds(&self, pid: ProcessId) -> bool {
        self.ledger.contains_key(&pid)
    }

    /// Pool grants held by `pid`
    pub fn allocations(&self, pid: ProcessId) -> Option<&[(ResourceKind, u32)]> {
        self.ledger.get(&pid).map(Vec::as_slice)
    }

    /// Get a pool
    pub fn pool(&self, kind: ResourceKind) -> Option<&ResourcePool> {
        self.pools.get(&kind)
    }

    /// Get a semaphore
    pub fn semaphore(&self, kind: ResourceKind) -> Option<&Semaphore> {
        self.semaphores.get(&kind)
    }

    /// Status of every resource, memory reported in KB
    pub fn status(&self) -> Vec<PoolStatus> {
        ResourceKind::ALL
            .into_iter()
            .map(|kind| {
                let (total, available) = match kind {
                    ResourceKind::Memory => (
                        self.memory.total_memory_kb() as u64,
                        self.memory.free_memory_kb() as u64,
                    ),
                    _ => self.pools
                        .get(&kind)
                        .map(|p| (p.total as u64, p.available as u64))
                        .unwrap_or((0, 0)),
                };
                let (semaphore, waiting) = self.semaphores
                    .get(&kind)
                    .map(|s| (s.value(), s.waiters().count()))
                    .unwrap_or((0, 0));

                PoolStatus { kind, total, available, semaphore, waiting }
            })
            .collect()
    }

    fn first_shortage(&self, demand: &[(ResourceKind, u32)]) -> Option<ResourceKind> {
        demand.iter()
            .find(|(kind, amount)| {
                self.pools.get(kind).map_or(true, |pool| !pool.can_take(*amount))
            })
            .map(|(kind, _)| *kind)
    }

    fn handle_memory_shortage(&mut self, process: &Process) -> bool {
        let candidates: Vec<ProcessId> = self.memory
            .holders()
            .filter(|&holder| holder != process.id && !self.ledger.contains_key(&holder))
            .collect();

        let Some(victim) = self.victim_selector.select_victim(&self.memory, &candidates) else {
            debug!("No eviction victim for process {}", process.id);
            return false;
        };

        if !candidates.contains(&victim) {
            warn!("Victim selector chose ineligible process {}", victim);
            return false;
        }

        if let Err(e) = self.memory.evict(victim) {
            warn!("Eviction of process {} failed: {}", victim, e);
            return false;
        }

        match self.memory.allocate(process.id, process.memory_kb) {
            Ok(_) => {
                debug!("Process {} allocated after evicting {}", process.id, victim);
                true
            }
            Err(e) => {
                debug!("Process {} still cannot allocate after eviction: {}", process.id, e);
                false
            }
        }
    }

    fn park(&mut self, pid: ProcessId, kind: ResourceKind) {
        if let Some(sem) = self.semaphores.get_mut(&kind) {
            sem.wait(pid);
        }
    }

    fn wake(&mut self, kind: ResourceKind) -> Option<ProcessId> {
        self.semaphores.get_mut(&kind)?.signal()
    }

    fn wake_memory_waiter(&mut self) -> Option<ProcessId> {
        let head = self.semaphores.get(&ResourceKind::Memory)?.waiters().next()?;
        let wanted = self.memory_waits.get(&head).copied().unwrap_or(0);
        if self.memory.pages_needed(wanted) > self.memory.free_frames() {
            debug!(
                "Process {} still waits for memory: {} KB wanted, {} KB free",
                head,
                wanted,
                self.memory.free_memory_kb()
            );
            return None;
        }

        let woken = self.wake(ResourceKind::Memory)?;
        self.memory_waits.remove(&woken);
        Some(woken)
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("pools", &self.pools)
            .field("ledger", &self.ledger)
            .field("memory_free_frames", &self.memory.free_frames())
            .finish()
    }
}
