//! Scheduler
//!
//! Non-preemptive scheduler over an arena of processes with four queues:
//! - New: created, arrival time not reached
//! - Ready: arrived, waiting for selection
//! - Blocked: waiting on a resource semaphore or I/O completion
//! - Running: resources granted
//!
//! # Scheduling Step
//!
//! 1. Admit arrivals (New -> Ready)
//! 2. Select a Ready process by policy (FCFS, SRTF or HRRN)
//! 3. Request its resources; granted -> Running, short -> Blocked
//! 4. Run it to completion (`now += remaining`), release, terminate
//! 5. Re-offer resources to Blocked processes
//!
//! With nothing selectable but work remaining, the clock advances one
//! tick instead. A step bound turns probable livelock into an error.

use super::process::{BlockReason, Process, ProcessId, ProcessSpec, ProcessState};
use super::resource::{PoolStatus, RequestOutcome, ResourceDemand, ResourceKind, ResourceManager};
use crate::config::{KernelConfig, SchedulerConfig};
use crate::mm::{LogicalAddr, MemoryStatus, PagingMemoryManager, PhysAddr, VictimSelector};
use crate::{KernelError, KernelResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use tracing::{debug, error, info, trace, warn};

/// Selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingPolicy {
    /// First come, first served: earliest arrival
    #[default]
    Fcfs,
    /// Shortest remaining time first
    Srtf,
    /// Highest response ratio next
    Hrrn,
}

impl std::fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingPolicy::Fcfs => write!(f, "FCFS"),
            SchedulingPolicy::Srtf => write!(f, "SRTF"),
            SchedulingPolicy::Hrrn => write!(f, "HRRN"),
        }
    }
}

impl FromStr for SchedulingPolicy {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fcfs" => Ok(SchedulingPolicy::Fcfs),
            "srtf" => Ok(SchedulingPolicy::Srtf),
            "hrrn" => Ok(SchedulingPolicy::Hrrn),
            other => Err(KernelError::InvalidConfiguration(format!(
                "unknown scheduling policy: {}",
                other
            ))),
        }
    }
}

/// What a single scheduling step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A process ran to completion and was terminated
    Completed {
        /// Finished process
        pid: ProcessId,
        /// Clock after completion
        finished_at: u64,
    },
    /// The selected process could not get its resources
    Blocked {
        /// Process moved to Blocked
        pid: ProcessId,
        /// Resource it waits on
        on: ResourceKind,
    },
    /// Nothing selectable; the clock advanced one tick
    Idle {
        /// Clock after the tick
        now: u64,
    },
    /// No live processes remain
    Finished,
}

/// Result of a batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps taken
    pub steps: usize,
    /// Clock when the run finished
    pub final_time: u64,
    /// Completion order with finish times
    pub completed: Vec<(ProcessId, u64)>,
}

/// Scheduler
pub struct Scheduler {
    /// Live processes by pid
    processes: HashMap<ProcessId, Process>,
    /// Not yet arrived
    new_queue: VecDeque<ProcessId>,
    /// Arrived, waiting for selection
    ready_queue: VecDeque<ProcessId>,
    /// Waiting on a semaphore or I/O
    blocked_queue: VecDeque<ProcessId>,
    /// Holding resources
    running_queue: VecDeque<ProcessId>,
    /// Resource pools and memory
    resources: ResourceManager,
    /// Simulated clock
    now: u64,
    /// Step bound for a run
    max_steps: usize,
    /// Steps taken since the last batch run started
    steps: usize,
    /// Timer interrupts observed
    timer_ticks: u64,
}

impl Scheduler {
    /// Create scheduler over a resource manager
    pub fn new(resources: ResourceManager, config: &SchedulerConfig) -> Self {
        Self {
            processes: HashMap::new(),
            new_queue: VecDeque::new(),
            ready_queue: VecDeque::new(),
            blocked_queue: VecDeque::new(),
            running_queue: VecDeque::new(),
            resources,
            now: 0,
            max_steps: config.max_steps,
            steps: 0,
            timer_ticks: 0,
        }
    }

    /// Create scheduler, resource manager and paging from configuration
    pub fn from_config(config: &KernelConfig) -> KernelResult<Self> {
        let memory = PagingMemoryManager::from_config(&config.memory)?;
        let resources = ResourceManager::new(&config.resources, memory);
        Ok(Self::new(resources, &config.scheduler))
    }

    // ========== Lifecycle ==========

    /// Create a process.
    ///
    /// Memory is allocated opportunistically; failure leaves the process to
    /// compete for memory when it is scheduled.
    pub fn create_process(&mut self, spec: ProcessSpec) -> KernelResult<ProcessId> {
        let pid = spec.pid;
        if self.processes.contains_key(&pid) {
            return Err(KernelError::ProcessAlreadyExists(pid));
        }

        let process = Process::new(spec);
        if process.memory_kb > 0 {
            if let Err(e) = self.resources.memory_mut().allocate(pid, process.memory_kb) {
                warn!("Process {}: deferred memory allocation ({})", pid, e);
            }
        }

        let state = if process.has_arrived(self.now) {
            ProcessState::Ready
        } else {
            ProcessState::New
        };
        self.processes.insert(pid, process);
        self.transition(pid, state);

        info!("Process {} created ({:?})", pid, state);

        Ok(pid)
    }

    /// Move every arrived New process to Ready. Returns how many moved.
    pub fn check_arriving_processes(&mut self) -> usize {
        let arrived: Vec<ProcessId> = self.new_queue
            .iter()
            .copied()
            .filter(|pid| self.processes.get(pid).is_some_and(|p| p.has_arrived(self.now)))
            .collect();

        for &pid in &arrived {
            debug!("Process {} arrived at {}", pid, self.now);
            self.transition(pid, ProcessState::Ready);
        }
        arrived.len()
    }

    /// Pick the policy-preferred arrived Ready process.
    ///
    /// Ties go to the process nearest the front of the Ready queue.
    pub fn select_process(&self, policy: SchedulingPolicy) -> KernelResult<Option<ProcessId>> {
        let candidates = self.ready_queue
            .iter()
            .filter_map(|pid| self.processes.get(pid))
            .filter(|p| p.has_arrived(self.now));

        let selected = match policy {
            SchedulingPolicy::Fcfs => candidates.min_by_key(|p| p.arrival_time).map(|p| p.id),
            SchedulingPolicy::Srtf => candidates.min_by_key(|p| p.remaining_runtime).map(|p| p.id),
            SchedulingPolicy::Hrrn => {
                let mut best: Option<(ProcessId, f64)> = None;
                for p in candidates {
                    let ratio = p.response_ratio(self.now)?;
                    if best.map_or(true, |(_, top)| ratio > top) {
                        best = Some((p.id, ratio));
                    }
                }
                best.map(|(pid, _)| pid)
            }
        };

        trace!("{} selected {:?} at {}", policy, selected, self.now);

        Ok(selected)
    }

    /// Request resources for a Ready process.
    ///
    /// Returns `true` if it is now Running, `false` if it was Blocked.
    pub fn schedule_process(&mut self, pid: ProcessId) -> KernelResult<bool> {
        let process = self.processes.get(&pid).ok_or(KernelError::UnknownProcess(pid))?;
        if process.state != ProcessState::Ready {
            return Err(KernelError::InvalidState { pid, state: process.state });
        }

        match self.resources.request_resources(process) {
            RequestOutcome::Granted => {
                self.transition(pid, ProcessState::Running);
                debug!("Process {} running", pid);
                Ok(true)
            }
            RequestOutcome::Blocked(kind) => {
                self.block(pid, BlockReason::Resource(kind));
                debug!("Process {} blocked on {}", pid, kind);
                Ok(false)
            }
        }
    }

    /// Run a Running process to completion and terminate it.
    ///
    /// Returns the clock after completion.
    pub fn complete_process(&mut self, pid: ProcessId) -> KernelResult<u64> {
        let process = self.processes.get_mut(&pid).ok_or(KernelError::UnknownProcess(pid))?;
        if process.state != ProcessState::Running {
            return Err(KernelError::InvalidState { pid, state: process.state });
        }

        self.now = self.now.saturating_add(process.remaining_runtime);
        process.remaining_runtime = 0;

        info!("Process {} completed at {}", pid, self.now);

        self.terminate_process(pid)?;
        Ok(self.now)
    }

    /// Release everything a process holds and drop its record.
    ///
    /// Processes woken from resource semaphores move to Ready without
    /// re-checking the other pools. A memory waiter is only woken once its
    /// own request fits.
    pub fn terminate_process(&mut self, pid: ProcessId) -> KernelResult<()> {
        if !self.processes.contains_key(&pid) {
            return Err(KernelError::UnknownProcess(pid));
        }

        self.resources.forget(pid);
        let woken = self.resources.release_resources(pid);

        self.transition(pid, ProcessState::Terminated);
        self.processes.remove(&pid);

        for waiter in woken {
            let waiting_on_resource = self.processes
                .get(&waiter)
                .is_some_and(|p| matches!(p.blocked_on, Some(BlockReason::Resource(_))));
            if waiting_on_resource {
                debug!("Process {} woken by termination of {}", waiter, pid);
                self.transition(waiter, ProcessState::Ready);
            }
        }

        info!("Process {} terminated", pid);

        Ok(())
    }

    /// Move every resource-blocked process that could now be granted back to
    /// Ready, in Blocked queue order. I/O waiters are left alone.
    pub fn check_blocked_processes(&mut self) -> Vec<ProcessId> {
        let blocked: Vec<ProcessId> = self.blocked_queue.iter().copied().collect();
        let mut readied = Vec::new();

        for pid in blocked {
            let Some(process) = self.processes.get(&pid) else {
                continue;
            };
            if process.is_waiting_io() || !self.resources.can_satisfy(process) {
                continue;
            }

            self.resources.forget(pid);
            self.transition(pid, ProcessState::Ready);
            debug!("Process {} unblocked", pid);
            readied.push(pid);
        }

        readied
    }

    /// Park a Ready process until the next I/O completion
    pub fn park_for_io(&mut self, pid: ProcessId) -> KernelResult<()> {
        let process = self.processes.get(&pid).ok_or(KernelError::UnknownProcess(pid))?;
        if process.state != ProcessState::Ready {
            return Err(KernelError::InvalidState { pid, state: process.state });
        }

        self.block(pid, BlockReason::Io);
        debug!("Process {} waiting for I/O", pid);
        Ok(())
    }

    /// Return every I/O waiter to Ready
    pub fn wake_io_waiting_processes(&mut self) -> Vec<ProcessId> {
        let waiting: Vec<ProcessId> = self.blocked_queue
            .iter()
            .copied()
            .filter(|pid| self.processes.get(pid).is_some_and(Process::is_waiting_io))
            .collect();

        for &pid in &waiting {
            self.transition(pid, ProcessState::Ready);
            debug!("Process {} I/O complete", pid);
        }
        waiting
    }

    /// Timer hook: count the tick, admit arrivals, re-offer resources
    pub fn on_timer_tick(&mut self) {
        self.timer_ticks += 1;
        let arrived = self.check_arriving_processes();
        let unblocked = self.check_blocked_processes();
        trace!(
            "Timer tick {}: {} arrived, {} unblocked",
            self.timer_ticks,
            arrived,
            unblocked.len()
        );
    }

    /// Advance the simulated clock
    pub fn advance_time(&mut self, ticks: u64) {
        self.now = self.now.saturating_add(ticks);
    }

    // ========== Run Loops ==========

    /// One scheduling step, counted against the step bound
    pub fn step(&mut self, policy: SchedulingPolicy) -> KernelResult<StepOutcome> {
        self.check_arriving_processes();

        if !self.has_processes() {
            return Ok(StepOutcome::Finished);
        }

        if self.steps >= self.max_steps {
            let pending = self.process_count();
            error!(
                "Aborting after {} steps with {} processes pending (probable livelock)",
                self.steps, pending
            );
            return Err(KernelError::StepLimitExceeded { steps: self.steps, pending });
        }
        self.steps += 1;

        // Left Running by a direct schedule_process call
        if let Some(&pid) = self.running_queue.front() {
            let finished_at = self.complete_process(pid)?;
            self.check_blocked_processes();
            return Ok(StepOutcome::Completed { pid, finished_at });
        }

        let Some(pid) = self.select_process(policy)? else {
            self.advance_time(1);
            self.check_blocked_processes();
            return Ok(StepOutcome::Idle { now: self.now });
        };

        if self.schedule_process(pid)? {
            let finished_at = self.complete_process(pid)?;
            self.check_blocked_processes();
            Ok(StepOutcome::Completed { pid, finished_at })
        } else {
            let on = match self.processes.get(&pid).and_then(|p| p.blocked_on) {
                Some(BlockReason::Resource(kind)) => kind,
                _ => ResourceKind::Cpu,
            };
            Ok(StepOutcome::Blocked { pid, on })
        }
    }

    /// Run until no process remains
    pub fn run_scheduler(&mut self, policy: SchedulingPolicy) -> KernelResult<RunSummary> {
        info!("Running scheduler ({}) with {} processes", policy, self.process_count());

        self.steps = 0;
        let mut completed = Vec::new();

        loop {
            match self.step(policy)? {
                StepOutcome::Completed { pid, finished_at } => completed.push((pid, finished_at)),
                StepOutcome::Finished => break,
                StepOutcome::Blocked { .. } | StepOutcome::Idle { .. } => {}
            }
        }

        info!("Scheduler finished at {} after {} steps", self.now, self.steps);

        Ok(RunSummary {
            steps: self.steps,
            final_time: self.now,
            completed,
        })
    }

    /// Exactly one step; the caller paces successive calls
    pub fn interactive_scheduler(&mut self, policy: SchedulingPolicy) -> KernelResult<StepOutcome> {
        self.step(policy)
    }

    // ========== Queries ==========

    /// Get a live process
    pub fn process(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(&pid)
    }

    /// Processes not yet arrived
    pub fn list_new(&self) -> Vec<Process> {
        self.snapshot(&self.new_queue)
    }

    /// Ready processes in queue order
    pub fn list_ready(&self) -> Vec<Process> {
        self.snapshot(&self.ready_queue)
    }

    /// Blocked processes in queue order
    pub fn list_blocked(&self) -> Vec<Process> {
        self.snapshot(&self.blocked_queue)
    }

    /// Running processes
    pub fn list_running(&self) -> Vec<Process> {
        self.snapshot(&self.running_queue)
    }

    /// Number of live processes
    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    /// Check if any process is live
    pub fn has_processes(&self) -> bool {
        !self.processes.is_empty()
    }

    /// Check if any process has not arrived yet
    pub fn has_new_processes(&self) -> bool {
        !self.new_queue.is_empty()
    }

    /// Simulated clock
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Timer interrupts observed
    pub fn timer_ticks(&self) -> u64 {
        self.timer_ticks
    }

    /// Steps taken since the last batch run started
    pub fn steps_taken(&self) -> usize {
        self.steps
    }

    /// Pool status, memory included
    pub fn resource_pool_status(&self) -> Vec<PoolStatus> {
        self.resources.status()
    }

    /// Percentage of frames in use
    pub fn memory_utilization(&self) -> f64 {
        self.resources.memory().utilization()
    }

    /// Frame and page-table snapshot
    pub fn memory_status(&self) -> MemoryStatus {
        self.resources.memory().status()
    }

    /// Total demand of all live processes
    pub fn resource_demand(&self) -> ResourceDemand {
        let mut demand = ResourceDemand::default();
        for process in self.processes.values() {
            demand.add(process);
        }
        demand
    }

    /// Translate a logical address of a process
    pub fn translate(&self, pid: ProcessId, addr: LogicalAddr) -> KernelResult<PhysAddr> {
        self.resources.memory().translate(pid, addr)
    }

    /// Get the resource manager
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Install a page-replacement hook
    pub fn set_victim_selector(&mut self, selector: Box<dyn VictimSelector>) {
        self.resources.set_victim_selector(selector);
    }

    // ========== Internals ==========

    fn snapshot(&self, queue: &VecDeque<ProcessId>) -> Vec<Process> {
        queue.iter().filter_map(|pid| self.processes.get(pid)).cloned().collect()
    }

    fn block(&mut self, pid: ProcessId, reason: BlockReason) {
        self.transition(pid, ProcessState::Blocked);
        if let Some(process) = self.processes.get_mut(&pid) {
            process.blocked_on = Some(reason);
        }
    }

    /// Set state and move the pid to the matching queue
    fn transition(&mut self, pid: ProcessId, state: ProcessState) {
        for queue in [
            &mut self.new_queue,
            &mut self.ready_queue,
            &mut self.blocked_queue,
            &mut self.running_queue,
        ] {
            queue.retain(|&p| p != pid);
        }

        match state {
            ProcessState::New => self.new_queue.push_back(pid),
            ProcessState::Ready => self.ready_queue.push_back(pid),
            ProcessState::Blocked => self.blocked_queue.push_back(pid),
            ProcessState::Running => self.running_queue.push_back(pid),
            ProcessState::Terminated => {}
        }

        if let Some(process) = self.processes.get_mut(&pid) {
            process.state = state;
            if state != ProcessState::Blocked {
                process.blocked_on = None;
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now)
            .field("new", &self.new_queue)
            .field("ready", &self.ready_queue)
            .field("blocked", &self.blocked_queue)
            .field("running", &self.running_queue)
            .finish()
    }
}
