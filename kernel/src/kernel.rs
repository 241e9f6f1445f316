//! Kernel Loop
//!
//! Each cycle drains pending interrupts into their handlers, then performs
//! one scheduling step. The timer thread only ever feeds the controller;
//! scheduler state is touched from this loop alone.

use crate::config::KernelConfig;
use crate::drivers::InterruptManager;
use crate::sys::{RunSummary, Scheduler, SchedulingPolicy, StepOutcome};
use crate::KernelResult;
use tracing::{debug, info, warn};

/// Kernel: scheduler plus interrupt subsystem
pub struct Kernel {
    /// Scheduler, resources and memory
    scheduler: Scheduler,
    /// Vector table, controller and timer
    interrupts: InterruptManager,
    /// Configuration
    config: KernelConfig,
    /// Cycles run
    cycles: usize,
}

impl Kernel {
    /// Create kernel from a validated configuration
    pub fn new(config: KernelConfig) -> KernelResult<Self> {
        config.validate()?;

        Ok(Self {
            scheduler: Scheduler::from_config(&config)?,
            interrupts: InterruptManager::new(config.timer.interval),
            config,
            cycles: 0,
        })
    }

    /// Create the configured workload and start the timer
    pub fn boot(&mut self) -> KernelResult<()> {
        for spec in self.config.workload.clone() {
            self.scheduler.create_process(spec)?;
        }

        if self.config.timer.enabled {
            self.interrupts.enable_timer(self.config.timer.interval)?;
        }

        info!(
            "{} v{} booted: {} processes, {} frames x {} KB",
            crate::NAME,
            crate::VERSION,
            self.scheduler.process_count(),
            self.config.memory.total_frames,
            self.config.memory.frame_size_kb
        );

        Ok(())
    }

    /// Drain interrupts, then take one scheduling step
    pub fn run_cycle(&mut self, policy: SchedulingPolicy) -> KernelResult<StepOutcome> {
        let handled = self.process_interrupts();
        self.cycles += 1;

        let outcome = self.scheduler.interactive_scheduler(policy)?;
        debug!("Cycle {}: {} interrupts, {:?}", self.cycles, handled, outcome);

        Ok(outcome)
    }

    /// Run cycles until no work remains or the cycle cap is reached
    pub fn run(&mut self, policy: SchedulingPolicy) -> KernelResult<RunSummary> {
        info!("Kernel loop starting ({})", policy);

        let mut completed = Vec::new();

        while self.cycles < self.config.timer.max_cycles {
            match self.run_cycle(policy)? {
                StepOutcome::Finished => break,
                StepOutcome::Completed { pid, finished_at } => completed.push((pid, finished_at)),
                StepOutcome::Blocked { .. } | StepOutcome::Idle { .. } => {}
            }

            if !self.config.timer.cycle_pause.is_zero() {
                std::thread::sleep(self.config.timer.cycle_pause);
            }
        }

        if self.scheduler.has_processes() {
            warn!(
                "Cycle cap {} reached with {} processes pending",
                self.config.timer.max_cycles,
                self.scheduler.process_count()
            );
        }

        Ok(RunSummary {
            steps: self.scheduler.steps_taken(),
            final_time: self.scheduler.now(),
            completed,
        })
    }

    /// Dispatch pending interrupts. Returns the number dispatched.
    pub fn process_interrupts(&mut self) -> usize {
        self.interrupts.process_all_interrupts(&mut self.scheduler)
    }

    /// Stop the timer, waiting for its thread to exit
    pub fn shutdown(&mut self) {
        if self.interrupts.is_timer_enabled() {
            self.interrupts.disable_timer();
            info!("Kernel shut down after {} cycles", self.cycles);
        }
    }

    /// Get the scheduler
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Get the scheduler mutably
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Get the interrupt subsystem
    pub fn interrupts(&self) -> &InterruptManager {
        &self.interrupts
    }

    /// Get the interrupt subsystem mutably
    pub fn interrupts_mut(&mut self) -> &mut InterruptManager {
        &mut self.interrupts
    }

    /// Get the configuration
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Cycles run
    pub fn cycles(&self) -> usize {
        self.cycles
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
