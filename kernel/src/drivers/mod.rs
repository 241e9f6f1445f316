//! Interrupt Subsystem
//!
//! - Interrupts: vector table and pending-interrupt controller
//! - Timer: background periodic interrupt source
//!
//! [`InterruptManager`] bundles the three. It is constructed explicitly and
//! owned by the kernel loop.

pub mod interrupts;
pub mod timer;

pub use interrupts::{
    FnHandler, InterruptContext, InterruptController, InterruptHandler, InterruptType, VectorTable,
    INTERRUPT_COUNT,
};
pub use timer::Timer;

use crate::sys::Scheduler;
use crate::KernelResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Vector table, controller and timer
pub struct InterruptManager {
    /// Pending interrupts, shared with the timer thread
    controller: Arc<InterruptController>,
    /// Installed handlers
    vectors: VectorTable,
    /// Periodic source
    timer: Timer,
}

impl InterruptManager {
    /// Create manager with default handlers and a stopped timer
    pub fn new(timer_interval: Duration) -> Self {
        Self {
            controller: Arc::new(InterruptController::new()),
            vectors: VectorTable::with_defaults(),
            timer: Timer::new(timer_interval),
        }
    }

    /// Install a handler
    pub fn register_handler<H>(&mut self, kind: InterruptType, handler: H)
    where
        H: InterruptHandler + 'static,
    {
        self.vectors.register(kind, Box::new(handler));
    }

    /// Install a closure handler
    pub fn register_fn<F>(&mut self, kind: InterruptType, f: F)
    where
        F: FnMut(&mut InterruptContext<'_>) + Send + 'static,
    {
        self.register_handler(kind, FnHandler::new(f));
    }

    /// Install a handler by vector number
    pub fn register_handler_raw<H>(&mut self, tag: u8, handler: H) -> KernelResult<()>
    where
        H: InterruptHandler + 'static,
    {
        let kind = InterruptType::try_from(tag)?;
        self.register_handler(kind, handler);
        Ok(())
    }

    /// Queue an interrupt
    pub fn trigger_interrupt(&self, kind: InterruptType) {
        self.controller.trigger(kind);
    }

    /// Queue an interrupt by vector number
    pub fn trigger_raw(&self, tag: u8) -> KernelResult<()> {
        self.controller.trigger_raw(tag)
    }

    /// Dispatch everything pending. Returns the number dispatched.
    pub fn process_all_interrupts(&mut self, scheduler: &mut Scheduler) -> usize {
        self.controller.process_all(&mut self.vectors, scheduler)
    }

    /// Number of queued interrupts
    pub fn pending_interrupts(&self) -> usize {
        self.controller.pending_count()
    }

    /// Controller handle, for raising interrupts from other threads
    pub fn controller(&self) -> Arc<InterruptController> {
        Arc::clone(&self.controller)
    }

    /// Start the timer with the given period
    pub fn enable_timer(&mut self, interval: Duration) -> KernelResult<()> {
        if self.timer.is_running() {
            self.timer.stop();
        }
        self.timer.set_interval(interval);
        self.timer.start(Arc::clone(&self.controller))
    }

    /// Stop the timer, waiting for its thread to exit
    pub fn disable_timer(&mut self) {
        self.timer.stop();
    }

    /// Change the timer period, restarting it if running
    pub fn set_timer_interval(&mut self, interval: Duration) -> KernelResult<()> {
        if self.timer.is_running() {
            info!("Restarting timer with {:?} interval", interval);
            self.enable_timer(interval)
        } else {
            self.timer.set_interval(interval);
            Ok(())
        }
    }

    /// Check if the timer is running
    pub fn is_timer_enabled(&self) -> bool {
        self.timer.is_running()
    }

    /// Timer period
    pub fn timer_interval(&self) -> Duration {
        self.timer.interval()
    }

    /// Timer interrupts raised so far
    pub fn timer_ticks(&self) -> u64 {
        self.timer.ticks()
    }
}

impl Drop for InterruptManager {
    fn drop(&mut self) {
        self.disable_timer();
    }
}

impl std::fmt::Debug for InterruptManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptManager")
            .field("pending", &self.pending_interrupts())
            .field("timer", &self.timer)
            .finish()
    }
}
