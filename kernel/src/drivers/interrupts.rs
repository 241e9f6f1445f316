//! Interrupt Handling
//!
//! Vector table and pending-interrupt controller.
//!
//! The controller is the only state shared with the timer thread. Its
//! queue lock is held for a single push or pop and never across a handler
//! call, so handlers may trigger further interrupts.

use crate::sys::Scheduler;
use crate::{KernelError, KernelResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Number of interrupt vectors
pub const INTERRUPT_COUNT: usize = 5;

/// Interrupt type (vector number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InterruptType {
    /// Periodic timer
    Timer = 0,
    /// Keyboard input
    Keyboard = 1,
    /// I/O completion
    Io = 2,
    /// Memory event
    Memory = 3,
    /// System call
    SystemCall = 4,
}

impl InterruptType {
    /// All interrupt types in vector order
    pub const ALL: [InterruptType; INTERRUPT_COUNT] = [
        InterruptType::Timer,
        InterruptType::Keyboard,
        InterruptType::Io,
        InterruptType::Memory,
        InterruptType::SystemCall,
    ];

    /// Vector number
    pub fn vector(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for InterruptType {
    type Error = KernelError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        InterruptType::ALL
            .get(tag as usize)
            .copied()
            .ok_or(KernelError::InvalidInterruptType(tag))
    }
}

impl std::fmt::Display for InterruptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterruptType::Timer => write!(f, "Timer"),
            InterruptType::Keyboard => write!(f, "Keyboard"),
            InterruptType::Io => write!(f, "IO"),
            InterruptType::Memory => write!(f, "Memory"),
            InterruptType::SystemCall => write!(f, "SystemCall"),
        }
    }
}

/// State a handler may act on
pub struct InterruptContext<'a> {
    /// Interrupt being serviced
    pub kind: InterruptType,
    /// Scheduler owned by the kernel loop
    pub scheduler: &'a mut Scheduler,
    /// Controller, for raising follow-up interrupts
    pub controller: &'a InterruptController,
}

/// Interrupt service routine
pub trait InterruptHandler: Send {
    /// Service one interrupt
    fn handle(&mut self, ctx: &mut InterruptContext<'_>);
}

/// Adapter for closure handlers
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: FnMut(&mut InterruptContext<'_>) + Send,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> InterruptHandler for FnHandler<F>
where
    F: FnMut(&mut InterruptContext<'_>) + Send,
{
    fn handle(&mut self, ctx: &mut InterruptContext<'_>) {
        (self.0)(ctx)
    }
}

/// Timer: admit arrivals and re-offer resources to Blocked processes
#[derive(Debug, Default)]
pub struct TimerTick;

impl InterruptHandler for TimerTick {
    fn handle(&mut self, ctx: &mut InterruptContext<'_>) {
        ctx.scheduler.on_timer_tick();
    }
}

/// I/O completion: wake every process parked for I/O
#[derive(Debug, Default)]
pub struct IoCompletion;

impl InterruptHandler for IoCompletion {
    fn handle(&mut self, ctx: &mut InterruptContext<'_>) {
        let woken = ctx.scheduler.wake_io_waiting_processes();
        debug!("I/O completion woke {} processes", woken.len());
    }
}

/// Logs the interrupt and does nothing else
#[derive(Debug, Default)]
pub struct LogOnly;

impl InterruptHandler for LogOnly {
    fn handle(&mut self, ctx: &mut InterruptContext<'_>) {
        debug!("{} interrupt at t={}", ctx.kind, ctx.scheduler.now());
    }
}

/// Interrupt vector table
pub struct VectorTable {
    handlers: [Option<Box<dyn InterruptHandler>>; INTERRUPT_COUNT],
}

impl VectorTable {
    /// Create table with no handlers installed
    pub fn new() -> Self {
        Self {
            handlers: std::array::from_fn(|_| None),
        }
    }

    /// Create table with the default handlers installed
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register(InterruptType::Timer, Box::new(TimerTick));
        table.register(InterruptType::Keyboard, Box::new(LogOnly));
        table.register(InterruptType::Io, Box::new(IoCompletion));
        table.register(InterruptType::Memory, Box::new(LogOnly));
        table.register(InterruptType::SystemCall, Box::new(LogOnly));
        table
    }

    /// Install a handler, replacing any previous one
    pub fn register(&mut self, kind: InterruptType, handler: Box<dyn InterruptHandler>) {
        self.handlers[kind.vector()] = Some(handler);
        trace!("Handler registered for {} interrupt", kind);
    }

    /// Remove a handler
    pub fn unregister(&mut self, kind: InterruptType) {
        self.handlers[kind.vector()] = None;
    }

    /// Check if a handler is installed
    pub fn is_registered(&self, kind: InterruptType) -> bool {
        self.handlers[kind.vector()].is_some()
    }

    /// Run the handler for `ctx.kind`
    pub fn dispatch(&mut self, ctx: &mut InterruptContext<'_>) {
        trace!("Dispatching {} interrupt", ctx.kind);
        match self.handlers[ctx.kind.vector()].as_mut() {
            Some(handler) => handler.handle(ctx),
            None => warn!("Unhandled {} interrupt", ctx.kind),
        }
    }
}

impl Default for VectorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending-interrupt controller
#[derive(Debug, Default)]
pub struct InterruptController {
    pending: Mutex<VecDeque<InterruptType>>,
}

impl InterruptController {
    /// Create controller with an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an interrupt
    pub fn trigger(&self, kind: InterruptType) {
        self.pending.lock().push_back(kind);
        trace!("{} interrupt raised", kind);
    }

    /// Queue an interrupt by vector number
    pub fn trigger_raw(&self, tag: u8) -> KernelResult<()> {
        let kind = InterruptType::try_from(tag).map_err(|e| {
            warn!("Ignoring interrupt with bad vector {}", tag);
            e
        })?;
        self.trigger(kind);
        Ok(())
    }

    /// Number of queued interrupts
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Check if anything is queued
    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Dispatch queued interrupts in FIFO order until the queue is empty,
    /// including any raised by the handlers themselves.
    ///
    /// Returns the number dispatched.
    pub fn process_all(&self, table: &mut VectorTable, scheduler: &mut Scheduler) -> usize {
        let mut handled = 0;

        loop {
            let next = self.pending.lock().pop_front();
            let Some(kind) = next else {
                break;
            };

            let mut ctx = InterruptContext {
                kind,
                scheduler: &mut *scheduler,
                controller: self,
            };
            table.dispatch(&mut ctx);
            handled += 1;
        }

        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::sys::{ProcessId, ProcessSpec, ProcessState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn scheduler() -> Scheduler {
        Scheduler::from_config(&KernelConfig::default()).unwrap()
    }

    #[test]
    fn test_interrupt_type_from_tag() {
        assert_eq!(InterruptType::try_from(2), Ok(InterruptType::Io));
        assert_eq!(InterruptType::try_from(4), Ok(InterruptType::SystemCall));
        assert_eq!(InterruptType::try_from(5), Err(KernelError::InvalidInterruptType(5)));
    }

    #[test]
    fn test_fifo_dispatch() {
        let controller = InterruptController::new();
        let mut table = VectorTable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for kind in [InterruptType::Keyboard, InterruptType::Memory] {
            let seen = Arc::clone(&seen);
            table.register(kind, Box::new(FnHandler::new(move |ctx| seen.lock().push(ctx.kind))));
        }

        controller.trigger(InterruptType::Memory);
        controller.trigger(InterruptType::Keyboard);
        controller.trigger(InterruptType::Memory);

        let mut s = scheduler();
        assert_eq!(controller.process_all(&mut table, &mut s), 3);
        assert_eq!(
            *seen.lock(),
            vec![InterruptType::Memory, InterruptType::Keyboard, InterruptType::Memory]
        );
        assert!(!controller.has_pending());
    }

    #[test]
    fn test_reentrant_trigger() {
        let controller = InterruptController::new();
        let mut table = VectorTable::new();
        let io_count = Arc::new(AtomicUsize::new(0));

        table.register(InterruptType::SystemCall, Box::new(FnHandler::new(|ctx| {
            ctx.controller.trigger(InterruptType::Io)
        })));
        let counter = Arc::clone(&io_count);
        table.register(InterruptType::Io, Box::new(FnHandler::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        controller.trigger(InterruptType::SystemCall);
        let mut s = scheduler();
        assert_eq!(controller.process_all(&mut table, &mut s), 2);
        assert_eq!(io_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_is_consumed() {
        let controller = InterruptController::new();
        let mut table = VectorTable::new();
        controller.trigger(InterruptType::Keyboard);

        let mut s = scheduler();
        assert_eq!(controller.process_all(&mut table, &mut s), 1);
        assert_eq!(controller.pending_count(), 0);
    }

    #[test]
    fn test_default_handlers() {
        let controller = InterruptController::new();
        let mut table = VectorTable::with_defaults();
        let mut s = scheduler();
        s.create_process(ProcessSpec::new(1, 2)).unwrap();
        s.park_for_io(ProcessId(1)).unwrap();

        controller.trigger(InterruptType::Timer);
        controller.trigger_raw(2).unwrap();
        assert!(controller.trigger_raw(9).is_err());

        assert_eq!(controller.process_all(&mut table, &mut s), 2);
        assert_eq!(s.timer_ticks(), 1);
        assert_eq!(s.process(ProcessId(1)).unwrap().state, ProcessState::Ready);
    }
}
