//! Interval Timer
//!
//! Background thread that raises a Timer interrupt every interval. It only
//! touches the controller's queue; all kernel state stays with the loop
//! that drains it.
//!
//! `stop` joins the thread, so no tick can land after the timer is gone.

use super::interrupts::{InterruptController, InterruptType};
use crate::{KernelError, KernelResult};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shutdown flag plus the condvar the thread sleeps on
type Shutdown = Arc<(Mutex<bool>, Condvar)>;

/// Periodic interrupt source
pub struct Timer {
    /// Tick period
    interval: Duration,
    /// Ticks raised since creation
    ticks: Arc<AtomicU64>,
    /// Stop signal
    shutdown: Shutdown,
    /// Timer thread, while running
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    /// Create a stopped timer
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ticks: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new((Mutex::new(false), Condvar::new())),
            handle: None,
        }
    }

    /// Start raising interrupts on `controller`
    pub fn start(&mut self, controller: Arc<InterruptController>) -> KernelResult<()> {
        if self.is_running() {
            return Ok(());
        }
        if self.interval.is_zero() {
            return Err(KernelError::TimerFailure("interval must be non-zero".into()));
        }

        *self.shutdown.0.lock() = false;

        let interval = self.interval;
        let ticks = Arc::clone(&self.ticks);
        let shutdown = Arc::clone(&self.shutdown);

        let handle = thread::Builder::new()
            .name("interrupt-timer".into())
            .spawn(move || run(interval, &controller, &ticks, &shutdown))
            .map_err(|e| KernelError::TimerFailure(e.to_string()))?;

        self.handle = Some(handle);
        info!("Timer started ({:?} interval)", interval);

        Ok(())
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        {
            let (lock, cvar) = &*self.shutdown;
            *lock.lock() = true;
            cvar.notify_all();
        }

        if handle.join().is_err() {
            warn!("Timer thread panicked");
        }
        info!("Timer stopped after {} ticks", self.ticks());
    }

    /// Change the period; takes effect at the next `start`
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Tick period
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if the thread is running
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Ticks raised since creation
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .finish()
    }
}

fn run(interval: Duration, controller: &InterruptController, ticks: &AtomicU64, shutdown: &Shutdown) {
    let (lock, cvar) = &**shutdown;
    let mut stopped = lock.lock();

    while !*stopped {
        let result = cvar.wait_for(&mut stopped, interval);
        if *stopped {
            break;
        }
        if result.timed_out() {
            MutexGuard::unlocked(&mut stopped, || controller.trigger(InterruptType::Timer));
            ticks.fetch_add(1, Ordering::Relaxed);
        }
    }

    debug!("Timer thread exiting");
}
