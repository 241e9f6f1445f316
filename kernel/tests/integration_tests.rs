//! Integration tests for simkernel
//!
//! These tests drive the scheduler, resource manager, paging and interrupt
//! subsystem together.

use simkernel::config::{KernelConfig, MemoryConfig, ResourceConfig, SchedulerConfig};
use simkernel::mm::{LogicalAddr, PagingMemoryManager};
use simkernel::sys::*;
use simkernel::{KernelError, KernelResult};
use std::collections::HashSet;

fn scheduler_with(frames: usize, max_steps: usize) -> Scheduler {
    let memory = PagingMemoryManager::new(frames, 4).unwrap();
    let resources = ResourceManager::new(&ResourceConfig::default(), memory);
    Scheduler::new(resources, &SchedulerConfig { max_steps, ..Default::default() })
}

/// Every live process sits in exactly one queue matching its state
fn assert_queues_consistent(s: &Scheduler) {
    let queues = [
        (ProcessState::New, s.list_new()),
        (ProcessState::Ready, s.list_ready()),
        (ProcessState::Blocked, s.list_blocked()),
        (ProcessState::Running, s.list_running()),
    ];

    let mut seen = HashSet::new();
    for (state, members) in &queues {
        for p in members {
            assert_eq!(p.state, *state, "process {} in wrong queue", p.id);
            assert!(seen.insert(p.id), "process {} in two queues", p.id);
        }
    }
    assert_eq!(seen.len(), s.process_count());
}

fn completion_order(s: &mut Scheduler, policy: SchedulingPolicy) -> KernelResult<Vec<u32>> {
    let summary = s.run_scheduler(policy)?;
    Ok(summary.completed.iter().map(|(pid, _)| pid.value()).collect())
}

mod scheduling_tests {
    use super::*;

    fn mixed_workload(s: &mut Scheduler) {
        s.create_process(ProcessSpec::new(1, 8)).unwrap();
        s.create_process(ProcessSpec::new(2, 4).arrival(1)).unwrap();
        s.create_process(ProcessSpec::new(3, 1).arrival(7)).unwrap();
        s.create_process(ProcessSpec::new(4, 2).arrival(6)).unwrap();
    }

    #[test]
    fn test_policies_differ() {
        let mut s = scheduler_with(64, 100);
        mixed_workload(&mut s);
        assert_eq!(completion_order(&mut s, SchedulingPolicy::Fcfs).unwrap(), vec![1, 2, 4, 3]);

        let mut s = scheduler_with(64, 100);
        mixed_workload(&mut s);
        assert_eq!(completion_order(&mut s, SchedulingPolicy::Srtf).unwrap(), vec![1, 3, 4, 2]);

        let mut s = scheduler_with(64, 100);
        mixed_workload(&mut s);
        assert_eq!(completion_order(&mut s, SchedulingPolicy::Hrrn).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(s.now(), 15);
    }

    #[test]
    fn test_queue_invariant_holds_every_step() {
        let mut s = scheduler_with(8, 100);
        s.create_process(ProcessSpec::new(1, 3).memory(16).device(DeviceClaim::Disk)).unwrap();
        s.create_process(ProcessSpec::new(2, 2).memory(16).arrival(1)).unwrap();
        s.create_process(ProcessSpec::new(3, 4).memory(8).arrival(2).device(DeviceClaim::Printer)).unwrap();
        s.create_process(ProcessSpec::new(4, 1).arrival(9)).unwrap();
        assert_queues_consistent(&s);

        loop {
            let outcome = s.interactive_scheduler(SchedulingPolicy::Srtf).unwrap();
            assert_queues_consistent(&s);
            let status = s.memory_status();
            assert_eq!(status.free_frames + status.occupied.len(), status.total_frames);
            if outcome == StepOutcome::Finished {
                break;
            }
        }
        assert!(!s.has_processes());
    }

    #[test]
    fn test_terminated_pid_is_gone() {
        let mut s = scheduler_with(16, 100);
        s.create_process(ProcessSpec::new(5, 1).memory(4)).unwrap();
        s.run_scheduler(SchedulingPolicy::Fcfs).unwrap();

        assert_eq!(s.schedule_process(ProcessId(5)), Err(KernelError::UnknownProcess(ProcessId(5))));
        assert_eq!(
            s.translate(ProcessId(5), LogicalAddr::new(0)),
            Err(KernelError::UnknownProcess(ProcessId(5)))
        );
        // The pid may be reused once its record is dropped
        assert!(s.create_process(ProcessSpec::new(5, 1)).is_ok());
    }

    #[test]
    fn test_step_limit_reports_livelock() {
        let mut s = scheduler_with(4, 10);
        s.create_process(ProcessSpec::new(1, 1).memory(64)).unwrap();
        s.create_process(ProcessSpec::new(2, 1)).unwrap();

        let err = s.run_scheduler(SchedulingPolicy::Fcfs).unwrap_err();
        assert_eq!(err, KernelError::StepLimitExceeded { steps: 10, pending: 1 });
        assert!(!err.is_recoverable());
        assert_eq!(s.list_blocked().len(), 1);
    }
}

mod resource_tests {
    use super::*;

    fn pool(s: &Scheduler, kind: ResourceKind) -> PoolStatus {
        s.resource_pool_status().into_iter().find(|p| p.kind == kind).unwrap()
    }

    #[test]
    fn test_no_partial_commit_through_scheduler() {
        let mut s = scheduler_with(16, 100);
        s.create_process(ProcessSpec::new(1, 5).device(DeviceClaim::Disk)).unwrap();
        s.create_process(ProcessSpec::new(2, 5).device(DeviceClaim::Disk)).unwrap();

        assert_eq!(s.schedule_process(ProcessId(1)), Ok(true));
        let cpu_before = pool(&s, ResourceKind::Cpu).available;

        assert_eq!(s.schedule_process(ProcessId(2)), Ok(false));
        assert_eq!(pool(&s, ResourceKind::Cpu).available, cpu_before);

        let disk = pool(&s, ResourceKind::Disk);
        assert_eq!(disk.available, 0);
        assert_eq!(disk.semaphore, -1);
        assert_eq!(disk.waiting, 1);
    }

    #[test]
    fn test_memory_blocked_until_holder_terminates() {
        // 1024 frames x 4 KB
        let mut s = scheduler_with(1024, 100);
        s.create_process(ProcessSpec::new(1, 5).memory(3000)).unwrap();
        s.create_process(ProcessSpec::new(3, 1).memory(100)).unwrap();
        s.create_process(ProcessSpec::new(2, 5).memory(2000)).unwrap();

        assert_eq!(s.schedule_process(ProcessId(2)), Ok(false));
        assert_eq!(
            s.process(ProcessId(2)).unwrap().blocked_on,
            Some(BlockReason::Resource(ResourceKind::Memory))
        );
        assert!(s.check_blocked_processes().is_empty());

        // Freeing 100 KB leaves 1096 KB: not enough
        s.terminate_process(ProcessId(3)).unwrap();
        assert_eq!(s.resources().memory().free_memory_kb(), 1096);
        assert_eq!(s.process(ProcessId(2)).unwrap().state, ProcessState::Blocked);
        let memory = pool(&s, ResourceKind::Memory);
        assert_eq!(memory.waiting, 1);
        assert_eq!(memory.semaphore, -1);
        assert!(s.check_blocked_processes().is_empty());
        assert_eq!(s.process(ProcessId(2)).unwrap().state, ProcessState::Blocked);
        assert_queues_consistent(&s);

        assert_eq!(s.schedule_process(ProcessId(1)), Ok(true));
        s.complete_process(ProcessId(1)).unwrap();
        s.check_blocked_processes();

        assert_eq!(s.process(ProcessId(2)).unwrap().state, ProcessState::Ready);
        assert_eq!(pool(&s, ResourceKind::Memory).waiting, 0);
        assert_eq!(s.schedule_process(ProcessId(2)), Ok(true));
        assert!(s.resources().memory().has_allocation(ProcessId(2)));
        assert_queues_consistent(&s);
    }

    #[test]
    fn test_semaphore_counts_match_waiters() {
        let mut s = scheduler_with(16, 100);
        for pid in 1..=4 {
            s.create_process(ProcessSpec::new(pid, 2).device(DeviceClaim::Printer)).unwrap();
        }
        for pid in 1..=4 {
            s.schedule_process(ProcessId(pid)).unwrap();
        }

        let printer = pool(&s, ResourceKind::Printer);
        assert_eq!(printer.waiting, 3);
        assert_eq!(printer.semaphore, -3);

        // FIFO wake: the first waiter becomes Ready
        s.complete_process(ProcessId(1)).unwrap();
        assert_eq!(s.list_ready().first().map(|p| p.id), Some(ProcessId(2)));
    }

    struct OldestHolder;

    impl simkernel::mm::VictimSelector for OldestHolder {
        fn select_victim(&mut self, _memory: &PagingMemoryManager, candidates: &[ProcessId]) -> Option<ProcessId> {
            candidates.iter().min().copied()
        }
    }

    #[test]
    fn test_custom_victim_selector() {
        let mut s = scheduler_with(4, 100);
        s.create_process(ProcessSpec::new(1, 3).memory(16)).unwrap();
        s.create_process(ProcessSpec::new(2, 3).memory(16)).unwrap();
        s.set_victim_selector(Box::new(OldestHolder));

        assert_eq!(s.schedule_process(ProcessId(2)), Ok(true));
        assert!(!s.resources().memory().has_allocation(ProcessId(1)));

        // The evicted process re-acquires memory once it is freed
        let summary = s.run_scheduler(SchedulingPolicy::Fcfs).unwrap();
        assert_eq!(summary.completed.len(), 2);
    }

    #[test]
    fn test_resource_demand_and_utilization() {
        let mut s = scheduler_with(16, 100);
        s.create_process(ProcessSpec::new(1, 1).memory(32).device(DeviceClaim::Disk)).unwrap();

        assert!((s.memory_utilization() - 50.0).abs() < 1e-9);
        let demand = s.resource_demand();
        assert_eq!((demand.cpu, demand.memory_kb, demand.disk), (1, 32, 1));
    }
}

mod memory_tests {
    use super::*;

    #[test]
    fn test_translation_deterministic_within_allocation() {
        let mut mm = PagingMemoryManager::new(32, 4).unwrap();
        mm.allocate(ProcessId(1), 10).unwrap();
        mm.allocate(ProcessId(2), 40).unwrap();

        for addr in [0, 1, 4095, 4096, 9000, 10 * 1024 - 1] {
            let first = mm.translate(ProcessId(1), LogicalAddr::new(addr)).unwrap();
            let again = mm.translate(ProcessId(1), LogicalAddr::new(addr)).unwrap();
            assert_eq!(first, again);
            assert_eq!(first.as_u64() % 4096, addr % 4096);
        }
    }

    #[test]
    fn test_frames_never_shared() {
        let mut mm = PagingMemoryManager::new(16, 4).unwrap();
        for pid in 1..=4 {
            mm.allocate(ProcessId(pid), 12).unwrap();
        }
        mm.deallocate(ProcessId(2)).unwrap();
        mm.allocate(ProcessId(5), 16).unwrap();

        let status = mm.status();
        let mut owners = HashSet::new();
        for (frame, _, _) in &status.occupied {
            assert!(owners.insert(*frame));
        }
        assert_eq!(status.free_frames + status.occupied.len(), 16);
        assert_eq!(mm.deallocate(ProcessId(2)), Err(KernelError::UnknownProcess(ProcessId(2))));
    }
}

mod interrupt_tests {
    use super::*;
    use simkernel::drivers::{InterruptManager, InterruptType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn scheduler() -> Scheduler {
        Scheduler::from_config(&KernelConfig::default()).unwrap()
    }

    #[test]
    fn test_io_interrupt_wakes_parked() {
        let mut im = InterruptManager::new(Duration::from_millis(10));
        let mut s = scheduler();
        s.create_process(ProcessSpec::new(1, 2)).unwrap();
        s.create_process(ProcessSpec::new(2, 2)).unwrap();
        s.park_for_io(ProcessId(1)).unwrap();
        s.park_for_io(ProcessId(2)).unwrap();

        im.trigger_interrupt(InterruptType::Io);
        assert_eq!(im.process_all_interrupts(&mut s), 1);
        assert_eq!(s.list_ready().len(), 2);
        assert!(s.list_blocked().is_empty());
    }

    #[test]
    fn test_reentrant_handler() {
        let mut im = InterruptManager::new(Duration::from_millis(10));
        let syscalls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&syscalls);
        im.register_fn(InterruptType::Keyboard, |ctx| {
            ctx.controller.trigger(InterruptType::SystemCall);
            ctx.controller.trigger(InterruptType::Timer);
        });
        im.register_fn(InterruptType::SystemCall, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut s = scheduler();
        im.trigger_interrupt(InterruptType::Keyboard);
        assert_eq!(im.process_all_interrupts(&mut s), 3);
        assert_eq!(syscalls.load(Ordering::SeqCst), 1);
        assert_eq!(s.timer_ticks(), 1);
        assert_eq!(im.pending_interrupts(), 0);
    }

    #[test]
    fn test_raw_tags() {
        let mut im = InterruptManager::new(Duration::from_millis(10));
        assert_eq!(im.trigger_raw(7), Err(KernelError::InvalidInterruptType(7)));
        assert_eq!(
            im.register_handler_raw(5, simkernel::drivers::interrupts::LogOnly),
            Err(KernelError::InvalidInterruptType(5))
        );
        assert!(im.register_handler_raw(3, simkernel::drivers::interrupts::LogOnly).is_ok());
        assert!(im.trigger_raw(3).is_ok());
        assert_eq!(im.pending_interrupts(), 1);
    }

    #[test]
    fn test_timer_drives_scheduler() {
        let mut im = InterruptManager::new(Duration::from_millis(5));
        let mut s = scheduler();
        im.enable_timer(Duration::from_millis(5)).unwrap();
        assert!(im.is_timer_enabled());

        let deadline = Instant::now() + Duration::from_secs(2);
        while im.pending_interrupts() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        im.disable_timer();
        assert!(!im.is_timer_enabled());

        let handled = im.process_all_interrupts(&mut s);
        assert!(handled >= 1);
        assert_eq!(s.timer_ticks(), handled as u64);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(im.pending_interrupts(), 0);
    }

    #[test]
    fn test_set_interval_restarts() {
        let mut im = InterruptManager::new(Duration::from_secs(60));
        im.enable_timer(Duration::from_secs(60)).unwrap();
        im.set_timer_interval(Duration::from_millis(3)).unwrap();
        assert!(im.is_timer_enabled());
        assert_eq!(im.timer_interval(), Duration::from_millis(3));
        im.disable_timer();
    }
}

mod kernel_tests {
    use super::*;
    use simkernel::Kernel;
    use std::time::Duration;

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.json");

        let mut config = KernelConfig::default();
        config.memory = MemoryConfig { total_frames: 64, frame_size_kb: 8 };
        config.scheduler.policy = SchedulingPolicy::Hrrn;
        config.timer.interval = Duration::from_millis(250);
        config.save(&path).unwrap();

        let loaded = KernelConfig::load(&path).unwrap();
        assert_eq!(loaded.memory, config.memory);
        assert_eq!(loaded.scheduler.policy, SchedulingPolicy::Hrrn);
        assert_eq!(loaded.timer.interval, Duration::from_millis(250));
        assert_eq!(loaded.workload, config.workload);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = KernelConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, KernelError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_kernel_run_with_timer() {
        let mut config = KernelConfig::default();
        config.timer.interval = Duration::from_millis(1);
        config.timer.cycle_pause = Duration::from_millis(2);

        let mut kernel = Kernel::new(config).unwrap();
        kernel.boot().unwrap();
        let summary = kernel.run(SchedulingPolicy::Srtf).unwrap();
        kernel.shutdown();

        assert_eq!(summary.completed.len(), 4);
        assert!(!kernel.scheduler().has_processes());
        assert!(!kernel.interrupts().is_timer_enabled());
    }

    #[test]
    fn test_kernel_step_limit() {
        let mut config = KernelConfig::default();
        config.timer.enabled = false;
        config.timer.cycle_pause = Duration::ZERO;
        config.scheduler.max_steps = 5;
        config.memory.total_frames = 2;
        config.workload = vec![ProcessSpec::new(1, 1).memory(64)];

        let mut kernel = Kernel::new(config).unwrap();
        kernel.boot().unwrap();
        assert!(matches!(
            kernel.run(SchedulingPolicy::Fcfs),
            Err(KernelError::StepLimitExceeded { steps: 5, pending: 1 })
        ));
    }
}
