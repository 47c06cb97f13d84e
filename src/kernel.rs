//! # Kernel
//!
//! The process-wide scheduler instance and its interrupt-safe API.
//!
//! Producers (I2C slave callbacks, timer compare handlers, the main thread)
//! call [`submit`] from any context. The run loop in [`start`] drains the
//! queue with [`run_once`]. Both take the scheduler lock only for the
//! bounded registry operations; a task's handler always runs with
//! interrupts enabled, so it may submit further work itself.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► arch::cortex_m4::init_heap()
//!         ├─► kernel::init()          ← Create the global scheduler
//!         ├─► kernel::submit()        ← Queue initial work (×N)
//!         └─► kernel::start()         ← Run loop (no return)
//!               ├─► Configure SysTick (drives SystemClock)
//!               └─► loop { run_once() or wait for interrupt }
//! ```

use core::cell::RefCell;
use core::fmt;

use crate::scheduler::{RunState, Scheduler, SchedulerStats, Step};
use crate::sync::{self, Mutex};
use crate::task::{TaskId, TaskSpec};
use crate::time::SystemClock;

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// Global scheduler, created by [`init`]. Only touched inside critical sections.
static SCHEDULER: Mutex<RefCell<Option<Scheduler<SystemClock>>>> =
    Mutex::new(RefCell::new(None));

/// Errors returned by the kernel API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// [`init`] has not been called yet.
    Uninitialized,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Uninitialized => f.write_str("kernel not initialized"),
        }
    }
}

fn with_scheduler<R>(
    f: impl FnOnce(&mut Scheduler<SystemClock>) -> R,
) -> Result<R, KernelError> {
    sync::critical_section(|cs| {
        SCHEDULER
            .borrow_ref_mut(cs)
            .as_mut()
            .map(f)
            .ok_or(KernelError::Uninitialized)
    })
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Create the global scheduler.
///
/// Only the first call creates it. Later calls leave the running scheduler
/// and everything queued in it untouched, so a task between
/// [`run_once`]'s detach and retire always returns to the scheduler it
/// came from.
pub fn init() {
    let created = sync::critical_section(|cs| {
        let mut slot = SCHEDULER.borrow_ref_mut(cs);
        if slot.is_some() {
            return false;
        }
        *slot = Some(Scheduler::new(SystemClock));
        true
    });
    if created {
        log::debug!("kernel initialized");
    } else {
        log::trace!("kernel already initialized");
    }
}

/// Queue a task. Safe to call from interrupt handlers and from inside a
/// running task.
pub fn submit(spec: TaskSpec) -> Result<TaskId, KernelError> {
    with_scheduler(|scheduler| scheduler.submit(spec))
}

/// Run the head task to completion, if there is one.
///
/// The task is detached under the lock, executed with interrupts enabled,
/// then retired under the lock again.
pub fn run_once() -> Result<Step, KernelError> {
    let Some(mut task) = with_scheduler(Scheduler::begin)? else {
        return Ok(Step::Idle);
    };

    let id = task.id();
    task.run();

    with_scheduler(|scheduler| scheduler.finish(task))?;
    Ok(Step::Ran(id))
}

pub fn state() -> Result<RunState, KernelError> {
    with_scheduler(|scheduler| scheduler.state())
}

pub fn stats() -> Result<SchedulerStats, KernelError> {
    with_scheduler(|scheduler| scheduler.stats())
}

/// Write the current queue to `out`. Development aid; holds the lock while
/// writing, so keep the sink fast.
pub fn dump<W: fmt::Write>(out: &mut W) -> Result<fmt::Result, KernelError> {
    with_scheduler(|scheduler| scheduler.dump(out))
}

/// Start the run loop. **Does not return.**
///
/// Configures SysTick to advance the system clock, then runs queued tasks
/// forever, sleeping until the next interrupt whenever the queue is empty.
/// A submission that lands between the empty check and the sleep is picked
/// up on the next SysTick at the latest.
#[cfg(feature = "firmware")]
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    use crate::arch::cortex_m4;

    init();
    cortex_m4::configure_systick(&mut core_peripherals.SYST);

    loop {
        match run_once() {
            Ok(Step::Ran(_)) => {}
            Ok(Step::Idle) | Err(KernelError::Uninitialized) => cortex_m4::wait_for_interrupt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Priority, TaskContext};
    use std::string::String;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
    use std::thread;
    use std::vec::Vec;

    // The kernel is a process-wide singleton; tests take turns with it.
    static KERNEL: StdMutex<()> = StdMutex::new(());

    fn exclusive_kernel() -> MutexGuard<'static, ()> {
        let guard = KERNEL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        init();
        while let Ok(Step::Ran(_)) = run_once() {}
        guard
    }

    #[test]
    fn test_kernel_lifecycle() {
        let _kernel = exclusive_kernel();
        let before = stats().unwrap();
        assert_eq!(state(), Ok(RunState::Idle));
        assert_eq!(run_once(), Ok(Step::Idle));

        let order = Arc::new(StdMutex::new(Vec::new()));

        let log = Arc::clone(&order);
        let follow_up = Arc::clone(&order);
        submit(TaskSpec::new(
            move |ctx: &TaskContext| {
                log.lock().unwrap().push(ctx.params()[0]);
                // A running handler may queue more work.
                let inner = Arc::clone(&follow_up);
                submit(TaskSpec::new(
                    move |ctx: &TaskContext| inner.lock().unwrap().push(ctx.params()[0]),
                    b"c",
                    Priority::NOW,
                ))
                .unwrap();
                assert_eq!(state(), Ok(RunState::Running));
            },
            b"a",
            Priority::NORMAL,
        ))
        .unwrap();

        let log = Arc::clone(&order);
        submit(TaskSpec::new(
            move |ctx: &TaskContext| log.lock().unwrap().push(ctx.params()[0]),
            b"b",
            Priority::LOW,
        ))
        .unwrap();

        assert_eq!(state(), Ok(RunState::Running));
        let mut out = String::new();
        assert_eq!(dump(&mut out), Ok(Ok(())));
        assert!(out.starts_with("queue at"));
        assert!(out.contains("params=\"a\""));

        let mut ran = 0;
        while let Ok(Step::Ran(_)) = run_once() {
            ran += 1;
        }
        assert_eq!(ran, 3);
        assert_eq!(*order.lock().unwrap(), b"acb");
        assert_eq!(state(), Ok(RunState::Idle));

        let after = stats().unwrap();
        assert_eq!(after.submitted - before.submitted, 3);
        assert_eq!(after.completed - before.completed, 3);
    }

    #[test]
    fn test_init_keeps_queued_work() {
        let _kernel = exclusive_kernel();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        submit(TaskSpec::new(
            move |_: &TaskContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                // Re-initializing mid-run must not swap the scheduler out
                // from under this task.
                init();
            },
            b"i",
            Priority::HIGH,
        ))
        .unwrap();

        init();
        assert_eq!(state(), Ok(RunState::Running));

        let before = stats().unwrap();
        let step = run_once().unwrap();
        assert!(matches!(step, Step::Ran(_)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let after = stats().unwrap();
        assert_eq!(after.completed - before.completed, 1);
        assert_eq!(after.submitted, before.submitted);
        assert_eq!(state(), Ok(RunState::Idle));
    }

    #[test]
    fn test_producers_race_run_loop() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 50;

        let _kernel = exclusive_kernel();
        let before = stats().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let runs = Arc::clone(&runs);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let counter = Arc::clone(&runs);
                        let priority = Priority::new((i % 5) as u32);
                        submit(TaskSpec::new(
                            move |_: &TaskContext| {
                                counter.fetch_add(1, Ordering::SeqCst);
                            },
                            &[p as u8, i as u8],
                            priority,
                        ))
                        .unwrap();
                    }
                })
            })
            .collect();

        // Drain while the producers are still submitting.
        let mut ran = 0;
        while ran < PRODUCERS * PER_PRODUCER {
            match run_once().unwrap() {
                Step::Ran(_) => ran += 1,
                Step::Idle => thread::yield_now(),
            }
        }
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(run_once(), Ok(Step::Idle));
        assert_eq!(runs.load(Ordering::SeqCst), PRODUCERS * PER_PRODUCER);

        let after = stats().unwrap();
        let total = (PRODUCERS * PER_PRODUCER) as u32;
        assert_eq!(after.submitted - before.submitted, total);
        assert_eq!(after.completed - before.completed, total);
    }
}
