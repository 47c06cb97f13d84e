//! # Scheduler
//!
//! The run loop around the task registry. Producers submit [`TaskSpec`]s;
//! the scheduler stamps them, queues them by priority, and executes them
//! one at a time, each to completion, in queue order.
//!
//! ## Run Loop
//!
//! A single [`Scheduler::step`] is:
//! 1. **Release**: parked periodic tasks whose release time has come are
//!    re-queued with a fresh issue time
//! 2. **Take**: the head task is detached from the registry and stamped
//!    with its start time
//! 3. **Run**: the handler is invoked synchronously with the task context
//! 4. **Finish**: the end time is stamped; a one-shot task is dropped, a
//!    periodic one is parked until its next release
//!
//! `step` is split into [`Scheduler::begin`] and [`Scheduler::finish`] so a
//! caller holding the scheduler behind a critical section can run step 3
//! with interrupts enabled (see `kernel::run_once`).
//!
//! ## States
//!
//! ```text
//!            submit()                    last task finished,
//!   ┌──────┐ ──────────────────► ┌─────────┐ nothing new queued ┌──────┐
//!   │ Idle │                     │ Running │ ─────────────────► │ Idle │
//!   └──────┘                     └─────────┘                    └──────┘
//! ```

use core::fmt::{self, Write};

use alloc::vec::Vec;
use log::{debug, trace, warn};

use crate::config::INITIAL_TASK_CAPACITY;
use crate::list::{self, TaskList};
use crate::task::{Priority, Task, TaskHandler, TaskId, TaskSpec};
use crate::time::{Clock, Instant, SystemClock, Ticks};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Outcome of one run-loop step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing was queued.
    Idle,
    /// The task with this id ran to completion.
    Ran(TaskId),
}

/// Whether the scheduler has work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No task queued and none executing.
    Idle,
    /// A task is executing or waiting at the head of the queue.
    Running,
}

/// Counters kept by the scheduler, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tasks accepted through `submit`.
    pub submitted: u32,
    /// Handler invocations that returned.
    pub completed: u32,
    /// Periodic tasks parked for another run.
    pub rearmed: u32,
    /// Runs that finished after their task's deadline.
    pub deadline_misses: u32,
}

/// A periodic task waiting for its next release.
struct Parked {
    release_at: Instant,
    task: Task,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Cooperative, priority-ordered run-to-completion scheduler.
pub struct Scheduler<C: Clock = SystemClock> {
    clock: C,
    queue: TaskList,
    parked: Vec<Parked>,
    /// Id of the task between `begin` and `finish`.
    running: Option<TaskId>,
    next_id: u32,
    stats: SchedulerStats,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C) -> Self {
        Self::with_capacity(clock, INITIAL_TASK_CAPACITY)
    }

    pub fn with_capacity(clock: C, capacity: usize) -> Self {
        Self {
            clock,
            queue: TaskList::with_capacity(capacity),
            parked: Vec::new(),
            running: None,
            next_id: 0,
            stats: SchedulerStats::default(),
        }
    }

    #[inline]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[inline]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Queue a task. The issue time is taken from the scheduler's clock.
    pub fn submit(&mut self, spec: TaskSpec) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        let task = Task::new(id, spec, self.clock.now());
        trace!("submit {}", task);
        self.queue.insert(task);
        self.stats.submitted = self.stats.submitted.wrapping_add(1);
        id
    }

    /// Positional form of [`submit`](Self::submit). A `period` of `None` or
    /// zero makes a one-shot task.
    pub fn create<H>(
        &mut self,
        handler: H,
        params: &[u8],
        priority: Priority,
        deadline: Option<Instant>,
        period: Option<Ticks>,
    ) -> TaskId
    where
        H: TaskHandler + 'static,
    {
        let mut spec = TaskSpec::new(handler, params, priority);
        if let Some(deadline) = deadline {
            spec = spec.deadline(deadline);
        }
        if let Some(period) = period {
            spec = spec.period(period);
        }
        self.submit(spec)
    }

    /// Read-only access to the queued tasks.
    #[inline]
    pub fn queue(&self) -> &TaskList {
        &self.queue
    }

    /// Queued tasks, head to tail.
    #[inline]
    pub fn iter(&self) -> list::Iter<'_> {
        self.queue.iter()
    }

    /// Number of queued tasks, not counting parked periodic tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of periodic tasks waiting for their next release.
    #[inline]
    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    pub fn state(&self) -> RunState {
        if self.running.is_some() || !self.queue.is_empty() {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    #[inline]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Detach the head task without running it.
    #[inline]
    pub fn remove_head(&mut self) -> Option<Task> {
        self.queue.remove_head()
    }

    /// The queued task closest to missing its deadline, as of now.
    pub fn nearest_deadline(&self) -> Option<&Task> {
        self.queue.nearest_deadline(self.clock.now())
    }

    /// Re-queue every parked periodic task whose release time has been
    /// reached. Returns how many were released.
    pub fn release_due(&mut self) -> usize {
        let now = self.clock.now();
        let mut released = 0;
        let mut i = 0;
        while i < self.parked.len() {
            if !self.parked[i].release_at.is_reached(now) {
                i += 1;
                continue;
            }
            // Keep parking order so equal-priority releases stay FIFO.
            let Parked { release_at, mut task } = self.parked.remove(i);
            task.rearm(release_at);
            trace!("release {} at {}", task.id(), now);
            self.queue.insert(task);
            released += 1;
        }
        released
    }

    /// Take the next task off the queue and stamp its start time.
    ///
    /// The returned task is no longer in the registry; hand it back through
    /// [`finish`](Self::finish) once its handler has returned.
    pub fn begin(&mut self) -> Option<Task> {
        self.release_due();

        let mut task = self.queue.remove_head()?;
        let now = self.clock.now();
        task.mark_started(now);
        self.running = Some(task.id());

        match task.context().remaining(now) {
            Some(left) if left < 0 => {
                debug!("run {} ({} ticks late at start)", task, left.unsigned_abs())
            }
            _ => debug!("run {}", task),
        }
        Some(task)
    }

    /// Stamp the end time and retire `task`: one-shot tasks are dropped,
    /// periodic tasks are parked until their next release.
    pub fn finish(&mut self, mut task: Task) {
        let now = self.clock.now();
        task.mark_finished(now);
        self.running = None;
        self.stats.completed = self.stats.completed.wrapping_add(1);

        if let Some(left) = task.context().remaining(now) {
            if left < 0 {
                self.stats.deadline_misses = self.stats.deadline_misses.wrapping_add(1);
                warn!(
                    "task {} missed its deadline by {} ticks",
                    task.id(),
                    left.unsigned_abs()
                );
            }
        }

        let Some(period) = task.period() else {
            // Releases the params buffer, the context and the handler.
            drop(task);
            return;
        };

        // Fixed rate from the previous release. A release that is already
        // overdue happens now rather than being replayed in a burst.
        let mut release_at = task.context().issue_time().wrapping_add(period);
        if release_at.is_reached(now) {
            release_at = now;
        }
        trace!("park {} until {}", task.id(), release_at);
        self.parked.push(Parked { release_at, task });
        self.stats.rearmed = self.stats.rearmed.wrapping_add(1);
    }

    /// Run the head task to completion.
    pub fn step(&mut self) -> Step {
        match self.begin() {
            Some(mut task) => {
                let id = task.id();
                task.run();
                self.finish(task);
                Step::Ran(id)
            }
            None => Step::Idle,
        }
    }

    /// Step until the queue is empty. Returns the number of tasks run.
    ///
    /// Periodic tasks that come due while this runs are released and run
    /// as well, so with a moving clock a periodic workload may keep this
    /// busy indefinitely.
    pub fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        while let Step::Ran(_) = self.step() {
            ran += 1;
        }
        ran
    }

    /// Write the queue, head to tail, followed by the parked tasks.
    pub fn dump<W: Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(
            out,
            "queue at {}: {} ready, {} parked",
            self.clock.now(),
            self.queue.len(),
            self.parked.len()
        )?;
        for (index, task) in self.queue.iter().enumerate() {
            writeln!(out, "  {:>2}: {}", index, task)?;
        }
        for parked in &self.parked {
            writeln!(out, "  --: {} (release at {})", parked.task, parked.release_at)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
