//! # Task Model
//!
//! Defines the unit of deferred work: a [`Task`] owns its handler, its
//! [`TaskContext`] (the deep-copied parameter bytes plus timing stamps) and
//! its scheduling attributes. Tasks are built from a [`TaskSpec`] at
//! submission time and are never updated in place afterwards, apart from the
//! timestamps the run loop writes and the re-arm of periodic tasks.
//!
//! ## Lifecycle
//!
//! ```text
//!   TaskSpec ──submit()──► Queued ──begin()──► Running ──finish()──┐
//!                            ▲                                     │
//!                            │  period elapsed        one-shot ────┴──► dropped
//!                            └──────────── Parked ◄── periodic
//! ```
//!
//! Dropping a `Task` releases the parameter buffer, the context and the
//! handler exactly once. There is no other release path.

use core::fmt;

use alloc::boxed::Box;

use crate::time::{Instant, Ticks, MAX_SPAN};

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Scheduling rank. Lower numeric value means more urgent.
///
/// [`Priority::NOW`] is reserved: a task submitted with it is placed at the
/// head of the queue unconditionally, ahead of everything already queued,
/// including earlier `NOW` tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u32);

impl Priority {
    /// The reserved immediate rank.
    pub const NOW: Priority = Priority(0);
    pub const REALTIME: Priority = Priority(1);
    pub const HIGH: Priority = Priority(2);
    pub const NORMAL: Priority = Priority(3);
    pub const LOW: Priority = Priority(4);

    #[inline]
    pub const fn new(rank: u32) -> Self {
        Self(rank)
    }

    #[inline]
    pub const fn rank(self) -> u32 {
        self.0
    }

    /// Whether this is the reserved immediate rank.
    #[inline]
    pub const fn is_immediate(self) -> bool {
        self.0 == Self::NOW.0
    }
}

impl From<u32> for Priority {
    fn from(rank: u32) -> Self {
        Self(rank)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NOW => f.write_str("now"),
            Self::REALTIME => f.write_str("realtime"),
            Self::HIGH => f.write_str("high"),
            Self::NORMAL => f.write_str("normal"),
            Self::LOW => f.write_str("low"),
            Self(rank) => write!(f, "{}", rank),
        }
    }
}

// ---------------------------------------------------------------------------
// Handler capability
// ---------------------------------------------------------------------------

/// Anything that can be executed given a task context.
///
/// Handlers run to completion on the scheduler's execution context and
/// cannot report failure to the scheduler: any fault is the handler's own
/// business. Closures taking `&TaskContext` implement this trait.
pub trait TaskHandler: Send {
    fn run(&mut self, ctx: &TaskContext);
}

impl<F> TaskHandler for F
where
    F: FnMut(&TaskContext) + Send,
{
    #[inline]
    fn run(&mut self, ctx: &TaskContext) {
        self(ctx)
    }
}

// ---------------------------------------------------------------------------
// Task context
// ---------------------------------------------------------------------------

/// Parameter payload and timing metadata bound to one task instance.
///
/// The context exclusively owns its copy of the parameter bytes; the
/// submitter's buffer may be reused as soon as submission returns.
pub struct TaskContext {
    params: Box<[u8]>,
    issue_time: Instant,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    deadline: Option<Instant>,
}

impl TaskContext {
    /// Parameter bytes as they were at submission time.
    #[inline]
    pub fn params(&self) -> &[u8] {
        &self.params
    }

    #[inline]
    pub fn issue_time(&self) -> Instant {
        self.issue_time
    }

    /// Set by the run loop right before the handler is invoked.
    #[inline]
    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    /// Set by the run loop right after the handler returns.
    #[inline]
    pub fn end_time(&self) -> Option<Instant> {
        self.end_time
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[inline]
    pub fn has_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    /// Ticks left until the deadline as seen from `now`; negative once it
    /// has passed, `None` for tasks without a deadline.
    #[inline]
    pub fn remaining(&self, now: Instant) -> Option<i32> {
        self.deadline.map(|deadline| now.remaining_until(deadline))
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("params_len", &self.params.len())
            .field("issue_time", &self.issue_time)
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("deadline", &self.deadline)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Identifier assigned at submission. Used for diagnostics only; it does
/// not allow cancelling or updating a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u32);

impl TaskId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A unit of schedulable work.
pub struct Task {
    id: TaskId,
    handler: Box<dyn TaskHandler>,
    context: TaskContext,
    priority: Priority,
    /// `Some` for periodic tasks; never `Some(0)`.
    period: Option<Ticks>,
}

impl Task {
    /// Build a task from its submission spec, resolving a relative deadline
    /// against `issue_time`.
    pub(crate) fn new(id: TaskId, spec: TaskSpec, issue_time: Instant) -> Self {
        let deadline = spec.deadline.map(|deadline| match deadline {
            DeadlineSpec::At(at) => at,
            DeadlineSpec::After(ticks) => issue_time.wrapping_add(ticks),
        });

        Self {
            id,
            handler: spec.handler,
            context: TaskContext {
                params: spec.params,
                issue_time,
                start_time: None,
                end_time: None,
                deadline,
            },
            priority: spec.priority,
            period: spec.period,
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[inline]
    pub fn period(&self) -> Option<Ticks> {
        self.period
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.period.is_some()
    }

    #[inline]
    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    /// Invoke the handler with this task's context, synchronously.
    pub fn run(&mut self) {
        self.handler.run(&self.context);
    }

    #[inline]
    pub(crate) fn mark_started(&mut self, now: Instant) {
        self.context.start_time = Some(now);
    }

    #[inline]
    pub(crate) fn mark_finished(&mut self, now: Instant) {
        self.context.end_time = Some(now);
    }

    /// Prepare a periodic task for its next release at `issue_time`.
    ///
    /// The deadline keeps the same offset from the issue time it had at
    /// submission. Execution stamps are cleared. Parameters and handler are
    /// kept as-is.
    pub(crate) fn rearm(&mut self, issue_time: Instant) {
        let ctx = &mut self.context;
        let previous = ctx.issue_time;
        ctx.deadline = ctx
            .deadline
            .map(|deadline| issue_time.wrapping_add(previous.remaining_until(deadline) as u32));
        ctx.issue_time = issue_time;
        ctx.start_time = None;
        ctx.end_time = None;
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("period", &self.period)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {} priority={}", self.id, self.priority)?;
        if let Some(deadline) = self.context.deadline {
            write!(f, " deadline={}", deadline)?;
        }
        if let Some(period) = self.period {
            write!(f, " period={}", period)?;
        }
        write!(f, " params=\"{}\"", self.context.params.escape_ascii())
    }
}

// ---------------------------------------------------------------------------
// Submission spec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum DeadlineSpec {
    At(Instant),
    After(Ticks),
}

/// Everything needed to submit a task.
///
/// The parameter bytes are copied when the spec is built, so the caller's
/// buffer is free to change immediately afterwards.
///
/// ```ignore
/// let spec = TaskSpec::new(set_fan, &[0x11, 1], Priority::HIGH)
///     .deadline_in(50)
///     .period(1000);
/// ```
pub struct TaskSpec {
    handler: Box<dyn TaskHandler>,
    params: Box<[u8]>,
    priority: Priority,
    deadline: Option<DeadlineSpec>,
    period: Option<Ticks>,
}

impl TaskSpec {
    pub fn new<H>(handler: H, params: &[u8], priority: Priority) -> Self
    where
        H: TaskHandler + 'static,
    {
        Self {
            handler: Box::new(handler),
            params: Box::from(params),
            priority,
            deadline: None,
            period: None,
        }
    }

    /// Absolute deadline.
    pub fn deadline(mut self, at: Instant) -> Self {
        self.deadline = Some(DeadlineSpec::At(at));
        self
    }

    /// Deadline `ticks` after the task's issue time.
    pub fn deadline_in(mut self, ticks: Ticks) -> Self {
        self.deadline = Some(DeadlineSpec::After(ticks));
        self
    }

    /// Re-run the task every `period` ticks. A period of zero means one-shot.
    ///
    /// Periods are capped at [`MAX_SPAN`]; anything longer could not be told
    /// apart from an overdue release on the wrapping clock.
    pub fn period(mut self, period: Ticks) -> Self {
        self.period = (period > 0).then_some(period.min(MAX_SPAN));
        self
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("params_len", &self.params.len())
            .field("priority", &self.priority)
            .field("deadline", &self.deadline)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
