//! # ahti-sched: cooperative task scheduler for the AHTI system controller
//!
//! A priority-ordered, deadline-aware work queue for a single execution
//! context. Interrupt-driven protocol handlers (I2C slave callbacks, PWM
//! compare events) submit bounded units of work; the run loop executes them
//! later, one at a time and each to completion, in priority order.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │     Producers: I2C / timer callbacks, main thread       │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │        init() · submit() · run_once() · start()         │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Run Loop    │   Task Registry    │  Sync Primitives  │
//! │  scheduler.rs│   list.rs          │  sync.rs          │
//! │  ─ begin()   │   ─ insert()       │  ─ critical_section│
//! │  ─ finish()  │   ─ remove_head()  │                   │
//! │  ─ step()    │   ─ nearest_deadline()                 │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │        Task Model (task.rs) · Time (time.rs)            │
//! │   Task · TaskContext · Priority · Instant · Clock       │
//! ├────────────────────────────────────────────────────────┤
//! │       Arch Port (arch/cortex_m4.rs, feature firmware)   │
//! │            SysTick · WFI idle · heap allocator          │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! - **Priority order**: lower rank runs first; equal ranks run in arrival
//!   order
//! - **Immediate rank**: `Priority::NOW` jumps to the head, newest first
//! - **Deadline selection**: `nearest_deadline()` finds the queued task with
//!   the least time left, using wraparound-safe tick arithmetic
//! - **Run to completion**: no preemption; a handler that never returns
//!   starves the queue
//! - **Periodic tasks**: parked after each run and re-queued one period
//!   after their previous release
//!
//! ## Memory Model
//!
//! - **Heap**: tasks and their parameter copies are allocated on submission
//!   and freed when the task retires; running out of heap is fatal
//! - **Arena registry**: list nodes live in a slab and link by index, so
//!   the registry never hands out pointers into itself
//! - **Critical sections**: `critical_section::with()` around every
//!   registry mutation and every heap allocation

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod time;
pub mod task;
pub mod list;
pub mod scheduler;
pub mod sync;
pub mod kernel;
#[cfg(any(test, feature = "firmware"))]
pub mod heap;
#[cfg(feature = "firmware")]
pub mod arch;

pub use scheduler::{RunState, Scheduler, SchedulerStats, Step};
pub use task::{Priority, Task, TaskContext, TaskHandler, TaskId, TaskSpec};
pub use time::{Clock, Instant, ManualClock, SystemClock, Ticks};
