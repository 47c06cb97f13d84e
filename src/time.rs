//! # Timekeeping
//!
//! Tick-based time for the scheduler. The clock is a free-running `u32`
//! counter that wraps at `u32::MAX`, so absolute times are never compared
//! directly: every comparison goes through [`Instant::remaining_until`],
//! which measures the modular distance between two instants.
//!
//! ## Wraparound
//!
//! ```text
//!   now = 0xFFFF_FFF0        deadline = 0x0000_0010
//!   ──────────┬──────────────────────┬────────────►
//!             │◄──── 0x20 ticks ────►│
//!        (counter wraps here at 0xFFFF_FFFF → 0)
//! ```
//!
//! `deadline.wrapping_sub(now)` is `0x20` regardless of the wrap. Reading
//! that difference as a two's-complement `i32` also makes deadlines that
//! already passed come out negative instead of as huge positive numbers.
//! The result is exact whenever the two instants are less than 2^31 ticks
//! apart (about 24 days at 1 kHz).
//!
//! ## Ownership of the clock
//!
//! The process-wide counter behind [`SystemClock`] is advanced only by
//! [`tick`], which the SysTick exception calls. The scheduler only reads it.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use alloc::sync::Arc;

/// A duration measured in scheduler ticks.
pub type Ticks = u32;

/// Longest span two instants can be apart and still be ordered correctly
/// by [`Instant::remaining_until`].
pub const MAX_SPAN: Ticks = i32::MAX as Ticks;

/// A point in time on the wrapping tick counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Instant(u32);

impl Instant {
    /// Counter value zero. Also the value the system clock starts at.
    pub const ZERO: Instant = Instant(0);

    #[inline]
    pub const fn from_ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    #[inline]
    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// The instant `ticks` after `self`, wrapping past `u32::MAX`.
    #[inline]
    pub const fn wrapping_add(self, ticks: Ticks) -> Self {
        Self(self.0.wrapping_add(ticks))
    }

    /// Signed number of ticks from `self` until `deadline`.
    ///
    /// Positive when `deadline` lies ahead, zero when it is now, negative
    /// when it has passed. Computed with modular subtraction, so it stays
    /// correct across wraparound of the counter.
    #[inline]
    pub const fn remaining_until(self, deadline: Instant) -> i32 {
        deadline.0.wrapping_sub(self.0) as i32
    }

    /// Whether `self` is at or before `now` on the wrapping counter.
    #[inline]
    pub const fn is_reached(self, now: Instant) -> bool {
        now.remaining_until(self) <= 0
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Clock sources
// ---------------------------------------------------------------------------

/// Source of the current time for a scheduler.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Process-wide tick counter, advanced by the SysTick exception.
static SYSTEM_TIME: AtomicU32 = AtomicU32::new(0);

/// Advance the system clock by one tick. Called once per SysTick interrupt.
#[inline]
pub fn tick() {
    SYSTEM_TIME.fetch_add(1, Ordering::Relaxed);
}

/// Set the system clock. Intended for start-up only.
pub fn set_system_time(now: Instant) {
    SYSTEM_TIME.store(now.ticks(), Ordering::Relaxed);
}

/// Reads the process-wide tick counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant(SYSTEM_TIME.load(Ordering::Relaxed))
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same counter, so a test can keep one handle while the
/// scheduler owns another, and task handlers can advance time while they run.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            ticks: Arc::new(AtomicU32::new(start.ticks())),
        }
    }

    pub fn set(&self, now: Instant) {
        self.ticks.store(now.ticks(), Ordering::Relaxed);
    }

    pub fn advance(&self, ticks: Ticks) {
        self.ticks.fetch_add(ticks, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant(self.ticks.load(Ordering::Relaxed))
    }
}
