//! # Scheduler Configuration
//!
//! Compile-time constants governing the scheduler and the firmware port.

/// SysTick frequency in Hz. One `SystemClock` tick per SysTick interrupt,
/// so all deadlines and periods are expressed in units of `1 / TICK_HZ`.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Size of the heap backing task, context and parameter allocations.
/// Exhausting it is fatal: the allocator fails and the panic handler halts.
pub const HEAP_SIZE: usize = 16 * 1024;

/// Number of registry slots reserved up front. Submissions beyond this
/// grow the arena, which means allocating inside the critical section.
pub const INITIAL_TASK_CAPACITY: usize = 16;
