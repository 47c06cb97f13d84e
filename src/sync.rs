//! # Synchronization Primitives
//!
//! Interrupt-safe critical sections. Every mutation of the task registry
//! happens inside one, so submissions from interrupt handlers and removals
//! from the run loop never interleave.
//!
//! On the Cortex-M target the implementation comes from `cortex-m`'s
//! `critical-section-single-core` feature (interrupts masked for the
//! duration). Host builds link the `std` implementation instead.

pub use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section.
///
/// Keep the closure short and non-blocking: on target, interrupts stay
/// masked until it returns. Nesting is allowed.
///
/// ```ignore
/// sync::critical_section(|cs| {
///     SCHEDULER.borrow_ref_mut(cs).as_mut().map(|s| s.submit(spec))
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn test_nested_critical_sections() {
        static COUNTER: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

        let value = critical_section(|outer| {
            COUNTER.borrow(outer).set(1);
            critical_section(|inner| {
                let cell = COUNTER.borrow(inner);
                cell.set(cell.get() + 1);
            });
            COUNTER.borrow(outer).get()
        });
        assert_eq!(value, 2);
    }
}
