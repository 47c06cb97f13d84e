//! # Cortex-M4 Port Layer
//!
//! Hardware-specific pieces for the ARM Cortex-M4 (Thumb-2):
//!
//! - **SysTick** fires at `TICK_HZ`; the firmware's `SysTick` exception
//!   calls [`time::tick`](crate::time::tick) to advance the system clock
//! - **Idle wait** sleeps with `WFI` until the next interrupt, which is
//!   either the next tick or a peripheral callback that may submit work
//! - **Heap**: tasks, contexts and parameter buffers are heap allocated
//!   from a fixed `HEAP_SIZE` region. Allocation failure is fatal and ends
//!   in the panic handler. The heap is a [`CriticalHeap`], locked by the
//!   same critical section as the scheduler
//!
//! ## Interrupt Priorities
//!
//! Nothing here changes NVIC priorities. The scheduler's critical sections
//! mask all interrupts (`critical-section-single-core`), so any interrupt
//! priority may submit tasks.

use core::mem::MaybeUninit;
use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicBool, Ordering};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SYST;

use crate::config::{HEAP_SIZE, SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::heap::CriticalHeap;

// ---------------------------------------------------------------------------
// Heap
// ---------------------------------------------------------------------------

#[global_allocator]
static HEAP: CriticalHeap = CriticalHeap::empty();

static mut HEAP_MEMORY: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];

static HEAP_READY: AtomicBool = AtomicBool::new(false);

/// Hand the static heap region to the global allocator.
///
/// Must run before the first task is submitted. Later calls do nothing.
pub fn init_heap() {
    if HEAP_READY.swap(true, Ordering::AcqRel) {
        return;
    }
    // Safety: the swap above makes this the only access to HEAP_MEMORY,
    // which from here on belongs to the allocator.
    unsafe {
        HEAP.init(addr_of_mut!(HEAP_MEMORY) as *mut u8, HEAP_SIZE);
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the scheduler tick.
///
/// Sets up SysTick to fire at `TICK_HZ` frequency using the processor
/// clock. Each tick triggers the `SysTick` exception.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// Idle
// ---------------------------------------------------------------------------

/// Sleep until the next interrupt.
#[inline]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}
