//! # AHTI System Controller Firmware
//!
//! Demonstrates the scheduler with the controller's usual mix of work:
//!
//! | Task | Priority | Kind | Behavior |
//! |------|----------|------|----------|
//! | `report_status` | `NOW` | one-shot | Latches the fan/power status byte |
//! | `set_output` (power) | `REALTIME` | one-shot, 10 ms deadline | Switches the power rail on |
//! | `set_output` (fan) | `NORMAL` | one-shot | Switches the fan on |
//! | `heartbeat` | `LOW` | periodic, 1 s | Counts liveness beats |
//!
//! The `SysTick` exception advances the system clock and, every five
//! seconds, submits a fan toggle the way a bus callback would.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use cortex_m_rt::{entry, exception};
use panic_halt as _;

use ahti_sched::arch::cortex_m4;
use ahti_sched::config::TICK_HZ;
use ahti_sched::kernel;
use ahti_sched::task::{Priority, TaskContext, TaskSpec};
use ahti_sched::time::{self, Clock, SystemClock};

// Register ids carried in the first parameter byte.
const REG_FAN: u8 = 0x11;
const REG_POWER: u8 = 0x12;

static FAN_ON: AtomicBool = AtomicBool::new(false);
static POWER_ON: AtomicBool = AtomicBool::new(false);
static STATUS: AtomicU8 = AtomicU8::new(0);
static HEARTBEATS: AtomicU32 = AtomicU32::new(0);

// ---------------------------------------------------------------------------
// Task handlers
// ---------------------------------------------------------------------------

/// Drive an output from a `[register, state]` parameter pair.
fn set_output(ctx: &TaskContext) {
    match *ctx.params() {
        [REG_FAN, state] => FAN_ON.store(state != 0, Ordering::Relaxed),
        [REG_POWER, state] => POWER_ON.store(state != 0, Ordering::Relaxed),
        // Unknown register: nothing to drive.
        _ => {}
    }
}

fn report_status(_ctx: &TaskContext) {
    let fan = u8::from(FAN_ON.load(Ordering::Relaxed));
    let power = u8::from(POWER_ON.load(Ordering::Relaxed));
    STATUS.store(fan | power << 1, Ordering::Relaxed);
}

fn heartbeat(_ctx: &TaskContext) {
    HEARTBEATS.fetch_add(1, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    time::tick();

    if SystemClock.now().ticks() % (5 * TICK_HZ) == 0 {
        let toggle = u8::from(!FAN_ON.load(Ordering::Relaxed));
        let spec = TaskSpec::new(set_output, &[REG_FAN, toggle], Priority::HIGH);
        if let Err(err) = kernel::submit(spec) {
            log::warn!("fan toggle dropped: {}", err);
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    cortex_m4::init_heap();
    kernel::init();

    kernel::submit(TaskSpec::new(set_output, &[REG_FAN, 1], Priority::NORMAL))
        .expect("kernel initialized");
    kernel::submit(
        TaskSpec::new(set_output, &[REG_POWER, 1], Priority::REALTIME).deadline_in(TICK_HZ / 100),
    )
    .expect("kernel initialized");
    kernel::submit(TaskSpec::new(report_status, &[], Priority::NOW)).expect("kernel initialized");
    kernel::submit(TaskSpec::new(heartbeat, &[], Priority::LOW).period(TICK_HZ))
        .expect("kernel initialized");

    kernel::start(cp)
}
