/*!
 * Pause Primitives
 *
 * Side-effect-only delays used by back-off schedules while busy waiting.
 */

use std::sync::atomic::{compiler_fence, Ordering};
use std::thread;
use std::time::Duration;

/// A unit delay for busy waiting.
///
/// Implementations burn roughly `n` units of time without any visible
/// side effect. All of them are zero-sized and `Copy` so back-off
/// schedules can carry them by value.
pub trait Pause: Copy + Default + Send {
    /// Pause for `n` units.
    fn pause(&self, n: u32);
}

/// Burns cycles with compiler fences.
///
/// The fence keeps the compiler from collapsing the loop while emitting
/// no hardware synchronization at all. Appropriate when the expected
/// wait is a handful of cycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleFence;

impl Pause for CycleFence {
    #[inline]
    fn pause(&self, mut n: u32) {
        while n > 0 {
            compiler_fence(Ordering::SeqCst);
            n -= 1;
        }
    }
}

/// Issues the architecture's pause/yield hint instruction.
///
/// Eases pipeline and power pressure on the core under contention and
/// lets a sibling hyper-thread make progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuRelax;

impl Pause for CpuRelax {
    #[inline]
    fn pause(&self, mut n: u32) {
        while n > 0 {
            std::hint::spin_loop();
            n -= 1;
        }
    }
}

/// Sleeps in the kernel for up to `n` nanoseconds.
///
/// The actual delay is at the mercy of the scheduler and is usually
/// much longer than requested. Use as the terminal stage of a
/// composite schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct NanoSleep;

impl Pause for NanoSleep {
    #[inline]
    fn pause(&self, n: u32) {
        thread::sleep(Duration::from_nanos(u64::from(n)));
    }
}
