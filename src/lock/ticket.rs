/*!
 * Ticket Lock
 *
 * A FIFO spin lock: acquirers draw a ticket from `tail` and wait until
 * `head` reaches it, so the thread that asked first enters first.
 */

use std::sync::atomic::{AtomicU16, Ordering};

use super::RawLock;
use crate::backoff::{Backoff, NoBackoff};

/// A FIFO ticket lock over two 16-bit counters.
///
/// `tail` hands out tickets, `head` names the ticket currently allowed
/// in. Both wrap freely; correctness only needs `tail - head` to stay
/// far below 2^16, which bounds the waiter count at 65535.
///
/// With a [`ProportionalBackoff`](crate::backoff::ProportionalBackoff)
/// the wait is scaled by the caller's distance from the head of the
/// queue, so threads further back pause longer and poll the shared
/// counter less.
#[derive(Debug, Default)]
pub struct TicketLock {
    head: AtomicU16,
    tail: AtomicU16,
}

impl TicketLock {
    pub const fn new() -> Self {
        Self {
            head: AtomicU16::new(0),
            tail: AtomicU16::new(0),
        }
    }

    /// Number of threads holding or waiting for the lock right now.
    ///
    /// Approximate whenever other threads are active.
    pub fn queue_depth(&self) -> u16 {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        tail.wrapping_sub(head)
    }
}

impl RawLock for TicketLock {
    #[inline]
    fn lock(&self) {
        self.lock_with(NoBackoff);
    }

    fn lock_with<B: Backoff>(&self, mut backoff: B) {
        let ticket = self.tail.fetch_add(1, Ordering::Relaxed);
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head == ticket {
                return;
            }
            backoff.step_by(u32::from(ticket.wrapping_sub(head)));
        }
    }

    fn try_lock(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        // Only the ticket equal to head may enter; claim it if nobody
        // else has drawn a ticket.
        self.tail
            .compare_exchange(head, head.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.head.fetch_add(1, Ordering::Release);
    }
}
