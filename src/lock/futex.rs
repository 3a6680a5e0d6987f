/*!
 * Futex Lock
 *
 * A mutex over a single 32-bit word used as a kernel wait address.
 * The word holds one of three states: free, held with nobody waiting,
 * and held with at least one waiter. The uncontended paths of both
 * acquire and release touch only the word, never the kernel.
 */

use std::sync::atomic::{AtomicU32, Ordering};

use super::RawLock;
use crate::backoff::{Backoff, NoBackoff};
use crate::futex;

const FREE: u32 = 0;
const HELD: u32 = 1;
const CONTENDED: u32 = 2;

/// A three-state futex-word mutex.
///
/// Acquire fast path: one compare-and-swap. Release fast path: one
/// fetch-sub. The kernel is involved only once a waiter has announced
/// itself by moving the word to the contended state, and each release
/// wakes at most one waiter.
///
/// The slow path is tuned with a [`Backoff`] schedule passed to
/// [`lock_with`](RawLock::lock_with): spinning continues until the
/// schedule reports its ceiling, then the thread parks.
#[derive(Debug, Default)]
pub struct FutexLock {
    word: AtomicU32,
}

impl FutexLock {
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(FREE),
        }
    }

    /// The wait address. Condition variables paired with this lock
    /// requeue their waiters onto it.
    pub(crate) fn word(&self) -> &AtomicU32 {
        &self.word
    }

    /// Parks until the word can be moved from free to contended.
    ///
    /// Entered once a waiter exists (or this thread is about to become
    /// one); from here on every acquisition pessimistically marks the
    /// lock contended, so the eventual release wakes a successor.
    pub(crate) fn lock_contended(&self) {
        while self.word.swap(CONTENDED, Ordering::Acquire) != FREE {
            futex::wait(&self.word, CONTENDED);
        }
    }
}

impl RawLock for FutexLock {
    #[inline]
    fn lock(&self) {
        self.lock_with(NoBackoff);
    }

    fn lock_with<B: Backoff>(&self, mut backoff: B) {
        loop {
            match self
                .word
                .compare_exchange(FREE, HELD, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(seen) => {
                    if backoff.step() {
                        // Ceiling reached: park unless the lock became
                        // free in the meantime.
                        if seen == CONTENDED || self.word.swap(CONTENDED, Ordering::Acquire) != FREE
                        {
                            self.lock_contended();
                        }
                        return;
                    }
                }
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.word
            .compare_exchange(FREE, HELD, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    unsafe fn unlock(&self) {
        if self.word.fetch_sub(1, Ordering::Release) != HELD {
            // Contended: reset the word and hand the lock to one waiter.
            self.word.store(FREE, Ordering::Relaxed);
            futex::wake_one(&self.word);
        }
    }
}
