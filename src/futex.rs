/*!
 * Futex Shim
 *
 * Wait-on-word primitives keyed by the address of an `AtomicU32`,
 * built on the `parking_lot_core` thread parker. On Linux the parker
 * bottoms out in futex syscalls; elsewhere it uses the platform
 * equivalent, so the word protocols above this module stay portable.
 */

use parking_lot_core::{ParkToken, RequeueOp, UnparkToken};
use std::sync::atomic::{AtomicU32, Ordering};

#[inline]
fn key(word: &AtomicU32) -> usize {
    word as *const AtomicU32 as usize
}

/// Blocks the calling thread while `word` still holds `expected`.
///
/// Returns immediately if the word has already changed. Spurious
/// returns are possible; callers re-check their predicate in a loop.
pub(crate) fn wait(word: &AtomicU32, expected: u32) {
    let validate = || word.load(Ordering::Relaxed) == expected;
    // SAFETY: the key is derived from a reference that stays live for
    // the whole call and the callbacks do not panic.
    unsafe {
        parking_lot_core::park(key(word), validate, || {}, |_, _| {}, ParkToken(0), None);
    }
}

/// Wakes at most one thread parked on `word`. Returns the number woken.
pub(crate) fn wake_one(word: &AtomicU32) -> usize {
    // SAFETY: see `wait`.
    let result = unsafe { parking_lot_core::unpark_one(key(word), |_| UnparkToken(0)) };
    result.unparked_threads
}

/// Wakes every thread parked on `word`. Returns the number woken.
pub(crate) fn wake_all(word: &AtomicU32) -> usize {
    // SAFETY: see `wait`.
    unsafe { parking_lot_core::unpark_all(key(word), UnparkToken(0)) }
}

/// Wakes one thread parked on `from` and moves the rest onto `to`,
/// provided `from` still holds `expected`.
///
/// The check and the transfer happen under the parker's bucket lock, so
/// no waiter can slip in between. Returns woken plus requeued threads.
pub(crate) fn requeue_all_but_one(from: &AtomicU32, expected: u32, to: &AtomicU32) -> usize {
    let validate = || {
        if from.load(Ordering::Relaxed) == expected {
            RequeueOp::UnparkOneRequeueRest
        } else {
            RequeueOp::Abort
        }
    };
    // SAFETY: both keys come from references live for the whole call.
    let result =
        unsafe { parking_lot_core::unpark_requeue(key(from), key(to), validate, |_, _| UnparkToken(0)) };
    result.unparked_threads + result.requeued_threads
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_returns_when_value_differs() {
        let word = AtomicU32::new(1);
        // Expected value mismatch: must not block.
        wait(&word, 0);
    }

    #[test]
    fn test_wake_one_unblocks_waiter() {
        let word = Arc::new(AtomicU32::new(0));
        let word2 = word.clone();
        let handle = thread::spawn(move || {
            while word2.load(Ordering::Acquire) == 0 {
                wait(&word2, 0);
            }
        });
        thread::sleep(Duration::from_millis(50));
        word.store(1, Ordering::Release);
        wake_one(&word);
        handle.join().unwrap();
    }

    #[test]
    fn test_wake_all_unblocks_every_waiter() {
        let word = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let word = word.clone();
                thread::spawn(move || {
                    while word.load(Ordering::Acquire) == 0 {
                        wait(&word, 0);
                    }
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(50));
        word.store(1, Ordering::Release);
        wake_all(&word);
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
