/*!
 * Spin Locks
 *
 * The plain test-and-set lock and its test-and-test-and-set variant.
 * Both burn CPU while contended and are only appropriate for critical
 * sections of a few dozen instructions.
 */

use std::sync::atomic::{AtomicBool, Ordering};

use super::RawLock;
use crate::backoff::{Backoff, NoBackoff};

/// A test-and-set spin lock.
///
/// Every acquisition attempt is an atomic swap, which keeps the cache
/// line in modified state on the attempting core. Prefer [`TtasLock`]
/// when more than two threads contend.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }
}

impl RawLock for SpinLock {
    #[inline]
    fn lock(&self) {
        self.lock_with(NoBackoff);
    }

    fn lock_with<B: Backoff>(&self, mut backoff: B) {
        while self.locked.swap(true, Ordering::Acquire) {
            backoff.step();
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// A test-and-test-and-set spin lock.
///
/// Waiters spin on plain loads while the lock is held and attempt the
/// swap only when it appears free. The read-only spin keeps the line
/// shared across waiters and avoids the write storm a pure
/// test-and-set lock causes on every retry.
#[derive(Debug, Default)]
pub struct TtasLock {
    locked: AtomicBool,
}

impl TtasLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }
}

impl RawLock for TtasLock {
    #[inline]
    fn lock(&self) {
        self.lock_with(NoBackoff);
    }

    fn lock_with<B: Backoff>(&self, mut backoff: B) {
        loop {
            while self.locked.load(Ordering::Relaxed) {
                backoff.step();
            }
            if !self.locked.swap(true, Ordering::Acquire) {
                return;
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        !self.locked.load(Ordering::Relaxed) && !self.locked.swap(true, Ordering::Acquire)
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::YieldBackoff;
    use std::sync::Arc;
    use std::thread;

    fn hammer<L: RawLock + 'static>(lock: Arc<L>, threads: usize, rounds: usize) -> u64 {
        let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let lock = lock.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..rounds {
                        lock.lock_with(YieldBackoff);
                        let v = counter.load(Ordering::Relaxed);
                        counter.store(v + 1, Ordering::Relaxed);
                        unsafe { lock.unlock() };
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        counter.load(Ordering::Relaxed)
    }

    #[test]
    fn test_spin_lock_mutual_exclusion() {
        let total = hammer(Arc::new(SpinLock::new()), 4, 10_000);
        assert_eq!(total, 40_000);
    }

    #[test]
    fn test_ttas_lock_mutual_exclusion() {
        let total = hammer(Arc::new(TtasLock::new()), 4, 10_000);
        assert_eq!(total, 40_000);
    }

    #[test]
    fn test_try_lock_reports_contention() {
        let lock = SpinLock::new();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        unsafe { lock.unlock() };
        assert!(lock.try_lock());
        unsafe { lock.unlock() };
    }

    #[test]
    fn test_ttas_try_lock() {
        let lock = TtasLock::new();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        unsafe { lock.unlock() };
    }
}
