/*!
 * System Mutex Wrapper
 *
 * Adapts the platform mutex (via `parking_lot`) to the [`RawLock`]
 * interface so it can stand in anywhere the home-grown locks do.
 */

use parking_lot::lock_api::RawMutex as _;

use super::RawLock;

/// The OS-backed mutex behind the [`RawLock`] interface.
///
/// Word-sized, no poisoning, adaptive spinning in user space before
/// parking. This is the reliable baseline the specialized locks are
/// measured against.
pub struct SysLock {
    raw: parking_lot::RawMutex,
}

impl Default for SysLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SysLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysLock").finish_non_exhaustive()
    }
}

impl SysLock {
    pub const fn new() -> Self {
        Self {
            raw: parking_lot::RawMutex::INIT,
        }
    }
}

impl RawLock for SysLock {
    #[inline]
    fn lock(&self) {
        self.raw.lock();
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.raw.try_lock()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.raw.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sys_lock_basic() {
        let lock = SysLock::new();
        lock.lock();
        assert!(!lock.try_lock());
        unsafe { lock.unlock() };
        assert!(lock.try_lock());
        unsafe { lock.unlock() };
    }

    #[test]
    fn test_sys_lock_contended() {
        let lock = Arc::new(SysLock::new());
        let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        lock.lock();
                        let v = counter.load(std::sync::atomic::Ordering::Relaxed);
                        counter.store(v + 1, std::sync::atomic::Ordering::Relaxed);
                        unsafe { lock.unlock() };
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 40_000);
    }
}
