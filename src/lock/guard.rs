/*!
 * Lock Guard
 *
 * Scoped ownership over any [`RawLock`]. The guard tracks whether it
 * currently owns the lock, releases on drop, and turns misuse
 * (re-locking an owned guard, unlocking a released one) into errors
 * instead of deadlocks.
 */

use thiserror::Error;

use super::RawLock;
use crate::backoff::Backoff;

/// Guard misuse errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// The guard already owns the lock; locking again would deadlock.
    #[error("guard already owns the lock")]
    WouldDeadlock,

    /// The guard does not own the lock.
    #[error("guard does not own the lock")]
    NotOwned,
}

/// RAII ownership of a [`RawLock`].
///
/// Unlike the standard guards this one can release and re-acquire the
/// lock during its lifetime, which is what condition variables need.
///
/// # Examples
///
/// ```
/// use corral::lock::{FutexLock, LockGuard, RawLock};
///
/// let lock = FutexLock::new();
/// {
///     let guard = LockGuard::new(&lock);
///     assert!(guard.owns_lock());
/// } // released here
/// assert!(lock.try_lock());
/// # unsafe { corral::lock::RawLock::unlock(&lock) };
/// ```
#[derive(Debug)]
pub struct LockGuard<'a, L: RawLock> {
    lock: &'a L,
    owns: bool,
}

impl<'a, L: RawLock> LockGuard<'a, L> {
    /// Acquires `lock` and returns an owning guard.
    pub fn new(lock: &'a L) -> Self {
        lock.lock();
        Self { lock, owns: true }
    }

    /// Acquires `lock` with a back-off schedule.
    pub fn with_backoff<B: Backoff>(lock: &'a L, backoff: B) -> Self {
        lock.lock_with(backoff);
        Self { lock, owns: true }
    }

    /// Attempts the acquisition; the guard may come back non-owning.
    pub fn try_new(lock: &'a L) -> Self {
        let owns = lock.try_lock();
        Self { lock, owns }
    }

    /// Wraps `lock` without acquiring it.
    pub fn deferred(lock: &'a L) -> Self {
        Self { lock, owns: false }
    }

    /// Adopts a lock the caller has already acquired.
    ///
    /// # Safety
    ///
    /// The calling thread must own `lock`, and no other guard may own it.
    pub unsafe fn adopt(lock: &'a L) -> Self {
        Self { lock, owns: true }
    }

    /// Acquires the lock through the guard.
    pub fn lock(&mut self) -> Result<(), LockError> {
        if self.owns {
            return Err(LockError::WouldDeadlock);
        }
        self.lock.lock();
        self.owns = true;
        Ok(())
    }

    /// Acquires the lock with a back-off schedule.
    pub fn lock_with<B: Backoff>(&mut self, backoff: B) -> Result<(), LockError> {
        if self.owns {
            return Err(LockError::WouldDeadlock);
        }
        self.lock.lock_with(backoff);
        self.owns = true;
        Ok(())
    }

    /// Attempts the acquisition; `Ok(false)` means the lock was busy.
    pub fn try_lock(&mut self) -> Result<bool, LockError> {
        if self.owns {
            return Err(LockError::WouldDeadlock);
        }
        self.owns = self.lock.try_lock();
        Ok(self.owns)
    }

    /// Releases the lock before the guard goes out of scope.
    pub fn unlock(&mut self) -> Result<(), LockError> {
        if !self.owns {
            return Err(LockError::NotOwned);
        }
        // SAFETY: `owns` witnesses that this guard holds the lock.
        unsafe { self.lock.unlock() };
        self.owns = false;
        Ok(())
    }

    /// Whether the guard currently owns the lock.
    pub fn owns_lock(&self) -> bool {
        self.owns
    }

    /// The underlying lock.
    pub(crate) fn lock_ref(&self) -> &'a L {
        self.lock
    }
}

impl<L: RawLock> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if self.owns {
            // SAFETY: `owns` witnesses ownership.
            unsafe { self.lock.unlock() };
        }
    }
}
