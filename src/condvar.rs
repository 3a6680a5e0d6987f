/*!
 * Condition Variables
 *
 * Wait-for-a-predicate primitives paired with the raw locks. The futex
 * variant shares its wait protocol with [`FutexLock`] and can requeue
 * waiters onto the lock word; the system variant works with any
 * [`RawLock`].
 */

use std::ptr;
use std::sync::atomic::{fence, AtomicPtr, AtomicU32, Ordering};

use crate::futex;
use crate::lock::{FutexLock, LockGuard, RawLock};

/// A condition variable usable with lock `L`.
///
/// `wait` atomically releases the guard's lock and parks; the lock is
/// re-acquired before `wait` returns. Wakeups may be spurious, so
/// callers re-check their predicate in a loop.
pub trait LockCondVar<L: RawLock>: Default + Send + Sync {
    /// Releases the lock, parks until notified, re-acquires the lock.
    ///
    /// The guard must own the lock on entry; it owns it again on exit.
    fn wait(&self, guard: &mut LockGuard<'_, L>);

    /// Wakes at most one waiter.
    fn notify_one(&self);

    /// Wakes every waiter.
    fn notify_all(&self);
}

/// A condition variable sharing its futex protocol with [`FutexLock`].
///
/// State is a 32-bit change counter used as the wait address plus a
/// waiter count. The first `wait` associates the variable with its
/// lock; that association is permanent, and waiting with a different
/// lock is a programming error that panics.
///
/// `notify_all` does not wake the herd: one waiter is woken and the
/// rest are moved onto the lock's own wait address, to be released one
/// at a time as the lock is handed over.
#[derive(Debug, Default)]
pub struct FutexCondVar {
    seq: AtomicU32,
    waiters: AtomicU32,
    owner: AtomicPtr<FutexLock>,
}

impl FutexCondVar {
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            waiters: AtomicU32::new(0),
            owner: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Records `lock` as the one lock this variable works with.
    fn bind_owner(&self, lock: &FutexLock) {
        let lock = lock as *const FutexLock as *mut FutexLock;
        match self
            .owner
            .compare_exchange(ptr::null_mut(), lock, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => {}
            Err(existing) => {
                if existing != lock {
                    panic!("condition variable used with two different locks");
                }
            }
        }
    }
}

impl LockCondVar<FutexLock> for FutexCondVar {
    fn wait(&self, guard: &mut LockGuard<'_, FutexLock>) {
        debug_assert!(guard.owns_lock(), "wait requires an owned guard");
        let lock = guard.lock_ref();
        self.bind_owner(lock);

        // Announce the waiter before the counter read; the fence pairs
        // with the counter bump in notify so a notify issued after the
        // predicate change cannot be missed.
        self.waiters.fetch_add(1, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        let seq = self.seq.load(Ordering::Relaxed);

        // SAFETY: the guard owns the lock.
        unsafe { lock.unlock() };

        futex::wait(&self.seq, seq);

        self.waiters.fetch_sub(1, Ordering::Relaxed);

        // Re-acquire pessimistically: a thread resumed here either won
        // a notify or was requeued from the counter onto the lock word,
        // and in both cases it must compete for the lock like any
        // contended acquirer.
        lock.lock_contended();
    }

    fn notify_one(&self) {
        self.seq.fetch_add(1, Ordering::Acquire);
        if self.waiters.load(Ordering::Relaxed) != 0 {
            futex::wake_one(&self.seq);
        }
    }

    fn notify_all(&self) {
        let seq = self.seq.fetch_add(1, Ordering::Acquire).wrapping_add(1);
        if self.waiters.load(Ordering::Relaxed) != 0 {
            let owner = self.owner.load(Ordering::Relaxed);
            if owner.is_null() {
                // Never waited on: nobody can be parked, but a racing
                // first waiter may have bumped the count already.
                futex::wake_all(&self.seq);
            } else {
                // SAFETY: the owner lock outlives the condition
                // variable's use by API contract.
                let owner = unsafe { &*owner };
                futex::requeue_all_but_one(&self.seq, seq, owner.word());
            }
        }
    }
}

/// A portable condition variable for any [`RawLock`].
///
/// Same change-counter protocol as [`FutexCondVar`] but re-acquires
/// through the generic lock interface, so it cannot requeue;
/// `notify_all` wakes every waiter and lets them contend.
#[derive(Debug, Default)]
pub struct SysCondVar {
    seq: AtomicU32,
    waiters: AtomicU32,
}

impl SysCondVar {
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            waiters: AtomicU32::new(0),
        }
    }
}

impl<L: RawLock> LockCondVar<L> for SysCondVar {
    fn wait(&self, guard: &mut LockGuard<'_, L>) {
        debug_assert!(guard.owns_lock(), "wait requires an owned guard");
        let lock = guard.lock_ref();

        self.waiters.fetch_add(1, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        let seq = self.seq.load(Ordering::Relaxed);

        // SAFETY: the guard owns the lock.
        unsafe { lock.unlock() };

        futex::wait(&self.seq, seq);

        self.waiters.fetch_sub(1, Ordering::Relaxed);
        lock.lock();
    }

    fn notify_one(&self) {
        self.seq.fetch_add(1, Ordering::Acquire);
        if self.waiters.load(Ordering::Relaxed) != 0 {
            futex::wake_one(&self.seq);
        }
    }

    fn notify_all(&self) {
        self.seq.fetch_add(1, Ordering::Acquire);
        if self.waiters.load(Ordering::Relaxed) != 0 {
            futex::wake_all(&self.seq);
        }
    }
}
