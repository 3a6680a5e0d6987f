/*!
 * Synchronization Policies
 *
 * Compile-time pairings of a lock and the condition variable that goes
 * with it. Code that needs "a mutex and a condvar" takes a policy type
 * parameter instead of committing to one implementation.
 */

use crate::condvar::{FutexCondVar, LockCondVar, SysCondVar};
use crate::lock::{FutexLock, RawLock, SysLock};

/// A lock/condvar pairing selected at compile time.
pub trait Synch: Send + Sync + 'static {
    type Lock: RawLock;
    type CondVar: LockCondVar<Self::Lock>;
}

/// Futex-word lock and condvar; the contended paths cooperate through
/// the same wait addresses, so `notify_all` can requeue waiters onto
/// the lock instead of waking a herd.
#[derive(Debug, Clone, Copy, Default)]
pub struct FutexSynch;

impl Synch for FutexSynch {
    type Lock = FutexLock;
    type CondVar = FutexCondVar;
}

/// Platform mutex with the portable change-counter condvar.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysSynch;

impl Synch for SysSynch {
    type Lock = SysLock;
    type CondVar = SysCondVar;
}

/// The policy used when callers do not pick one.
///
/// The futex pairing parks through the same portable layer on every
/// platform, so it is the default everywhere.
pub type DefaultSynch = FutexSynch;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockGuard;

    fn exercise<S: Synch>() {
        let lock = S::Lock::default();
        let cond = S::CondVar::default();
        let guard = LockGuard::new(&lock);
        cond.notify_one();
        cond.notify_all();
        drop(guard);
        assert!(lock.try_lock());
        unsafe { lock.unlock() };
    }

    #[test]
    fn test_policies_construct_and_lock() {
        exercise::<FutexSynch>();
        exercise::<SysSynch>();
        exercise::<DefaultSynch>();
    }
}
