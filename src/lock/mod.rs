/*!
 * Mutual Exclusion Primitives
 *
 * A family of raw locks sharing one interface: pure spin locks, a FIFO
 * ticket lock, a three-state futex lock, and a wrapper over the OS
 * mutex. All of them pair with [`LockGuard`] for scoped ownership and
 * accept a [`Backoff`](crate::backoff::Backoff) schedule on the slow
 * path.
 */

mod futex;
mod guard;
mod spin;
mod sys;
mod ticket;

pub use futex::FutexLock;
pub use guard::{LockError, LockGuard};
pub use spin::{SpinLock, TtasLock};
pub use sys::SysLock;
pub use ticket::TicketLock;

use crate::backoff::Backoff;

/// A raw mutual-exclusion lock.
///
/// Implementations hold no data; callers pair them with [`LockGuard`]
/// or manage ownership themselves. A successful `lock` happens-after
/// the `unlock` that released the lock to it.
pub trait RawLock: Default + Send + Sync {
    /// Acquires the lock, blocking until it is owned.
    fn lock(&self);

    /// Acquires the lock, pausing per `backoff` between attempts.
    ///
    /// The default drives [`try_lock`](Self::try_lock) in a loop; locks
    /// with a cheaper contended path override it.
    fn lock_with<B: Backoff>(&self, mut backoff: B) {
        while !self.try_lock() {
            backoff.step();
        }
    }

    /// Attempts to acquire the lock without blocking.
    fn try_lock(&self) -> bool;

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// The calling thread must own the lock.
    unsafe fn unlock(&self);
}
