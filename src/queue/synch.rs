/*!
 * Unbounded Synchronized Queue
 *
 * The classic mutex-and-condvar FIFO: every mutation happens under the
 * lock, consumers sleep on the condvar while the buffer is empty, and
 * closing wakes everyone for a final drain.
 */

use std::cell::UnsafeCell;
use std::collections::VecDeque;

use super::{ConcurrentQueue, PopError, PushError};
use crate::backoff::Backoff;
use crate::condvar::LockCondVar;
use crate::lock::LockGuard;
use crate::synch::{DefaultSynch, Synch};

struct Inner<T> {
    buf: VecDeque<T>,
    closed: bool,
}

/// An unbounded FIFO queue over a lock/condvar policy.
///
/// Never reports [`PushError::Full`]; memory is the only bound. The
/// policy parameter selects the blocking machinery, so the same queue
/// runs on the futex pairing or the platform mutex unchanged.
pub struct SynchQueue<T, S: Synch = DefaultSynch> {
    lock: S::Lock,
    cond: S::CondVar,
    inner: UnsafeCell<Inner<T>>,
}

// SAFETY: `inner` is only touched while `lock` is held.
unsafe impl<T: Send, S: Synch> Send for SynchQueue<T, S> {}
unsafe impl<T: Send, S: Synch> Sync for SynchQueue<T, S> {}

impl<T, S: Synch> Default for SynchQueue<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: Synch> SynchQueue<T, S> {
    pub fn new() -> Self {
        Self {
            lock: S::Lock::default(),
            cond: S::CondVar::default(),
            inner: UnsafeCell::new(Inner {
                buf: VecDeque::new(),
                closed: false,
            }),
        }
    }

    /// Current length. Approximate while producers or consumers run.
    pub fn len(&self) -> usize {
        let _guard = LockGuard::new(&self.lock);
        // SAFETY: guarded by `lock`.
        unsafe { (*self.inner.get()).buf.len() }
    }

    /// Enqueues with a back-off schedule for the lock acquisition.
    pub fn wait_push_with<B: Backoff>(&self, value: T, backoff: B) -> Result<(), PushError<T>> {
        let guard = LockGuard::with_backoff(&self.lock, backoff);
        self.locked_push(value, &guard)
    }

    /// Dequeues with a back-off schedule for the lock acquisition.
    pub fn wait_pop_with<B: Backoff>(&self, backoff: B) -> Result<T, PopError> {
        let mut guard = LockGuard::with_backoff(&self.lock, backoff);
        loop {
            match self.locked_pop(&guard) {
                Err(PopError::Empty) => self.cond.wait(&mut guard),
                other => return other,
            }
        }
    }

    fn locked_push(&self, value: T, _guard: &LockGuard<'_, S::Lock>) -> Result<(), PushError<T>> {
        // SAFETY: the caller holds `lock`, witnessed by the guard.
        let inner = unsafe { &mut *self.inner.get() };
        if inner.closed {
            return Err(PushError::Closed(value));
        }
        inner.buf.push_back(value);
        self.cond.notify_one();
        Ok(())
    }

    fn locked_pop(&self, _guard: &LockGuard<'_, S::Lock>) -> Result<T, PopError> {
        // SAFETY: the caller holds `lock`, witnessed by the guard.
        let inner = unsafe { &mut *self.inner.get() };
        match inner.buf.pop_front() {
            Some(value) => Ok(value),
            None if inner.closed => Err(PopError::Closed),
            None => Err(PopError::Empty),
        }
    }
}

impl<T, S: Synch> ConcurrentQueue<T> for SynchQueue<T, S> {
    fn close(&self) {
        let _guard = LockGuard::new(&self.lock);
        // SAFETY: guarded by `lock`.
        unsafe { (*self.inner.get()).closed = true };
        self.cond.notify_all();
    }

    fn is_closed(&self) -> bool {
        let _guard = LockGuard::new(&self.lock);
        // SAFETY: guarded by `lock`.
        unsafe { (*self.inner.get()).closed }
    }

    fn is_empty(&self) -> bool {
        let _guard = LockGuard::new(&self.lock);
        // SAFETY: guarded by `lock`.
        unsafe { (*self.inner.get()).buf.is_empty() }
    }

    fn is_full(&self) -> bool {
        false
    }

    fn is_lock_free(&self) -> bool {
        false
    }

    fn wait_push(&self, value: T) -> Result<(), PushError<T>> {
        let guard = LockGuard::new(&self.lock);
        self.locked_push(value, &guard)
    }

    fn wait_pop(&self) -> Result<T, PopError> {
        let mut guard = LockGuard::new(&self.lock);
        loop {
            match self.locked_pop(&guard) {
                Err(PopError::Empty) => self.cond.wait(&mut guard),
                other => return other,
            }
        }
    }

    // Unbounded: pushing never has to wait, so try is wait.
    fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        let guard = LockGuard::new(&self.lock);
        self.locked_push(value, &guard)
    }

    fn try_pop(&self) -> Result<T, PopError> {
        let guard = LockGuard::new(&self.lock);
        self.locked_pop(&guard)
    }

    fn nonblocking_push(&self, value: T) -> Result<(), PushError<T>> {
        let guard = LockGuard::try_new(&self.lock);
        if !guard.owns_lock() {
            return Err(PushError::Busy(value));
        }
        self.locked_push(value, &guard)
    }

    fn nonblocking_pop(&self) -> Result<T, PopError> {
        let guard = LockGuard::try_new(&self.lock);
        if !guard.owns_lock() {
            return Err(PopError::Busy);
        }
        self.locked_pop(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::YieldBackoff;
    use crate::synch::SysSynch;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_round_trip() {
        let queue = SynchQueue::<u32>::new();
        for i in 0..100 {
            queue.push(i).unwrap();
        }
        for i in 0..100 {
            assert_eq!(queue.wait_pop().unwrap(), i);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(SynchQueue::<u32>::new());
        let queue2 = queue.clone();
        let handle = thread::spawn(move || queue2.wait_pop().unwrap());
        thread::sleep(Duration::from_millis(50));
        queue.push(42).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn test_close_turns_producers_away_and_drains() {
        let queue = SynchQueue::<u32>::new();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.close();
        queue.close(); // idempotent
        assert!(queue.is_closed());
        assert!(queue.push(3).unwrap_err().is_closed());
        assert_eq!(queue.wait_pop().unwrap(), 1);
        assert_eq!(queue.wait_pop().unwrap(), 2);
        assert_eq!(queue.wait_pop(), Err(PopError::Closed));
    }

    #[test]
    fn test_close_wakes_blocked_consumers() {
        let queue = Arc::new(SynchQueue::<u32>::new());
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.wait_pop())
            })
            .collect();
        thread::sleep(Duration::from_millis(100));
        queue.close();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Err(PopError::Closed));
        }
    }

    #[test]
    fn test_try_pop_empty() {
        let queue = SynchQueue::<u32>::new();
        assert_eq!(queue.try_pop(), Err(PopError::Empty));
    }

    #[test]
    fn test_nonblocking_reports_busy_under_held_lock() {
        let queue = SynchQueue::<u32>::new();
        let _guard = LockGuard::new(&queue.lock);
        assert!(queue.nonblocking_push(1).unwrap_err().is_busy());
        assert_eq!(queue.nonblocking_pop(), Err(PopError::Busy));
    }

    #[test]
    fn test_sys_policy_round_trip() {
        let queue = SynchQueue::<u32, SysSynch>::new();
        queue
            .wait_push_with(5, YieldBackoff)
            .unwrap();
        assert_eq!(queue.wait_pop_with(YieldBackoff).unwrap(), 5);
    }

    #[test]
    fn test_producer_consumer_ordering() {
        let queue = Arc::new(SynchQueue::<u32>::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    queue.push(i).unwrap();
                    thread::sleep(Duration::from_millis(1));
                }
                queue.close();
            })
        };
        let mut seen = Vec::new();
        while let Some(v) = queue.value_pop() {
            seen.push(v);
        }
        producer.join().unwrap();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }
}
