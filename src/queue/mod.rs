/*!
 * Concurrent Queues
 *
 * Two FIFO queues behind one interface: an unbounded queue guarded by
 * a mutex and condition variable, and a bounded ring coordinated
 * through per-slot ticket words. Operations come in three flavors:
 * waiting (may park), non-waiting (`try_*`, bounded work but may
 * contend), and non-blocking (`nonblocking_*`, report `Busy` rather
 * than contending).
 */

mod ring;
mod synch;

pub use ring::{
    CondvarSlot, FutexSlot, MpmcQueue, MpscQueue, PrivateCounter, RingError, RingQueue,
    SharedCounter, SlotWait, SpinSlot, SpmcQueue, SpscQueue, TicketCounter, YieldSlot,
    MIN_RING_CAPACITY,
};
pub use synch::SynchQueue;

use std::error::Error;
use std::fmt;

/// Why a push did not enqueue. The rejected element rides along so the
/// caller can retry without cloning.
pub enum PushError<T> {
    /// The queue is at capacity.
    Full(T),
    /// The queue has been closed.
    Closed(T),
    /// The attempt would have had to contend; only returned by the
    /// non-blocking operations.
    Busy(T),
}

impl<T> PushError<T> {
    /// Recovers the element that was not enqueued.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(value) | PushError::Closed(value) | PushError::Busy(value) => value,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PushError::Closed(_))
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PushError::Full(_))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, PushError::Busy(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
            PushError::Busy(_) => f.write_str("Busy(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("queue is full"),
            PushError::Closed(_) => f.write_str("queue is closed"),
            PushError::Busy(_) => f.write_str("queue is busy"),
        }
    }
}

impl<T> Error for PushError<T> {}

/// Why a pop did not return an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PopError {
    /// The queue holds no elements right now.
    #[error("queue is empty")]
    Empty,
    /// The queue is closed and fully drained.
    #[error("queue is closed")]
    Closed,
    /// The attempt would have had to contend; only returned by the
    /// non-blocking operations.
    #[error("queue is busy")]
    Busy,
}

/// The common surface of the concurrent queues.
///
/// `is_empty` and `is_full` are approximations whenever producers or
/// consumers are active concurrently; they are exact once the queue is
/// quiescent.
pub trait ConcurrentQueue<T> {
    /// Closes the queue. Producers are turned away, consumers drain
    /// what remains and then observe [`PopError::Closed`]. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;

    fn is_empty(&self) -> bool;

    fn is_full(&self) -> bool;

    /// Whether the queue makes progress without parking or locking.
    fn is_lock_free(&self) -> bool;

    /// Enqueues, waiting for room if necessary.
    fn wait_push(&self, value: T) -> Result<(), PushError<T>>;

    /// Dequeues, waiting for an element if necessary.
    fn wait_pop(&self) -> Result<T, PopError>;

    /// Enqueues only if that is possible without waiting.
    fn try_push(&self, value: T) -> Result<(), PushError<T>>;

    /// Dequeues only if that is possible without waiting.
    fn try_pop(&self) -> Result<T, PopError>;

    /// Like [`try_push`](Self::try_push) but backs out with
    /// [`PushError::Busy`] instead of contending with other threads.
    fn nonblocking_push(&self, value: T) -> Result<(), PushError<T>>;

    /// Like [`try_pop`](Self::try_pop) but backs out with
    /// [`PopError::Busy`] instead of contending with other threads.
    fn nonblocking_pop(&self) -> Result<T, PopError>;

    /// Alias for [`wait_push`](Self::wait_push).
    fn push(&self, value: T) -> Result<(), PushError<T>> {
        self.wait_push(value)
    }

    /// Waits for an element; `None` once the queue is closed and dry.
    fn value_pop(&self) -> Option<T> {
        self.wait_pop().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_error_accessors() {
        let err = PushError::Full(7);
        assert!(err.is_full() && !err.is_closed() && !err.is_busy());
        assert_eq!(err.into_inner(), 7);
        assert_eq!(PushError::Closed("x").into_inner(), "x");
    }

    #[test]
    fn test_push_error_debug_hides_value() {
        struct Opaque;
        let err = PushError::Busy(Opaque);
        assert_eq!(format!("{err:?}"), "Busy(..)");
        assert_eq!(err.to_string(), "queue is busy");
    }

    #[test]
    fn test_pop_error_display() {
        assert_eq!(PopError::Empty.to_string(), "queue is empty");
        assert_eq!(PopError::Closed.to_string(), "queue is closed");
    }
}
