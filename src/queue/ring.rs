/*!
 * Bounded Ring Queue
 *
 * A power-of-two ring coordinated entirely through per-slot ticket
 * words. Producers and consumers draw monotonically increasing tickets
 * from cache-padded counters; each slot's 32-bit word names the ticket
 * it expects next plus a handful of status bits, so neighbors never
 * share coordination state and there is no central lock.
 *
 * How a waiter sleeps on a slot is a per-queue policy ([`SlotWait`]):
 * pure spinning, yielding, parking on the slot word, or a per-slot
 * mutex/condvar pair.
 */

use std::cell::UnsafeCell;
use std::collections::TryReserveError;
use std::mem::MaybeUninit;
use std::sync::atomic::{fence, AtomicU32, AtomicU8, Ordering};

use crossbeam_utils::CachePadded;
use thiserror::Error;

use super::{ConcurrentQueue, PopError, PushError};
use crate::backoff::{Backoff, NoBackoff};
use crate::futex;

/// Slot status bits. The ticket lives above them.
const VALID: u32 = 1;
const INVALID: u32 = 2;
const WAITING: u32 = 4;
const CLOSED: u32 = 8;

const STATUS_MASK: u32 = 0xf;
const TICKET_MASK: u32 = !STATUS_MASK;

/// Smallest allowed ring.
///
/// Four status bits are folded into every slot word, so tickets are
/// compared with their low four bits masked off. Capacities of at
/// least 16 keep consecutive tickets of one slot distinct under that
/// mask.
pub const MIN_RING_CAPACITY: u32 = 16;

/// Close flag values.
const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const SHUT: u8 = 2;

/// Ring construction errors.
#[derive(Error, Debug)]
pub enum RingError {
    /// Capacity is not a power of two or is below the minimum.
    #[error("ring capacity {0} must be a power of two and at least 16")]
    InvalidCapacity(u32),

    /// The slot array could not be allocated.
    #[error("ring allocation failed")]
    Allocation(#[from] TryReserveError),
}

/// A producer or consumer ticket counter.
///
/// Counters wrap modulo 2^32; all comparisons on tickets are done with
/// wrapping subtraction.
pub trait TicketCounter: Send + Sync + 'static {
    fn with_value(value: u32) -> Self;

    /// Current value, for diagnostics and the non-waiting paths.
    fn load(&self) -> u32;

    /// Takes the next ticket.
    fn claim(&self) -> u32;

    /// Takes `expected` as a ticket only if it is still current.
    fn try_claim(&self, expected: u32) -> bool;

    /// Skips `n` tickets at once; returns the previous value.
    fn advance(&self, n: u32) -> u32;
}

/// A counter shared by several threads; claims are atomic fetch-adds.
#[derive(Debug)]
pub struct SharedCounter(AtomicU32);

impl TicketCounter for SharedCounter {
    fn with_value(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    #[inline]
    fn load(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    fn claim(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    fn try_claim(&self, expected: u32) -> bool {
        self.0
            .compare_exchange(
                expected,
                expected.wrapping_add(1),
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    #[inline]
    fn advance(&self, n: u32) -> u32 {
        self.0.fetch_add(n, Ordering::Relaxed)
    }
}

/// A counter owned by a single thread; claims are plain load/store.
///
/// Used by the single-producer and single-consumer specializations.
/// Only one thread may claim tickets from it. Closing the queue from a
/// different thread while that owner is mid-claim can skip or repeat
/// the cut-off advance; close from the owning side (the usual
/// single-producer shutdown) is exact.
#[derive(Debug)]
pub struct PrivateCounter(AtomicU32);

impl TicketCounter for PrivateCounter {
    fn with_value(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    #[inline]
    fn load(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    fn claim(&self) -> u32 {
        let value = self.0.load(Ordering::Relaxed);
        self.0.store(value.wrapping_add(1), Ordering::Relaxed);
        value
    }

    #[inline]
    fn try_claim(&self, expected: u32) -> bool {
        if self.0.load(Ordering::Relaxed) == expected {
            self.0.store(expected.wrapping_add(1), Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    #[inline]
    fn advance(&self, n: u32) -> u32 {
        self.0.fetch_add(n, Ordering::Relaxed)
    }
}

/// Publishes `word` into the slot, keeping a concurrently set close
/// bit alive. Returns the previous word.
fn publish_word(state: &AtomicU32, word: u32) -> u32 {
    let mut seen = state.load(Ordering::Relaxed);
    loop {
        let next = word | (seen & CLOSED);
        match state.compare_exchange_weak(seen, next, Ordering::Release, Ordering::Relaxed) {
            Ok(prev) => return prev,
            Err(now) => seen = now,
        }
    }
}

/// Per-slot waiting policy.
///
/// The policy is fixed per queue type and its state (if any) lives in
/// every slot. `wait` observes the slot word `seen` and may sleep
/// until it changes; `publish` installs a new word and wakes sleepers;
/// `close` raises the sticky close bit so sleepers re-check the queue
/// state.
pub trait SlotWait: Default + Send + Sync + 'static {
    /// Whether waiters make progress without parking or locking.
    const IS_LOCK_FREE: bool;

    /// Waits for the slot word to move past `seen`; returns a fresh load.
    fn wait(&self, state: &AtomicU32, seen: u32) -> u32;

    /// Installs `word` and wakes any sleeper.
    fn publish(&self, state: &AtomicU32, word: u32);

    /// Raises the close bit and wakes any sleeper.
    fn close(&self, state: &AtomicU32);
}

/// Re-reads the slot word in a tight loop.
#[derive(Debug, Default)]
pub struct SpinSlot;

impl SlotWait for SpinSlot {
    const IS_LOCK_FREE: bool = true;

    #[inline]
    fn wait(&self, state: &AtomicU32, _seen: u32) -> u32 {
        std::hint::spin_loop();
        state.load(Ordering::Acquire)
    }

    #[inline]
    fn publish(&self, state: &AtomicU32, word: u32) {
        publish_word(state, word);
    }

    fn close(&self, state: &AtomicU32) {
        state.fetch_or(CLOSED, Ordering::AcqRel);
    }
}

/// Yields the thread between re-reads.
#[derive(Debug, Default)]
pub struct YieldSlot;

impl SlotWait for YieldSlot {
    const IS_LOCK_FREE: bool = true;

    #[inline]
    fn wait(&self, state: &AtomicU32, _seen: u32) -> u32 {
        std::thread::yield_now();
        state.load(Ordering::Acquire)
    }

    #[inline]
    fn publish(&self, state: &AtomicU32, word: u32) {
        publish_word(state, word);
    }

    fn close(&self, state: &AtomicU32) {
        state.fetch_or(CLOSED, Ordering::AcqRel);
    }
}

/// Parks on the slot word itself.
///
/// A waiter raises the waiting bit so the publisher knows a wake is
/// owed; publication wakes everyone parked on the word (producers and
/// consumers of different cycles can share it).
#[derive(Debug, Default)]
pub struct FutexSlot;

impl SlotWait for FutexSlot {
    const IS_LOCK_FREE: bool = false;

    fn wait(&self, state: &AtomicU32, seen: u32) -> u32 {
        let target = seen | WAITING;
        if seen == target
            || state
                .compare_exchange(seen, target, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            futex::wait(state, target);
        }
        state.load(Ordering::Acquire)
    }

    fn publish(&self, state: &AtomicU32, word: u32) {
        let prev = publish_word(state, word);
        if prev & WAITING != 0 {
            futex::wake_all(state);
        }
    }

    fn close(&self, state: &AtomicU32) {
        state.fetch_or(CLOSED, Ordering::AcqRel);
        futex::wake_all(state);
    }
}

/// Mirrors the slot word state machine with a per-slot mutex and
/// condition variable.
///
/// The heavyweight fallback: every slot carries real blocking
/// machinery, but no word-parking support is required from the
/// platform layer.
#[derive(Debug, Default)]
pub struct CondvarSlot {
    lock: parking_lot::Mutex<()>,
    cond: parking_lot::Condvar,
}

impl SlotWait for CondvarSlot {
    const IS_LOCK_FREE: bool = false;

    fn wait(&self, state: &AtomicU32, seen: u32) -> u32 {
        let mut held = self.lock.lock();
        if state.load(Ordering::Acquire) == seen {
            self.cond.wait(&mut held);
        }
        drop(held);
        state.load(Ordering::Acquire)
    }

    fn publish(&self, state: &AtomicU32, word: u32) {
        let held = self.lock.lock();
        publish_word(state, word);
        self.cond.notify_all();
        drop(held);
    }

    fn close(&self, state: &AtomicU32) {
        let held = self.lock.lock();
        state.fetch_or(CLOSED, Ordering::AcqRel);
        self.cond.notify_all();
        drop(held);
    }
}

/// One ring cell: the ticket/status word, the waiting policy state,
/// and the value.
#[repr(align(64))]
struct Slot<T, W: SlotWait> {
    state: AtomicU32,
    wait: W,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T, W: SlotWait> Slot<T, W> {
    fn new(token: u32) -> Self {
        Self {
            state: AtomicU32::new(token),
            wait: W::default(),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// A bounded multi-producer/multi-consumer FIFO ring.
///
/// Capacity is a power of two of at least [`MIN_RING_CAPACITY`]. The
/// `W` parameter picks the per-slot waiting policy; `P` and `C` pick
/// whether the producer and consumer counters are shared or owned by a
/// single thread, which yields the four usual specializations (see
/// [`SpscQueue`], [`SpmcQueue`], [`MpscQueue`], [`MpmcQueue`]).
///
/// # Ordering
///
/// Producers are FIFO by ticket, and so are consumers: the thread that
/// drew the smaller ticket gets the slot first. A producer's write of
/// an element happens-before the read by the consumer that pops it.
///
/// # Close
///
/// `close` cuts producers off at the tail value it observes and wakes
/// every parked thread. Consumers drain the elements below the cut and
/// then observe [`PopError::Closed`]; producers at or past the cut
/// observe [`PushError::Closed`].
pub struct RingQueue<T, W = FutexSlot, P = SharedCounter, C = SharedCounter>
where
    W: SlotWait,
    P: TicketCounter,
    C: TicketCounter,
{
    slots: Box<[Slot<T, W>]>,
    mask: u32,
    closed: AtomicU8,
    last: AtomicU32,
    tail: CachePadded<P>,
    head: CachePadded<C>,
}

// SAFETY: elements move between threads through the slot protocol; the
// slot word's release/acquire pair orders every access to the value
// cell.
unsafe impl<T: Send, W: SlotWait, P: TicketCounter, C: TicketCounter> Send
    for RingQueue<T, W, P, C>
{
}
unsafe impl<T: Send, W: SlotWait, P: TicketCounter, C: TicketCounter> Sync
    for RingQueue<T, W, P, C>
{
}

impl<T, W, P, C> RingQueue<T, W, P, C>
where
    W: SlotWait,
    P: TicketCounter,
    C: TicketCounter,
{
    /// Builds a ring of `capacity` slots.
    pub fn with_capacity(capacity: u32) -> Result<Self, RingError> {
        Self::with_start(capacity, 0)
    }

    /// Builds a ring whose counters start at `start` (a multiple of the
    /// capacity). Exercises ticket wrap-around without 2^32 operations.
    fn with_start(capacity: u32, start: u32) -> Result<Self, RingError> {
        if capacity < MIN_RING_CAPACITY || !capacity.is_power_of_two() {
            return Err(RingError::InvalidCapacity(capacity));
        }
        debug_assert_eq!(start & (capacity - 1), 0);

        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity as usize)?;
        for i in 0..capacity {
            slots.push(Slot::new(start.wrapping_add(i) & TICKET_MASK));
        }

        Ok(Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            closed: AtomicU8::new(OPEN),
            last: AtomicU32::new(0),
            tail: CachePadded::new(P::with_value(start)),
            head: CachePadded::new(C::with_value(start)),
        })
    }

    #[cfg(test)]
    pub(crate) fn near_wrap(capacity: u32) -> Result<Self, RingError> {
        // A few cycles short of the 2^32 boundary.
        Self::with_start(capacity, (capacity * 4).wrapping_neg())
    }

    /// Number of slots.
    pub fn capacity(&self) -> u32 {
        self.mask + 1
    }

    #[inline]
    fn slot(&self, ticket: u32) -> &Slot<T, W> {
        &self.slots[(ticket & self.mask) as usize]
    }

    /// Whether `ticket` falls at or beyond the producer cut-off of a
    /// closed queue.
    fn is_past_last(&self, ticket: u32) -> bool {
        if self.closed.load(Ordering::Acquire) != SHUT {
            return false;
        }
        let last = self.last.load(Ordering::Relaxed);
        last.wrapping_sub(ticket) as i32 <= 0
    }

    /// Enqueues, pausing per `backoff` until its ceiling and per the
    /// slot policy afterwards.
    pub fn wait_push_with<B: Backoff>(&self, value: T, backoff: B) -> Result<(), PushError<T>> {
        let ticket = self.tail.claim();
        let slot = self.slot(ticket);
        if self.wait_tail(slot, ticket, backoff).is_err() {
            return Err(PushError::Closed(value));
        }
        // SAFETY: the slot word matched our ticket with no value bits
        // set, so the cell is ours until we publish.
        unsafe { (*slot.value.get()).write(value) };
        slot.wait
            .publish(&slot.state, (ticket & TICKET_MASK) | VALID);
        Ok(())
    }

    /// Dequeues, pausing per `backoff` until its ceiling and per the
    /// slot policy afterwards.
    pub fn wait_pop_with<B: Backoff>(&self, mut backoff: B) -> Result<T, PopError> {
        loop {
            let ticket = self.head.claim();
            let slot = self.slot(ticket);
            let status = self.wait_head(slot, ticket, &mut backoff)?;
            let next = ticket.wrapping_add(self.capacity()) & TICKET_MASK;
            if status & VALID != 0 {
                // SAFETY: the value bit witnesses an initialized cell
                // that no other consumer can reach.
                let value = unsafe { (*slot.value.get()).assume_init_read() };
                slot.wait.publish(&slot.state, next);
                return Ok(value);
            }
            // Abandoned production: hand the slot to the next cycle and
            // take a fresh ticket.
            slot.wait.publish(&slot.state, next);
        }
    }

    /// Spins until the slot expects producer `ticket`. An error means
    /// the queue closed below the ticket.
    fn wait_tail<B: Backoff>(
        &self,
        slot: &Slot<T, W>,
        ticket: u32,
        mut backoff: B,
    ) -> Result<(), ()> {
        let token = ticket & TICKET_MASK;
        let mut seen = slot.state.load(Ordering::Acquire);
        let mut parked = false;
        loop {
            if seen & TICKET_MASK == token && seen & (VALID | INVALID) == 0 {
                return Ok(());
            }
            if self.is_past_last(ticket) {
                return Err(());
            }
            if parked {
                seen = slot.wait.wait(&slot.state, seen);
            } else {
                parked = backoff.step();
                seen = slot.state.load(Ordering::Acquire);
            }
        }
    }

    /// Spins until the slot carries a value (or abandoned value) for
    /// consumer `ticket`; returns the status bits.
    fn wait_head<B: Backoff>(
        &self,
        slot: &Slot<T, W>,
        ticket: u32,
        backoff: &mut B,
    ) -> Result<u32, PopError> {
        let token = ticket & TICKET_MASK;
        let mut seen = slot.state.load(Ordering::Acquire);
        let mut parked = false;
        loop {
            if seen & TICKET_MASK == token && seen & (VALID | INVALID) != 0 {
                return Ok(seen & STATUS_MASK);
            }
            if self.is_past_last(ticket) {
                return Err(PopError::Closed);
            }
            if parked {
                seen = slot.wait.wait(&slot.state, seen);
            } else {
                parked = backoff.step();
                seen = slot.state.load(Ordering::Acquire);
            }
        }
    }

    fn slot_ready_for_push(&self, ticket: u32) -> bool {
        let seen = self.slot(ticket).state.load(Ordering::Acquire);
        seen & TICKET_MASK == ticket & TICKET_MASK && seen & (VALID | INVALID) == 0
    }

    /// Pop body shared by the non-waiting paths once a ticket is
    /// claimed and known ready.
    fn take_claimed(&self, ticket: u32) -> Option<T> {
        let slot = self.slot(ticket);
        let seen = slot.state.load(Ordering::Acquire);
        let next = ticket.wrapping_add(self.capacity()) & TICKET_MASK;
        if seen & VALID != 0 {
            // SAFETY: as in `wait_pop_with`.
            let value = unsafe { (*slot.value.get()).assume_init_read() };
            slot.wait.publish(&slot.state, next);
            Some(value)
        } else {
            slot.wait.publish(&slot.state, next);
            None
        }
    }
}

impl<T, W, P, C> ConcurrentQueue<T> for RingQueue<T, W, P, C>
where
    W: SlotWait,
    P: TicketCounter,
    C: TicketCounter,
{
    /// Closes the ring.
    ///
    /// The winning closer advances the producer counter a full cycle so
    /// that racing producers land past the cut, records the cut-off,
    /// publishes the closed flag, and then walks the ring waking every
    /// parked thread so it can observe the new state.
    fn close(&self) {
        if self
            .closed
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let cut = self.tail.advance(self.capacity());
        self.last.store(cut, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        self.closed.store(SHUT, Ordering::Release);
        for slot in self.slots.iter() {
            slot.wait.close(&slot.state);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) != OPEN
    }

    fn is_empty(&self) -> bool {
        let tail = self.tail.load();
        let head = self.head.load();
        tail.wrapping_sub(head) as i32 <= 0
    }

    fn is_full(&self) -> bool {
        let tail = self.tail.load();
        let head = self.head.load();
        tail.wrapping_sub(head) as i32 > self.capacity() as i32
    }

    fn is_lock_free(&self) -> bool {
        W::IS_LOCK_FREE
    }

    fn wait_push(&self, value: T) -> Result<(), PushError<T>> {
        self.wait_push_with(value, NoBackoff)
    }

    fn wait_pop(&self) -> Result<T, PopError> {
        self.wait_pop_with(NoBackoff)
    }

    fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        loop {
            let ticket = self.tail.load();
            if self.is_past_last(ticket) {
                return Err(PushError::Closed(value));
            }
            if !self.slot_ready_for_push(ticket) {
                return Err(PushError::Full(value));
            }
            if self.tail.try_claim(ticket) {
                let slot = self.slot(ticket);
                // SAFETY: claiming the ticket after observing the slot
                // free makes the cell ours.
                unsafe { (*slot.value.get()).write(value) };
                slot.wait
                    .publish(&slot.state, (ticket & TICKET_MASK) | VALID);
                return Ok(());
            }
            // Another producer took this ticket; look at the new tail.
        }
    }

    fn try_pop(&self) -> Result<T, PopError> {
        loop {
            let ticket = self.head.load();
            let slot = self.slot(ticket);
            let seen = slot.state.load(Ordering::Acquire);
            let ready =
                seen & TICKET_MASK == ticket & TICKET_MASK && seen & (VALID | INVALID) != 0;
            if !ready {
                if self.is_past_last(ticket) {
                    return Err(PopError::Closed);
                }
                return Err(PopError::Empty);
            }
            if self.head.try_claim(ticket) {
                match self.take_claimed(ticket) {
                    Some(value) => return Ok(value),
                    None => continue, // abandoned slot, next ticket
                }
            }
        }
    }

    fn nonblocking_push(&self, value: T) -> Result<(), PushError<T>> {
        let ticket = self.tail.load();
        if self.is_past_last(ticket) {
            return Err(PushError::Closed(value));
        }
        if !self.slot_ready_for_push(ticket) {
            // A full cycle of outstanding elements means genuinely
            // full; anything less is a transient peer mid-operation.
            let backlog = ticket.wrapping_sub(self.head.load()) as i32;
            if backlog >= self.capacity() as i32 {
                return Err(PushError::Full(value));
            }
            return Err(PushError::Busy(value));
        }
        if !self.tail.try_claim(ticket) {
            return Err(PushError::Busy(value));
        }
        let slot = self.slot(ticket);
        // SAFETY: as in `try_push`.
        unsafe { (*slot.value.get()).write(value) };
        slot.wait
            .publish(&slot.state, (ticket & TICKET_MASK) | VALID);
        Ok(())
    }

    fn nonblocking_pop(&self) -> Result<T, PopError> {
        loop {
            let ticket = self.head.load();
            let slot = self.slot(ticket);
            let seen = slot.state.load(Ordering::Acquire);
            let ready =
                seen & TICKET_MASK == ticket & TICKET_MASK && seen & (VALID | INVALID) != 0;
            if !ready {
                if self.is_past_last(ticket) {
                    return Err(PopError::Closed);
                }
                if self.is_empty() {
                    return Err(PopError::Empty);
                }
                return Err(PopError::Busy);
            }
            if !self.head.try_claim(ticket) {
                return Err(PopError::Busy);
            }
            match self.take_claimed(ticket) {
                Some(value) => return Ok(value),
                None => continue, // abandoned slot, next ticket
            }
        }
    }
}

impl<T, W, P, C> Drop for RingQueue<T, W, P, C>
where
    W: SlotWait,
    P: TicketCounter,
    C: TicketCounter,
{
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            if slot.state.load(Ordering::Relaxed) & VALID != 0 {
                // SAFETY: the value bit witnesses an initialized cell,
                // and drop has exclusive access.
                unsafe { (*slot.value.get()).assume_init_drop() };
            }
        }
    }
}

/// Single producer, single consumer. Spinning slots by default: with
/// one thread per side the wait is usually a handful of loads.
pub type SpscQueue<T, W = SpinSlot> = RingQueue<T, W, PrivateCounter, PrivateCounter>;

/// Single producer, many consumers.
pub type SpmcQueue<T, W = FutexSlot> = RingQueue<T, W, PrivateCounter, SharedCounter>;

/// Many producers, single consumer.
pub type MpscQueue<T, W = FutexSlot> = RingQueue<T, W, SharedCounter, PrivateCounter>;

/// Many producers, many consumers.
pub type MpmcQueue<T, W = FutexSlot> = RingQueue<T, W, SharedCounter, SharedCounter>;
