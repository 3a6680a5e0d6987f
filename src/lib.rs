/*!
 * Corral
 *
 * Building blocks for multi-threaded programs on shared-memory
 * hardware: spin and futex locks, condition variables, tunable
 * back-off schedules, bounded and unbounded concurrent FIFO queues,
 * move-only task containers, and a worker pool that drains them.
 *
 * # Architecture
 *
 * The crate is layered bottom-up. [`pause`] and [`backoff`] define how
 * a thread waits busily; [`lock`] and [`condvar`] build blocking
 * primitives over a shared futex word; [`synch`] pairs them into
 * policies; [`queue`] offers an unbounded mutex/condvar queue and a
 * ticketed bounded ring with pluggable per-slot wait strategies; and
 * [`pool`] runs [`task`]s pulled from any of those queues.
 *
 * Waiting behavior is selected per queue (and per slot), not per
 * operation, via zero-cost type parameters.
 */

pub mod backoff;
pub mod condvar;
mod futex;
pub mod lock;
pub mod pause;
pub mod pool;
pub mod queue;
pub mod synch;
pub mod task;

pub use backoff::{
    Backoff, CompositeBackoff, ConstBackoff, ExponentialBackoff, LinearBackoff, NoBackoff,
    ProportionalBackoff, YieldBackoff,
};
pub use condvar::{FutexCondVar, LockCondVar, SysCondVar};
pub use lock::{FutexLock, LockError, LockGuard, RawLock, SpinLock, SysLock, TicketLock, TtasLock};
pub use pause::{CpuRelax, CycleFence, NanoSleep, Pause};
pub use pool::{PoolError, PoolTask, ThreadPool};
pub use queue::{
    ConcurrentQueue, MpmcQueue, MpscQueue, PopError, PushError, RingError, RingQueue, SpmcQueue,
    SpscQueue, SynchQueue,
};
pub use synch::{DefaultSynch, FutexSynch, Synch, SysSynch};
pub use task::{Task, TaskError, TrivialTask};
