/*!
 * Thread Pool
 *
 * N workers draining tasks from a caller-supplied queue. Shutdown
 * comes in two flavors: `stop` abandons whatever is still queued,
 * `wait` drains the queue first. Either way the queue is closed and
 * the workers exit on their own.
 */

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::error;
use thiserror::Error;

use crate::queue::{ConcurrentQueue, PopError, SynchQueue};
use crate::task::Task;

/// The task type pools execute: two inline words, so a closure with a
/// pointer-sized capture still avoids the heap cell.
pub type PoolTask = Task<(), 2>;

const STOP: u8 = 1;
const WAIT: u8 = 2;

/// Thread pool errors.
#[derive(Error, Debug)]
pub enum PoolError {
    /// Pools need at least one worker.
    #[error("thread pool requires at least one worker")]
    NoWorkers,

    /// The task queue is closed; the pool is shutting down.
    #[error("task queue is closed")]
    Closed,

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread")]
    Spawn(#[from] std::io::Error),
}

/// A pool of worker threads over a task queue.
///
/// The queue type is chosen by the caller, so the pool runs unchanged
/// over the unbounded queue or any ring specialization. Both shutdown
/// paths are idempotent and the pool shuts itself down on drop.
///
/// # Examples
///
/// ```
/// use corral::pool::ThreadPool;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// let mut pool = ThreadPool::with_default_queue(4).unwrap();
/// let counter = Arc::new(AtomicU32::new(0));
/// for _ in 0..10 {
///     let counter = counter.clone();
///     pool.submit(move || {
///         counter.fetch_add(1, Ordering::Relaxed);
///     })
///     .unwrap();
/// }
/// pool.wait();
/// assert_eq!(counter.load(Ordering::Relaxed), 10);
/// ```
pub struct ThreadPool<Q = SynchQueue<PoolTask>>
where
    Q: ConcurrentQueue<PoolTask> + Send + Sync + 'static,
{
    queue: Arc<Q>,
    flags: Arc<AtomicU8>,
    workers: Vec<JoinHandle<()>>,
    joined: parking_lot::Mutex<bool>,
}

impl ThreadPool<SynchQueue<PoolTask>> {
    /// A pool of `workers` threads over a fresh unbounded queue.
    pub fn with_default_queue(workers: usize) -> Result<Self, PoolError> {
        Self::new(workers, SynchQueue::new())
    }
}

impl<Q> ThreadPool<Q>
where
    Q: ConcurrentQueue<PoolTask> + Send + Sync + 'static,
{
    /// Spawns `workers` threads draining `queue`.
    pub fn new(workers: usize, queue: Q) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        let queue = Arc::new(queue);
        let flags = Arc::new(AtomicU8::new(0));
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(workers);
        for index in 0..workers {
            let worker_queue = queue.clone();
            let worker_flags = flags.clone();
            let spawned = thread::Builder::new()
                .name(format!("corral-worker-{index}"))
                .spawn(move || worker_loop(&*worker_queue, &worker_flags));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Shut down whatever already started before bailing.
                    flags.store(STOP, Ordering::Relaxed);
                    queue.close();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(err));
                }
            }
        }
        Ok(Self {
            queue,
            flags,
            workers: handles,
            joined: parking_lot::Mutex::new(false),
        })
    }

    /// Number of worker threads.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Whether `stop` has been requested.
    pub fn is_stopped(&self) -> bool {
        self.flags.load(Ordering::Relaxed) & STOP != 0
    }

    /// The queue the workers drain, for direct inspection.
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Wraps `target` in a task and enqueues it.
    pub fn submit<F>(&self, target: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue
            .wait_push(PoolTask::new(target))
            .map_err(|_| PoolError::Closed)
    }

    /// Requests shutdown, abandoning queued work.
    pub fn stop(&self) {
        self.shutdown(STOP);
    }

    /// Requests shutdown, lets the workers drain the queue, and joins
    /// them. Safe to call repeatedly.
    pub fn wait(&mut self) {
        self.shutdown(WAIT);
        let mut joined = self.joined.lock();
        if !*joined {
            for handle in self.workers.drain(..) {
                if handle.join().is_err() {
                    error!("worker thread exited by panic");
                }
            }
            *joined = true;
        }
    }

    /// The first shutdown request of either kind closes the queue.
    fn shutdown(&self, flag: u8) {
        if self.flags.fetch_or(flag, Ordering::Relaxed) == 0 {
            self.queue.close();
        }
    }
}

impl<Q> Drop for ThreadPool<Q>
where
    Q: ConcurrentQueue<PoolTask> + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

fn worker_loop<Q: ConcurrentQueue<PoolTask>>(queue: &Q, flags: &AtomicU8) {
    while flags.load(Ordering::Relaxed) & STOP == 0 {
        let task = match queue.wait_pop() {
            Ok(task) => task,
            Err(PopError::Closed) => break,
            Err(_) => continue,
        };
        // A task failure never takes the worker down with it.
        match panic::catch_unwind(AssertUnwindSafe(|| task.call())) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("discarded task: {err}"),
            Err(_) => error!("task panicked; worker continues"),
        }
    }
}
