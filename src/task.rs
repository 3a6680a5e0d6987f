/*!
 * Executable Tasks
 *
 * A move-only, zero-argument callable container sized for queueing.
 * Small targets live inline in a pointer-sized buffer; anything larger
 * goes through one heap cell. Unlike a boxed closure, moving a task
 * never allocates, which is what matters on the path from a submitting
 * thread through a queue to a worker.
 */

use std::mem::{align_of, size_of, MaybeUninit};
use std::ptr;

use thiserror::Error;

/// Task invocation errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// The task holds no target.
    #[error("task has no target")]
    Empty,
}

type InvokeFn<R> = unsafe fn(*mut u8) -> R;
type DropFn = unsafe fn(*mut u8);

/// A move-only container for one `FnOnce() -> R` target.
///
/// `WORDS` is the inline capacity in pointer words (one by default).
/// Targets that fit the inline buffer with pointer alignment are
/// stored in place; others are moved into a single heap cell whose
/// pointer occupies the buffer instead. Either way the task itself is
/// a flat `WORDS + 2` words and moves by memcpy.
///
/// Invocation consumes the task. A default-constructed task is empty
/// and reports [`TaskError::Empty`] instead of calling anything.
///
/// # Examples
///
/// ```
/// use corral::task::Task;
///
/// let task = Task::<u32>::new(|| 41 + 1);
/// assert_eq!(task.call(), Ok(42));
///
/// let empty = Task::<u32>::default();
/// assert!(empty.call().is_err());
/// ```
pub struct Task<R = (), const WORDS: usize = 1> {
    storage: MaybeUninit<[usize; WORDS]>,
    invoke: Option<InvokeFn<R>>,
    drop: Option<DropFn>,
}

// SAFETY: construction demands `Send` targets, and the erased pointers
// are only followed from the thread that owns the task.
unsafe impl<R, const WORDS: usize> Send for Task<R, WORDS> {}

impl<R, const WORDS: usize> Default for Task<R, WORDS> {
    fn default() -> Self {
        Self {
            storage: MaybeUninit::uninit(),
            invoke: None,
            drop: None,
        }
    }
}

impl<R, const WORDS: usize> Task<R, WORDS> {
    /// Inline buffer size in bytes.
    pub const INLINE_BYTES: usize = WORDS * size_of::<usize>();

    const fn fits_inline<F>() -> bool {
        size_of::<F>() <= Self::INLINE_BYTES && align_of::<F>() <= align_of::<usize>()
    }

    /// Wraps `target`, storing it inline when it fits.
    pub fn new<F>(target: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let mut storage = MaybeUninit::<[usize; WORDS]>::uninit();
        if Self::fits_inline::<F>() {
            // SAFETY: size and alignment were just checked.
            unsafe { storage.as_mut_ptr().cast::<F>().write(target) };
            Self {
                storage,
                invoke: Some(invoke_inline::<R, F>),
                drop: Some(drop_inline::<F>),
            }
        } else {
            let cell = Box::into_raw(Box::new(target));
            // SAFETY: the buffer always holds at least one word.
            unsafe { storage.as_mut_ptr().cast::<*mut F>().write(cell) };
            Self {
                storage,
                invoke: Some(invoke_boxed::<R, F>),
                drop: Some(drop_boxed::<F>),
            }
        }
    }

    /// Whether the task holds a target.
    pub fn is_empty(&self) -> bool {
        self.invoke.is_none()
    }

    /// Calls the target, consuming the task.
    pub fn call(mut self) -> Result<R, TaskError> {
        let invoke = self.invoke.take().ok_or(TaskError::Empty)?;
        // The target is consumed by the invoker; nothing left to drop.
        self.drop = None;
        // SAFETY: the invoker was chosen for the stored target type and
        // the storage is initialized whenever `invoke` is set.
        Ok(unsafe { invoke(self.storage.as_mut_ptr().cast()) })
    }
}

impl<R, const WORDS: usize> Drop for Task<R, WORDS> {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop {
            // SAFETY: a set drop hook witnesses an owned, un-consumed
            // target.
            unsafe { drop_fn(self.storage.as_mut_ptr().cast()) };
        }
    }
}

impl<R, const WORDS: usize> std::fmt::Debug for Task<R, WORDS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("empty", &self.is_empty())
            .field("inline_bytes", &Self::INLINE_BYTES)
            .finish()
    }
}

unsafe fn invoke_inline<R, F: FnOnce() -> R>(memory: *mut u8) -> R {
    // SAFETY: reads the target out of the inline buffer, leaving the
    // buffer logically uninitialized.
    let target = unsafe { memory.cast::<F>().read() };
    target()
}

unsafe fn invoke_boxed<R, F: FnOnce() -> R>(memory: *mut u8) -> R {
    // SAFETY: the buffer holds the cell pointer written at construction.
    let target = unsafe { Box::from_raw(memory.cast::<*mut F>().read()) };
    target()
}

unsafe fn drop_inline<F>(memory: *mut u8) {
    // SAFETY: the buffer holds an owned `F`.
    unsafe { ptr::drop_in_place(memory.cast::<F>()) };
}

unsafe fn drop_boxed<F>(memory: *mut u8) {
    // SAFETY: the buffer holds the cell pointer written at construction.
    drop(unsafe { Box::from_raw(memory.cast::<*mut F>().read()) });
}

/// A task for `Copy` targets only.
///
/// No heap path, no drop bookkeeping, and the target survives the
/// call, so a trivial task can be invoked any number of times. The
/// price of the stripped-down representation is that calling an empty
/// one panics rather than reporting an error.
pub struct TrivialTask<R = (), const WORDS: usize = 1> {
    storage: MaybeUninit<[usize; WORDS]>,
    invoke: Option<InvokeFn<R>>,
}

unsafe impl<R, const WORDS: usize> Send for TrivialTask<R, WORDS> {}

impl<R, const WORDS: usize> Default for TrivialTask<R, WORDS> {
    fn default() -> Self {
        Self {
            storage: MaybeUninit::uninit(),
            invoke: None,
        }
    }
}

impl<R, const WORDS: usize> TrivialTask<R, WORDS> {
    /// Wraps `target`. The target must fit the inline buffer.
    pub fn new<F>(target: F) -> Self
    where
        F: FnOnce() -> R + Copy + Send + 'static,
    {
        const {
            assert!(
                size_of::<F>() <= WORDS * size_of::<usize>(),
                "target exceeds the trivial task's inline buffer"
            );
            assert!(
                align_of::<F>() <= align_of::<usize>(),
                "target alignment exceeds pointer alignment"
            );
        }
        let mut storage = MaybeUninit::<[usize; WORDS]>::uninit();
        // SAFETY: size and alignment are checked at compile time.
        unsafe { storage.as_mut_ptr().cast::<F>().write(target) };
        Self {
            storage,
            invoke: Some(invoke_copied::<R, F>),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.invoke.is_none()
    }

    /// Calls the target.
    ///
    /// # Panics
    ///
    /// Panics if the task is empty.
    pub fn call(&self) -> R {
        let invoke = self.invoke.expect("trivial task has no target");
        // SAFETY: the invoker matches the stored target; `Copy` targets
        // may be read out any number of times.
        unsafe { invoke(self.storage.as_ptr() as *mut u8) }
    }
}

unsafe fn invoke_copied<R, F: FnOnce() -> R + Copy>(memory: *mut u8) -> R {
    // SAFETY: copies the target; the original stays in the buffer.
    let target = unsafe { memory.cast::<F>().read() };
    target()
}
