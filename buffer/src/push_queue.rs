//! Producer-paced fixed-size buffer queue.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::error::BufferError;
use crate::queue::BufferQueue;

/// A ring of `N` buffer slots where the producer decides when a buffer is
/// ready.
///
/// The producer fills a slot and commits it; the consumer receives committed
/// slots in FIFO order. Writing blocks while all `N` slots hold unread
/// buffers and reading blocks while none do, so a slow consumer pushes back
/// on the producer.
///
/// # Semantics
///
/// - **Write**: blocks when full, constructs a fresh `B::default()` in the slot
/// - **Read**: blocks when empty, returns the oldest committed buffer
/// - **Finish read**: drops the buffer, freeing the slot
/// - **Interrupt**: aborts a blocked read with [`BufferError::Interrupted`]
///
/// # Example
///
/// ```
/// use rabotnik_buffer::PushBufferQueue;
/// use std::sync::Arc;
/// use std::thread;
///
/// let queue = Arc::new(PushBufferQueue::<Vec<u32>, 3>::new());
/// let producer_queue = Arc::clone(&queue);
///
/// let producer = thread::spawn(move || {
///     for i in 0..10 {
///         let mut buf = producer_queue.begin_writing();
///         buf.push(i);
///         buf.finish();
///     }
/// });
///
/// let mut seen = Vec::new();
/// for _ in 0..10 {
///     let buf = queue.begin_reading().unwrap();
///     seen.extend_from_slice(&buf);
///     buf.finish();
/// }
///
/// producer.join().unwrap();
/// assert_eq!(seen, (0..10).collect::<Vec<_>>());
/// ```
pub struct PushBufferQueue<B, const N: usize> {
    slots: Box<[UnsafeCell<MaybeUninit<B>>]>,
    state: Mutex<PushState>,
    changed: Condvar,
    write_cursor: Mutex<usize>,
    read_cursor: Mutex<usize>,
}

struct PushState {
    full: usize, // committed, unread buffers
    interrupted: bool,
}

// Slots are only reached through the cursor locks: the writer touches the slot
// at its cursor while `full < N`, the reader the slot at its cursor while
// `full > 0`, and those two slots never coincide.
unsafe impl<B: Send, const N: usize> Sync for PushBufferQueue<B, N> {}

impl<B, const N: usize> PushBufferQueue<B, N> {
    /// Creates a queue with `N` empty slots.
    pub fn new() -> Self {
        const { assert!(N > 0, "PushBufferQueue needs at least one slot") };
        let slots = (0..N)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        PushBufferQueue {
            slots,
            state: Mutex::new(PushState {
                full: 0,
                interrupted: false,
            }),
            changed: Condvar::new(),
            write_cursor: Mutex::new(0),
            read_cursor: Mutex::new(0),
        }
    }

    /// Returns the number of committed buffers not yet read.
    pub fn len(&self) -> usize {
        self.state.lock().full
    }

    /// Returns the number of slots.
    pub fn capacity(&self) -> usize {
        N
    }

    /// Returns true if no committed buffer is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the next [`begin_writing`](Self::begin_writing) would
    /// block.
    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Returns the oldest committed buffer.
    ///
    /// Blocks while the queue is empty. Returns
    /// [`BufferError::Interrupted`] if [`interrupt_reader`](Self::interrupt_reader)
    /// is called while blocked, or was called since the last blocking read.
    pub fn begin_reading(&self) -> Result<PushReadGuard<'_, B, N>, BufferError> {
        let cursor = self.read_cursor.lock();
        let mut state = self.state.lock();
        while state.full == 0 {
            if state.interrupted {
                state.interrupted = false;
                trace!("push queue: read interrupted");
                return Err(BufferError::Interrupted);
            }
            self.changed.wait(&mut state);
        }
        drop(state);

        Ok(PushReadGuard {
            queue: self,
            cursor,
        })
    }

    /// Aborts the reader's current or next blocking wait.
    pub fn interrupt_reader(&self) {
        let mut state = self.state.lock();
        state.interrupted = true;
        drop(state);
        self.changed.notify_all();
    }

    /// Discards a pending [`interrupt_reader`](Self::interrupt_reader) that no
    /// blocking read has consumed.
    pub fn clear_interrupt(&self) {
        self.state.lock().interrupted = false;
    }

    fn slot(&self, index: usize) -> *mut MaybeUninit<B> {
        self.slots[index].get()
    }
}

impl<B: Default, const N: usize> PushBufferQueue<B, N> {
    /// Returns a freshly constructed buffer in the next free slot.
    ///
    /// Blocks while all slots hold unread buffers. The buffer is handed to the
    /// reader when the guard is finished or dropped.
    pub fn begin_writing(&self) -> PushWriteGuard<'_, B, N> {
        let cursor = self.write_cursor.lock();
        let mut state = self.state.lock();
        while state.full == N {
            self.changed.wait(&mut state);
        }
        drop(state);

        // SAFETY: `full < N`, so the slot at the write cursor is not committed
        // and the reader cannot be looking at it.
        unsafe {
            (*self.slot(*cursor)).write(B::default());
        }

        PushWriteGuard {
            queue: self,
            cursor,
        }
    }
}

impl<B, const N: usize> Default for PushBufferQueue<B, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B, const N: usize> fmt::Debug for PushBufferQueue<B, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushBufferQueue")
            .field("capacity", &N)
            .field("len", &self.len())
            .finish()
    }
}

impl<B, const N: usize> Drop for PushBufferQueue<B, N> {
    fn drop(&mut self) {
        let full = self.state.get_mut().full;
        let mut index = *self.read_cursor.get_mut();
        if full > 0 {
            debug!(pending = full, "push queue: dropping unread buffers");
        }
        for _ in 0..full {
            // SAFETY: the `full` slots starting at the read cursor hold
            // committed buffers that no guard refers to any more.
            unsafe {
                self.slots[index].get_mut().assume_init_drop();
            }
            index = (index + 1) % N;
        }
    }
}

impl<B: Default + Send, const N: usize> BufferQueue for PushBufferQueue<B, N> {
    type Buffer = B;
    type WriteGuard<'a>
        = PushWriteGuard<'a, B, N>
    where
        Self: 'a;
    type ReadGuard<'a>
        = PushReadGuard<'a, B, N>
    where
        Self: 'a;

    fn begin_writing(&self) -> Result<Self::WriteGuard<'_>, BufferError> {
        Ok(PushBufferQueue::begin_writing(self))
    }

    fn begin_reading(&self) -> Result<Self::ReadGuard<'_>, BufferError> {
        PushBufferQueue::begin_reading(self)
    }

    fn interrupt_reader(&self) {
        PushBufferQueue::interrupt_reader(self);
    }

    fn clear_interrupt(&self) {
        PushBufferQueue::clear_interrupt(self);
    }
}

/// The slot being filled by the producer.
///
/// Finishing or dropping the guard commits the buffer.
pub struct PushWriteGuard<'a, B, const N: usize> {
    queue: &'a PushBufferQueue<B, N>,
    cursor: MutexGuard<'a, usize>,
}

impl<B, const N: usize> PushWriteGuard<'_, B, N> {
    /// Commits the buffer and wakes the reader.
    pub fn finish(self) {}
}

impl<B, const N: usize> Deref for PushWriteGuard<'_, B, N> {
    type Target = B;

    fn deref(&self) -> &B {
        // SAFETY: `begin_writing` initialized the slot and the write cursor
        // lock held by this guard keeps it exclusive.
        unsafe { (*self.queue.slot(*self.cursor)).assume_init_ref() }
    }
}

impl<B, const N: usize> DerefMut for PushWriteGuard<'_, B, N> {
    fn deref_mut(&mut self) -> &mut B {
        // SAFETY: see `deref`.
        unsafe { (*self.queue.slot(*self.cursor)).assume_init_mut() }
    }
}

impl<B, const N: usize> Drop for PushWriteGuard<'_, B, N> {
    fn drop(&mut self) {
        *self.cursor = (*self.cursor + 1) % N;
        let mut state = self.queue.state.lock();
        state.full += 1;
        drop(state);
        self.queue.changed.notify_one();
    }
}

/// The oldest committed buffer, held by the consumer.
///
/// Finishing or dropping the guard destroys the buffer and frees the slot.
pub struct PushReadGuard<'a, B, const N: usize> {
    queue: &'a PushBufferQueue<B, N>,
    cursor: MutexGuard<'a, usize>,
}

impl<B, const N: usize> PushReadGuard<'_, B, N> {
    /// Destroys the buffer and wakes the producer.
    pub fn finish(self) {}
}

impl<B, const N: usize> Deref for PushReadGuard<'_, B, N> {
    type Target = B;

    fn deref(&self) -> &B {
        // SAFETY: `begin_reading` saw `full > 0`, so the slot at the read
        // cursor is committed; the read cursor lock keeps it exclusive.
        unsafe { (*self.queue.slot(*self.cursor)).assume_init_ref() }
    }
}

impl<B, const N: usize> DerefMut for PushReadGuard<'_, B, N> {
    fn deref_mut(&mut self) -> &mut B {
        // SAFETY: see `deref`.
        unsafe { (*self.queue.slot(*self.cursor)).assume_init_mut() }
    }
}

impl<B, const N: usize> Drop for PushReadGuard<'_, B, N> {
    fn drop(&mut self) {
        // SAFETY: the slot is committed and nobody else refers to it.
        unsafe {
            (*self.queue.slot(*self.cursor)).assume_init_drop();
        }
        *self.cursor = (*self.cursor + 1) % N;
        let mut state = self.queue.state.lock();
        state.full -= 1;
        drop(state);
        self.queue.changed.notify_one();
    }
}
