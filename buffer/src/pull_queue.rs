//! Consumer-paced double buffer.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::trace;

use crate::error::BufferError;
use crate::queue::BufferQueue;

/// A two-slot buffer queue where the consumer decides when a buffer is ready.
///
/// The producer keeps writing into the current write slot, as often as it
/// likes. When the consumer calls [`begin_reading`](Self::begin_reading) the
/// slots swap: the consumer gets everything written since the previous swap
/// and the producer continues in the other, freshly reset slot.
///
/// There is no "full" state, so writing never waits for the consumer, and
/// there is no history beyond one generation. A driver that always wants the
/// latest complete buffer gets it with minimal latency.
///
/// # Semantics
///
/// - **Write**: waits only while another thread is writing; a nested write on
///   the same thread fails with [`BufferError::ReentrantWrite`]
/// - **Read**: waits for an in-progress write to finish, then swaps
/// - **Finish read**: resets the consumed slot to `B::default()`
///
/// # Example
///
/// ```
/// use rabotnik_buffer::PullBufferQueue;
///
/// let queue = PullBufferQueue::<Vec<u32>>::new();
///
/// for i in 0..3 {
///     let mut buf = queue.begin_writing().unwrap();
///     buf.push(i);
///     buf.finish();
/// }
///
/// let buf = queue.begin_reading();
/// assert_eq!(*buf, vec![0, 1, 2]);
/// buf.finish();
///
/// // The next generation starts empty
/// assert!(queue.begin_reading().is_empty());
/// ```
pub struct PullBufferQueue<B> {
    slots: [UnsafeCell<B>; 2],
    state: Mutex<PullState>,
    writer_done: Condvar,
    read_cursor: Mutex<()>,
}

struct PullState {
    write_index: usize,
    writer: Option<ThreadId>,
}

// The writer only touches `slots[write_index]` while marked as writer, and the
// index is flipped by the reader only while no writer is marked. The reader
// owns the other slot until its guard is dropped.
unsafe impl<B: Send> Sync for PullBufferQueue<B> {}

impl<B: Default> PullBufferQueue<B> {
    /// Creates a queue with two default-constructed slots.
    pub fn new() -> Self {
        PullBufferQueue {
            slots: [UnsafeCell::new(B::default()), UnsafeCell::new(B::default())],
            state: Mutex::new(PullState {
                write_index: 0,
                writer: None,
            }),
            writer_done: Condvar::new(),
            read_cursor: Mutex::new(()),
        }
    }

    /// Returns the current write slot.
    ///
    /// Waits while another thread holds the write slot. Fails with
    /// [`BufferError::ReentrantWrite`] if this thread already holds it.
    pub fn begin_writing(&self) -> Result<PullWriteGuard<'_, B>, BufferError> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.writer {
                Some(id) if id == me => return Err(BufferError::ReentrantWrite),
                Some(_) => self.writer_done.wait(&mut state),
                None => break,
            }
        }
        state.writer = Some(me);

        Ok(PullWriteGuard {
            queue: self,
            index: state.write_index,
        })
    }

    /// Swaps the slots and returns the one that was just written.
    ///
    /// Waits only while a write is in progress.
    pub fn begin_reading(&self) -> PullReadGuard<'_, B> {
        let cursor = self.read_cursor.lock();
        let mut state = self.state.lock();
        while state.writer.is_some() {
            self.writer_done.wait(&mut state);
        }
        let index = state.write_index;
        state.write_index ^= 1;
        drop(state);
        trace!(slot = index, "pull queue: swapped");

        PullReadGuard {
            queue: self,
            index,
            _cursor: cursor,
        }
    }
}

impl<B> PullBufferQueue<B> {
    /// Returns true if a producer currently holds the write slot.
    pub fn is_writing(&self) -> bool {
        self.state.lock().writer.is_some()
    }

    fn slot(&self, index: usize) -> *mut B {
        self.slots[index].get()
    }
}

impl<B: Default> Default for PullBufferQueue<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> fmt::Debug for PullBufferQueue<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PullBufferQueue")
            .field("write_index", &state.write_index)
            .field("writing", &state.writer.is_some())
            .finish()
    }
}

impl<B: Default + Send> BufferQueue for PullBufferQueue<B> {
    type Buffer = B;
    type WriteGuard<'a>
        = PullWriteGuard<'a, B>
    where
        Self: 'a;
    type ReadGuard<'a>
        = PullReadGuard<'a, B>
    where
        Self: 'a;

    fn begin_writing(&self) -> Result<Self::WriteGuard<'_>, BufferError> {
        PullBufferQueue::begin_writing(self)
    }

    fn begin_reading(&self) -> Result<Self::ReadGuard<'_>, BufferError> {
        Ok(PullBufferQueue::begin_reading(self))
    }
}

/// The current write slot of a [`PullBufferQueue`].
///
/// Finishing or dropping the guard releases the slot. The content stays in
/// place and is extended by the next write until the consumer swaps.
pub struct PullWriteGuard<'a, B> {
    queue: &'a PullBufferQueue<B>,
    index: usize,
}

impl<B> PullWriteGuard<'_, B> {
    /// Releases the write slot.
    pub fn finish(self) {}
}

impl<B> Deref for PullWriteGuard<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        // SAFETY: this guard's thread is the marked writer, so the index cannot
        // flip and the reader holds the other slot.
        unsafe { &*self.queue.slot(self.index) }
    }
}

impl<B> DerefMut for PullWriteGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        // SAFETY: see `deref`.
        unsafe { &mut *self.queue.slot(self.index) }
    }
}

impl<B> Drop for PullWriteGuard<'_, B> {
    fn drop(&mut self) {
        let mut state = self.queue.state.lock();
        state.writer = None;
        drop(state);
        self.queue.writer_done.notify_all();
    }
}

/// The generation most recently completed by the producer.
///
/// Finishing or dropping the guard resets the slot for the next generation.
pub struct PullReadGuard<'a, B: Default> {
    queue: &'a PullBufferQueue<B>,
    index: usize,
    _cursor: MutexGuard<'a, ()>,
}

impl<B: Default> PullReadGuard<'_, B> {
    /// Resets the slot and releases it to the producer side.
    pub fn finish(self) {}
}

impl<B: Default> Deref for PullReadGuard<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        // SAFETY: the slot was swapped out of the writer's reach and only the
        // holder of the read cursor can swap it back.
        unsafe { &*self.queue.slot(self.index) }
    }
}

impl<B: Default> DerefMut for PullReadGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        // SAFETY: see `deref`.
        unsafe { &mut *self.queue.slot(self.index) }
    }
}

impl<B: Default> Drop for PullReadGuard<'_, B> {
    fn drop(&mut self) {
        // SAFETY: see `deref`; `_cursor` is still held here.
        unsafe {
            *self.queue.slot(self.index) = B::default();
        }
    }
}
