//! The buffer queue capability shared by push and pull queues.

use std::ops::DerefMut;

use crate::error::BufferError;

/// A single-producer single-consumer queue of pre-allocated buffer slots.
///
/// A queue owns its slots. The producer gets exclusive access to one slot
/// between [`begin_writing`](Self::begin_writing) and
/// [`finish_writing`](Self::finish_writing), the consumer likewise between
/// [`begin_reading`](Self::begin_reading) and
/// [`finish_reading`](Self::finish_reading). The bracket is a guard value:
/// dropping the guard is the same as calling the matching `finish_*`, and the
/// slot cannot be touched after it.
///
/// Readers are generic over this trait, so a substitute queue that does not
/// provide the four operations is rejected when the program is built.
pub trait BufferQueue: Default + Send + Sync {
    /// The payload stored in every slot.
    type Buffer: Default + Send;

    /// Exclusive access to the slot being written.
    type WriteGuard<'a>: DerefMut<Target = Self::Buffer>
    where
        Self: 'a;

    /// Exclusive access to the slot being read.
    type ReadGuard<'a>: DerefMut<Target = Self::Buffer>
    where
        Self: 'a;

    /// Returns the next slot to fill, blocking while the queue cannot take it.
    fn begin_writing(&self) -> Result<Self::WriteGuard<'_>, BufferError>;

    /// Hands the slot returned by [`begin_writing`](Self::begin_writing) over
    /// to the consumer side.
    fn finish_writing(guard: Self::WriteGuard<'_>) {
        drop(guard);
    }

    /// Returns the next slot to consume, blocking while none is available.
    fn begin_reading(&self) -> Result<Self::ReadGuard<'_>, BufferError>;

    /// Releases the slot returned by [`begin_reading`](Self::begin_reading)
    /// back to the producer side.
    fn finish_reading(guard: Self::ReadGuard<'_>) {
        drop(guard);
    }

    /// Aborts a blocked [`begin_reading`](Self::begin_reading) with
    /// [`BufferError::Interrupted`].
    ///
    /// Queues whose read side never blocks on data may ignore this.
    fn interrupt_reader(&self) {}

    /// Discards an interrupt that no read has consumed yet.
    fn clear_interrupt(&self) {}
}
