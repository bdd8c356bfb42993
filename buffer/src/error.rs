//! Error types for buffer queue operations.

use thiserror::Error;

/// Buffer operation error.
///
/// Queue operations block rather than fail, so the variants here cover the
/// few conditions that must be surfaced to the caller instead of waited out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// A blocking read was aborted by [`BufferQueue::interrupt_reader`].
    ///
    /// [`BufferQueue::interrupt_reader`]: crate::BufferQueue::interrupt_reader
    #[error("buffer: wait interrupted")]
    Interrupted,

    /// The calling thread already holds the write slot of a pull queue.
    #[error("buffer: write already in progress on this thread")]
    ReentrantWrite,

    /// A fixed-capacity container received a write beyond its capacity.
    #[error("buffer: overflow, capacity is {capacity}")]
    Overflow { capacity: usize },
}
