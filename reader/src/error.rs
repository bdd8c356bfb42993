//! Error types for reader lifecycle operations.

use std::io;

use rabotnik_buffer::BufferError;
use thiserror::Error;

use crate::state::ReaderState;

/// Errors returned by reader operations.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The operation is not allowed in the reader's current state, e.g.
    /// `start()` on a reader that is already running.
    #[error("reader: invalid state, expected {expected} but was {actual}")]
    InvalidState {
        expected: ReaderState,
        actual: ReaderState,
    },

    /// The operating system refused to create the worker thread.
    #[error("reader: failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    /// The handler panicked on the worker thread.
    #[error("reader: handler panicked")]
    Panicked,

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

pub type Result<T> = std::result::Result<T, ReaderError>;
