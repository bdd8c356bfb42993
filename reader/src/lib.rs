//! Managed reader lifecycles for buffer queues.
//!
//! A reader hosts a user handler and feeds it buffers taken from a
//! [`BufferQueue`]. Two drivers share the same per-buffer step:
//!
//! - [`ReaderThread`]: owns a worker thread that loops over the queue
//! - [`CallbackReader`]: processes one buffer per call from an external
//!   driver, which a [`CallbackManager`] starts and stops
//!
//! Both move through the [`ReaderState`] lifecycle
//! `Stopped → Starting → Running → Stopping → Stopped`, held in a
//! [`StateManager`] that callers can block on.
//!
//! Handlers implement [`BufferHandler`], or [`TimedBufferHandler`] to also get
//! the microseconds since their previous call. The reader type picks the
//! matching dispatcher, [`Untimed`] or [`Timed`].
//!
//! # Example
//!
//! ```
//! use rabotnik_reader::{
//!     BufferHandler, PushBufferQueue, ReaderState, ReaderThread, Untimed,
//! };
//!
//! #[derive(Default)]
//! struct Peak(i16);
//!
//! impl BufferHandler<Vec<i16>> for Peak {
//!     fn process_buffer(&mut self, buffer: &mut Vec<i16>) {
//!         for &sample in buffer.iter() {
//!             self.0 = self.0.max(sample);
//!         }
//!     }
//! }
//!
//! let reader: ReaderThread<PushBufferQueue<Vec<i16>, 2>, Untimed<Peak>> =
//!     ReaderThread::default();
//! reader.start().unwrap();
//!
//! reader.begin_writing().unwrap().extend([3, 9, -4]);
//!
//! // Wait until the buffer has been consumed, then shut down
//! while !reader.queue().is_empty() {
//!     std::thread::yield_now();
//! }
//! reader.interrupt();
//! reader.join().unwrap();
//!
//! assert_eq!(reader.state(), ReaderState::Stopped);
//! assert_eq!(reader.with_handler(|peak| peak.0), 9);
//! ```

mod callback;
mod dispatch;
mod error;
mod options;
mod reader_core;
mod reader_thread;
mod state;

pub use callback::{CallbackManager, CallbackReader};
pub use dispatch::{BufferHandler, Dispatch, Timed, TimedBufferHandler, Untimed};
pub use error::{ReaderError, Result};
pub use options::{DEFAULT_THREAD_NAME, ReaderOptions};
pub use reader_thread::ReaderThread;
pub use state::{ReaderState, StateManager};

pub use rabotnik_buffer::{
    BufferError, BufferQueue, FixedQueue, PullBufferQueue, PushBufferQueue,
};
