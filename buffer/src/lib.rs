//! Single-producer single-consumer buffer queues.
//!
//! This crate provides queues of pre-allocated buffer slots for handing whole
//! buffers from one producer to one consumer. Both sides work on a slot in
//! place between a `begin_*` call and the matching `finish_*`, so buffers are
//! never copied or moved through the queue.
//!
//! - [`PushBufferQueue<B, N>`]: `N` slots, the producer decides when a buffer is
//!   ready, FIFO with backpressure
//! - [`PullBufferQueue<B>`]: two slots, the consumer decides when to swap to the
//!   latest buffer, no backpressure
//! - [`FixedQueue<T, N>`]: a fixed-capacity container suitable as the payload
//!
//! Both queues implement [`BufferQueue`], the capability the readers in
//! `rabotnik-reader` are generic over.
//!
//! # Push or Pull
//!
//! ## PushBufferQueue (producer paced)
//!
//! Every committed buffer is delivered, in order. A producer that runs ahead
//! of the consumer by `N` buffers blocks until one is consumed.
//!
//! ```
//! use rabotnik_buffer::PushBufferQueue;
//!
//! let queue = PushBufferQueue::<Vec<i16>, 4>::new();
//! queue.begin_writing().extend([1, 2, 3]);
//!
//! let buf = queue.begin_reading().unwrap();
//! assert_eq!(*buf, vec![1, 2, 3]);
//! buf.finish();
//! ```
//!
//! ## PullBufferQueue (consumer paced)
//!
//! The producer appends to the current slot for as long as it likes; the
//! consumer swaps whenever it wants the latest data. Suited to a hardware or
//! driver callback that must never wait.
//!
//! ```
//! use rabotnik_buffer::PullBufferQueue;
//!
//! let queue = PullBufferQueue::<Vec<i16>>::new();
//! queue.begin_writing().unwrap().push(1);
//! queue.begin_writing().unwrap().push(2);
//!
//! assert_eq!(*queue.begin_reading(), vec![1, 2]);
//! ```
//!
//! # Thread Safety
//!
//! Queues are `Send + Sync` when the buffer type is `Send`. Share them with
//! `Arc` or by reference. Concurrent producers (or consumers) are serialized,
//! so misuse costs throughput, never memory safety.

mod error;
mod fixed_queue;
mod pull_queue;
mod push_queue;
mod queue;

pub use error::BufferError;
pub use fixed_queue::{FixedQueue, FixedQueueWriter};
pub use pull_queue::{PullBufferQueue, PullReadGuard, PullWriteGuard};
pub use push_queue::{PushBufferQueue, PushReadGuard, PushWriteGuard};
pub use queue::BufferQueue;
