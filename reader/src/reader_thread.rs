//! A reader that owns its processing thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use rabotnik_buffer::{BufferError, BufferQueue};
use tracing::{debug, trace, warn};

use crate::dispatch::Dispatch;
use crate::error::{ReaderError, Result};
use crate::options::ReaderOptions;
use crate::reader_core::ReaderCore;
use crate::state::ReaderState;

/// A worker thread that takes buffers from a queue and feeds them to a
/// handler.
///
/// The reader owns the queue and the handler. Producers write through
/// [`begin_writing`](Self::begin_writing); the worker started by
/// [`start`](Self::start) reads, calls the handler, and finishes each buffer
/// until it is stopped.
///
/// # Stopping
///
/// - [`stop`](Self::stop) only asks the worker to leave its loop. A worker
///   waiting on an empty [`PushBufferQueue`] notices on the next buffer.
/// - [`interrupt`](Self::interrupt) also aborts that wait, so the worker exits
///   even if nothing more is produced.
///
/// A buffer that reached the handler is always processed completely.
///
/// Dropping the reader shuts the worker down and joins it, whatever state it
/// is in.
///
/// # Example
///
/// ```
/// use rabotnik_buffer::PushBufferQueue;
/// use rabotnik_reader::{BufferHandler, ReaderState, ReaderThread, Untimed};
///
/// #[derive(Default)]
/// struct Sum(u64);
///
/// impl BufferHandler<Vec<u32>> for Sum {
///     fn process_buffer(&mut self, buffer: &mut Vec<u32>) {
///         self.0 += buffer.iter().map(|&v| v as u64).sum::<u64>();
///     }
/// }
///
/// let reader: ReaderThread<PushBufferQueue<Vec<u32>, 4>, Untimed<Sum>> =
///     ReaderThread::default();
/// reader.start().unwrap();
/// reader.wait_for_state(ReaderState::Running);
///
/// reader.begin_writing().unwrap().extend([1, 2, 3]);
///
/// reader.interrupt();
/// reader.join().unwrap();
/// ```
///
/// [`PushBufferQueue`]: rabotnik_buffer::PushBufferQueue
pub struct ReaderThread<Q, D>
where
    Q: BufferQueue,
    D: Dispatch<Q::Buffer>,
{
    core: Arc<ReaderCore<Q, D>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    options: ReaderOptions,
}

impl<Q, D> ReaderThread<Q, D>
where
    Q: BufferQueue,
    D: Dispatch<Q::Buffer>,
{
    /// Creates a stopped reader hosting `dispatch`.
    pub fn new(dispatch: D) -> Self {
        Self::with_options(dispatch, ReaderOptions::default())
    }

    /// Creates a stopped reader whose worker uses `options`.
    pub fn with_options(dispatch: D, options: ReaderOptions) -> Self {
        ReaderThread {
            core: Arc::new(ReaderCore::new(dispatch)),
            worker: Mutex::new(None),
            options,
        }
    }

    /// Requests the worker to stop after the current buffer.
    ///
    /// Does not wake a worker that is waiting for a buffer.
    pub fn stop(&self) {
        let requested = self.core.state.transition_if(
            |state| matches!(state, ReaderState::Starting | ReaderState::Running),
            ReaderState::Stopping,
        );
        if let Ok(previous) = requested {
            debug!(reader = self.options.thread_name(), from = %previous, "reader: stop requested");
        }
    }

    /// Requests the worker to stop and aborts its wait for a buffer.
    pub fn interrupt(&self) {
        self.stop();
        if self.core.state.state() != ReaderState::Stopped {
            self.core.queue.interrupt_reader();
        }
    }

    /// Blocks until the worker thread has returned.
    ///
    /// Returns immediately if no worker was started. Fails with
    /// [`ReaderError::Panicked`] if the handler panicked.
    pub fn join(&self) -> Result<()> {
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => handle.join().map_err(|_| ReaderError::Panicked),
            None => Ok(()),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ReaderState {
        self.core.state.state()
    }

    /// Blocks the caller until the reader reaches `target`.
    pub fn wait_for_state(&self, target: ReaderState) {
        self.core.state.wait_for_state(target);
    }

    /// Like [`wait_for_state`](Self::wait_for_state) with a timeout. Returns
    /// true if `target` was reached.
    pub fn wait_for_state_timeout(&self, target: ReaderState, timeout: Duration) -> bool {
        self.core.state.wait_for_state_timeout(target, timeout)
    }

    /// Returns the next slot for the producer.
    pub fn begin_writing(&self) -> Result<Q::WriteGuard<'_>> {
        Ok(self.core.queue.begin_writing()?)
    }

    /// Hands a slot returned by [`begin_writing`](Self::begin_writing) to the
    /// worker. Dropping the guard does the same.
    pub fn finish_writing(&self, guard: Q::WriteGuard<'_>) {
        Q::finish_writing(guard);
    }

    /// Returns the queue.
    pub fn queue(&self) -> &Q {
        &self.core.queue
    }

    /// Runs `f` with the handler.
    ///
    /// While running, the worker holds the handler only for the duration of
    /// one buffer, so this waits at most for the buffer in progress.
    pub fn with_handler<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut D::Handler) -> R,
    {
        self.core.with_handler(f)
    }

    /// Returns the options the worker thread is spawned with.
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }
}

impl<Q, D> ReaderThread<Q, D>
where
    Q: BufferQueue + 'static,
    D: Dispatch<Q::Buffer> + 'static,
{
    /// Starts the worker thread.
    ///
    /// Fails with [`ReaderError::InvalidState`] unless the reader is
    /// [`ReaderState::Stopped`].
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        self.core
            .state
            .transition(ReaderState::Stopped, ReaderState::Starting)
            .map_err(|actual| ReaderError::InvalidState {
                expected: ReaderState::Stopped,
                actual,
            })?;

        // An interrupt aimed at the previous run must not abort this one.
        self.core.queue.clear_interrupt();

        // A previous worker has already set Stopped; reap it.
        if let Some(stale) = worker.take() {
            if stale.join().is_err() {
                warn!(reader = self.options.thread_name(), "reader: previous worker had panicked");
            }
        }

        let mut builder = thread::Builder::new().name(self.options.thread_name().to_string());
        if let Some(bytes) = self.options.stack_size {
            builder = builder.stack_size(bytes);
        }

        let core = Arc::clone(&self.core);
        match builder.spawn(move || run(&core)) {
            Ok(handle) => {
                *worker = Some(handle);
                debug!(reader = self.options.thread_name(), "reader: started");
                Ok(())
            }
            Err(e) => {
                self.core.state.set_state(ReaderState::Stopped);
                Err(ReaderError::Spawn(e))
            }
        }
    }
}

impl<Q, D> Default for ReaderThread<Q, D>
where
    Q: BufferQueue,
    D: Dispatch<Q::Buffer> + Default,
{
    fn default() -> Self {
        Self::new(D::default())
    }
}

impl<Q, D> Drop for ReaderThread<Q, D>
where
    Q: BufferQueue,
    D: Dispatch<Q::Buffer>,
{
    fn drop(&mut self) {
        match self.core.state.state() {
            ReaderState::Stopped => {}
            ReaderState::Starting => {
                self.core.state.wait_while(|state| state == ReaderState::Starting);
                self.interrupt();
            }
            ReaderState::Running => {
                debug!(reader = self.options.thread_name(), "reader: dropped while running");
                self.interrupt();
            }
            ReaderState::Stopping => {
                // A plain stop() leaves the worker parked on an empty queue;
                // wake it so the join below cannot hang.
                self.core.queue.interrupt_reader();
            }
        }
        if let Err(err) = self.join() {
            warn!(reader = self.options.thread_name(), %err, "reader: worker ended abnormally");
        }
    }
}

/// The worker thread body.
fn run<Q, D>(core: &ReaderCore<Q, D>)
where
    Q: BufferQueue,
    D: Dispatch<Q::Buffer>,
{
    let _exit = ExitGuard { core };

    core.initialize();
    if let Err(state) = core.state.transition(ReaderState::Starting, ReaderState::Running) {
        debug!(%state, "reader: stopped before running");
        return;
    }
    debug!("reader: running");

    while core.state.state() == ReaderState::Running {
        match core.process_one() {
            Ok(()) => {}
            Err(BufferError::Interrupted) => trace!("reader: wait interrupted"),
            Err(err) => {
                warn!(%err, "reader: queue failed, leaving loop");
                break;
            }
        }
    }
}

/// Uninitializes the handler and publishes `Stopped` when the worker leaves
/// `run`, including by panic.
struct ExitGuard<'a, Q, D>
where
    Q: BufferQueue,
    D: Dispatch<Q::Buffer>,
{
    core: &'a ReaderCore<Q, D>,
}

impl<Q, D> Drop for ExitGuard<'_, Q, D>
where
    Q: BufferQueue,
    D: Dispatch<Q::Buffer>,
{
    fn drop(&mut self) {
        if thread::panicking() {
            // The handler may be mid-update; skip its hook.
            warn!("reader: handler panicked");
            self.core.abandon();
        } else {
            self.core.uninitialize();
        }
        self.core.state.set_state(ReaderState::Stopped);
        debug!("reader: stopped");
    }
}
