//! A reader stepped by an external driver instead of an owned thread.
//!
//! Audio and capture drivers usually own the thread that should do the
//! processing and call into the application once per period. A
//! [`CallbackReader`] wraps the same queue, state and handler as a
//! [`ReaderThread`](crate::ReaderThread), but processes one buffer per
//! [`callback`](CallbackReader::callback) invocation. Starting and stopping
//! that driver is delegated to a [`CallbackManager`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use rabotnik_buffer::{BufferError, BufferQueue};
use tracing::{debug, trace, warn};

use crate::dispatch::Dispatch;
use crate::error::{ReaderError, Result};
use crate::reader_core::ReaderCore;
use crate::state::ReaderState;

/// Starts and stops the external driver that calls
/// [`CallbackReader::callback`].
pub trait CallbackManager {
    /// Asks the driver to begin calling back.
    fn start_callback(&self);

    /// Asks the driver to stop calling back.
    ///
    /// Called from inside the driver's last `callback()`, so implementations
    /// must not wait for the driver to finish.
    fn stop_callback(&self);
}

impl<T: CallbackManager + ?Sized> CallbackManager for &T {
    fn start_callback(&self) {
        (**self).start_callback();
    }

    fn stop_callback(&self) {
        (**self).stop_callback();
    }
}

impl<T: CallbackManager + ?Sized> CallbackManager for Arc<T> {
    fn start_callback(&self) {
        (**self).start_callback();
    }

    fn stop_callback(&self) {
        (**self).stop_callback();
    }
}

/// Lets the manager own the reader. Calls are skipped once the manager is
/// gone.
impl<T: CallbackManager + ?Sized> CallbackManager for Weak<T> {
    fn start_callback(&self) {
        match self.upgrade() {
            Some(manager) => manager.start_callback(),
            None => debug!("callback manager: gone, start skipped"),
        }
    }

    fn stop_callback(&self) {
        match self.upgrade() {
            Some(manager) => manager.stop_callback(),
            None => debug!("callback manager: gone, stop skipped"),
        }
    }
}

/// A reader whose processing step is invoked by an external driver.
///
/// [`start`](Self::start) asks the manager to begin calling back. Each
/// [`callback`](Self::callback) then handles at most one buffer. The call that
/// sees [`ReaderState::Starting`] runs the initialize hook and also processes
/// a buffer, so nothing is skipped across the transition. After
/// [`stop`](Self::stop), the next callback runs the uninitialize hook, tells
/// the manager to stop and publishes [`ReaderState::Stopped`].
///
/// With a [`PushBufferQueue`] a callback blocks until the producer commits a
/// buffer; with a [`PullBufferQueue`] it takes whatever was last written.
///
/// [`PushBufferQueue`]: rabotnik_buffer::PushBufferQueue
/// [`PullBufferQueue`]: rabotnik_buffer::PullBufferQueue
pub struct CallbackReader<Q, D, M>
where
    Q: BufferQueue,
    D: Dispatch<Q::Buffer>,
    M: CallbackManager,
{
    core: ReaderCore<Q, D>,
    manager: M,
}

impl<Q, D, M> CallbackReader<Q, D, M>
where
    Q: BufferQueue,
    D: Dispatch<Q::Buffer>,
    M: CallbackManager,
{
    /// Creates a stopped reader. The manager is not called until [`start`](Self::start).
    pub fn new(dispatch: D, manager: M) -> Self {
        CallbackReader {
            core: ReaderCore::new(dispatch),
            manager,
        }
    }

    /// Runs one step of the reader. Called by the driver.
    pub fn callback(&self) {
        match self.core.state.state() {
            ReaderState::Stopped => {}
            ReaderState::Starting => {
                self.core.initialize();
                match self
                    .core
                    .state
                    .transition(ReaderState::Starting, ReaderState::Running)
                {
                    Ok(()) => {
                        debug!("callback reader: running");
                        self.step();
                    }
                    // Stopped while initializing; the next callback shuts down.
                    Err(state) => debug!(%state, "callback reader: stopped before running"),
                }
            }
            ReaderState::Running => self.step(),
            ReaderState::Stopping => self.shut_down(),
        }
    }

    /// Moves to [`ReaderState::Starting`] and asks the manager to start the
    /// driver.
    ///
    /// Fails with [`ReaderError::InvalidState`] unless the reader is
    /// [`ReaderState::Stopped`].
    pub fn start(&self) -> Result<()> {
        self.core
            .state
            .transition(ReaderState::Stopped, ReaderState::Starting)
            .map_err(|actual| ReaderError::InvalidState {
                expected: ReaderState::Stopped,
                actual,
            })?;
        // An interrupt aimed at the previous run must not abort this one.
        self.core.queue.clear_interrupt();
        debug!("callback reader: starting");
        self.manager.start_callback();
        Ok(())
    }

    /// Requests a stop. The driver is told on its next callback.
    pub fn stop(&self) {
        let requested = self.core.state.transition_if(
            |state| matches!(state, ReaderState::Starting | ReaderState::Running),
            ReaderState::Stopping,
        );
        if let Ok(previous) = requested {
            debug!(from = %previous, "callback reader: stop requested");
        }
    }

    /// Aborts a callback blocked waiting for a buffer and requests a stop.
    pub fn interrupt(&self) {
        self.stop();
        if self.core.state.state() != ReaderState::Stopped {
            self.core.queue.interrupt_reader();
        }
    }

    /// Blocks until the driver has delivered the final callback.
    pub fn join(&self) {
        self.core.state.wait_for_state(ReaderState::Stopped);
    }

    /// Returns the current state.
    pub fn state(&self) -> ReaderState {
        self.core.state.state()
    }

    /// Blocks until the reader reaches `target`.
    pub fn wait_for_state(&self, target: ReaderState) {
        self.core.state.wait_for_state(target);
    }

    /// Like [`wait_for_state`](Self::wait_for_state), giving up after `timeout`.
    /// Returns whether `target` was reached.
    pub fn wait_for_state_timeout(&self, target: ReaderState, timeout: Duration) -> bool {
        self.core.state.wait_for_state_timeout(target, timeout)
    }

    /// Claims a buffer for the producer; dropping the guard commits it.
    pub fn begin_writing(&self) -> Result<Q::WriteGuard<'_>> {
        Ok(self.core.queue.begin_writing()?)
    }

    /// Commits a buffer claimed with [`begin_writing`](Self::begin_writing).
    pub fn finish_writing(&self, guard: Q::WriteGuard<'_>) {
        Q::finish_writing(guard);
    }

    /// Returns the underlying queue.
    pub fn queue(&self) -> &Q {
        &self.core.queue
    }

    /// Runs `f` with exclusive access to the handler.
    pub fn with_handler<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut D::Handler) -> R,
    {
        self.core.with_handler(f)
    }

    /// Returns the callback manager.
    pub fn manager(&self) -> &M {
        &self.manager
    }

    fn step(&self) {
        match self.core.process_one() {
            Ok(()) => {}
            Err(BufferError::Interrupted) => trace!("callback reader: wait interrupted"),
            Err(err) => warn!(%err, "callback reader: queue failed"),
        }
    }

    fn shut_down(&self) {
        self.core.uninitialize();
        self.manager.stop_callback();
        self.core.state.set_state(ReaderState::Stopped);
        debug!("callback reader: stopped");
    }
}

impl<Q, D, M> Drop for CallbackReader<Q, D, M>
where
    Q: BufferQueue,
    D: Dispatch<Q::Buffer>,
    M: CallbackManager,
{
    fn drop(&mut self) {
        // No callback can be running here, so finish the shutdown inline
        // rather than waiting for the driver.
        match self.core.state.state() {
            ReaderState::Stopped => {}
            ReaderState::Starting | ReaderState::Running => {
                debug!("callback reader: dropped while active");
                self.stop();
                self.shut_down();
            }
            ReaderState::Stopping => self.shut_down(),
        }
    }
}
