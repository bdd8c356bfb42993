//! The per-buffer step shared by the thread and callback readers.

use parking_lot::Mutex;
use rabotnik_buffer::{BufferError, BufferQueue};

use crate::dispatch::Dispatch;
use crate::state::StateManager;

/// Queue, state and hosted handler of one reader.
///
/// The owned-thread loop and the externally driven callback both consume
/// the same three primitives: [`initialize`](Self::initialize),
/// [`process_one`](Self::process_one) and [`uninitialize`](Self::uninitialize).
pub(crate) struct ReaderCore<Q, D> {
    pub(crate) queue: Q,
    pub(crate) state: StateManager,
    hosted: Mutex<Hosted<D>>,
}

struct Hosted<D> {
    dispatch: D,
    initialized: bool,
}

impl<Q, D> ReaderCore<Q, D>
where
    Q: BufferQueue,
    D: Dispatch<Q::Buffer>,
{
    pub(crate) fn new(dispatch: D) -> Self {
        ReaderCore {
            queue: Q::default(),
            state: StateManager::new(),
            hosted: Mutex::new(Hosted {
                dispatch,
                initialized: false,
            }),
        }
    }

    /// Runs the initialize hook unless it already ran.
    pub(crate) fn initialize(&self) {
        let mut hosted = self.hosted.lock();
        if !hosted.initialized {
            hosted.dispatch.initialize();
            hosted.initialized = true;
        }
    }

    /// Runs the uninitialize hook if the initialize hook ran.
    pub(crate) fn uninitialize(&self) {
        let mut hosted = self.hosted.lock();
        if hosted.initialized {
            hosted.dispatch.uninitialize();
            hosted.initialized = false;
        }
    }

    /// Forgets that the initialize hook ran, without calling the uninitialize
    /// hook. Used when the handler can no longer be trusted, so a restart
    /// initializes it again.
    pub(crate) fn abandon(&self) {
        self.hosted.lock().initialized = false;
    }

    /// Waits for the next buffer, hands it to the handler and releases it.
    ///
    /// Only the wait can be interrupted. Once the handler has the buffer it
    /// runs to completion.
    pub(crate) fn process_one(&self) -> Result<(), BufferError> {
        let mut buffer = self.queue.begin_reading()?;
        self.hosted.lock().dispatch.process(&mut *buffer);
        Q::finish_reading(buffer);
        Ok(())
    }

    pub(crate) fn with_handler<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut D::Handler) -> R,
    {
        f(self.hosted.lock().dispatch.handler_mut())
    }
}
