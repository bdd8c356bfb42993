//! Reader lifecycle states and the synchronized state register.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

/// The lifecycle state of a reader.
///
/// A reader moves `Stopped → Starting → Running → Stopping → Stopped`. A stop
/// requested while still `Starting` goes straight to `Stopping`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ReaderState {
    /// Not running, no start pending.
    #[default]
    Stopped = 0,
    /// `start()` called, the handler's initialize hook has not finished.
    Starting = 1,
    /// Handler initialized, buffers are being processed.
    Running = 2,
    /// Stop requested, waiting for the current buffer or the uninitialize
    /// hook to finish.
    Stopping = 3,
}

impl ReaderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReaderState::Stopped => "stopped",
            ReaderState::Starting => "starting",
            ReaderState::Running => "running",
            ReaderState::Stopping => "stopping",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ReaderState::Starting,
            2 => ReaderState::Running,
            3 => ReaderState::Stopping,
            _ => ReaderState::Stopped,
        }
    }
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`ReaderState`] register with blocking waits.
///
/// Every change wakes all waiters, since callers may be waiting for different
/// target states at the same time.
pub struct StateManager {
    state: Mutex<ReaderState>,
    // Lock-free copy of `state` for the `wait_for_state` fast path.
    snapshot: AtomicU8,
    changed: Condvar,
}

impl StateManager {
    /// Creates a register in [`ReaderState::Stopped`].
    pub fn new() -> Self {
        StateManager {
            state: Mutex::new(ReaderState::Stopped),
            snapshot: AtomicU8::new(ReaderState::Stopped as u8),
            changed: Condvar::new(),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ReaderState {
        *self.state.lock()
    }

    /// Sets the state and wakes all waiters.
    pub fn set_state(&self, next: ReaderState) {
        let mut state = self.state.lock();
        *state = next;
        self.snapshot.store(next as u8, Ordering::Release);
        drop(state);
        self.changed.notify_all();
    }

    /// Moves from `from` to `to` if the state is currently `from`.
    ///
    /// Returns the actual state on mismatch.
    pub fn transition(&self, from: ReaderState, to: ReaderState) -> Result<(), ReaderState> {
        self.transition_if(|state| state == from, to).map(|_| ())
    }

    /// Moves to `to` if `accept` holds for the current state.
    ///
    /// Returns the previous state on success, the unchanged state otherwise.
    pub fn transition_if<F>(&self, accept: F, to: ReaderState) -> Result<ReaderState, ReaderState>
    where
        F: FnOnce(ReaderState) -> bool,
    {
        let mut state = self.state.lock();
        let previous = *state;
        if !accept(previous) {
            return Err(previous);
        }
        *state = to;
        self.snapshot.store(to as u8, Ordering::Release);
        drop(state);
        self.changed.notify_all();
        Ok(previous)
    }

    /// Blocks until the state equals `target`.
    ///
    /// The unlocked fast path may see a stale value. That is harmless: a stale
    /// match only means the target was reached an instant ago, and a stale
    /// mismatch falls through to the locked loop, which re-checks before
    /// every wait.
    pub fn wait_for_state(&self, target: ReaderState) {
        if self.snapshot() == target {
            return;
        }
        let mut state = self.state.lock();
        while *state != target {
            self.changed.wait(&mut state);
        }
    }

    /// Like [`wait_for_state`](Self::wait_for_state) but gives up after
    /// `timeout`. Returns true if `target` was reached.
    pub fn wait_for_state_timeout(&self, target: ReaderState, timeout: Duration) -> bool {
        if self.snapshot() == target {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state != target {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return *state == target;
            }
        }
        true
    }

    /// Blocks while `pred` holds and returns the first state for which it
    /// does not.
    pub fn wait_while<F>(&self, mut pred: F) -> ReaderState
    where
        F: FnMut(ReaderState) -> bool,
    {
        let mut state = self.state.lock();
        while pred(*state) {
            self.changed.wait(&mut state);
        }
        *state
    }

    fn snapshot(&self) -> ReaderState {
        ReaderState::from_u8(self.snapshot.load(Ordering::Acquire))
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("state", &self.state())
            .finish()
    }
}
