//! Handler traits and the dispatchers that drive them.
//!
//! A handler implements either [`BufferHandler`] or [`TimedBufferHandler`].
//! The reader does not call the handler directly but goes through a
//! [`Dispatch`] implementation chosen by type: [`Untimed`] for plain handlers,
//! [`Timed`] for handlers that want the time since their previous call. The
//! choice is made once, when the reader type is written down, so there is no
//! per-buffer branching.

use std::time::Instant;

/// Per-buffer processing logic hosted inside a reader.
///
/// The lifecycle hooks default to no-ops.
pub trait BufferHandler<B>: Send {
    /// Called on the processing thread before the first buffer.
    fn initialize(&mut self) {}

    /// Called on the processing thread after the last buffer.
    fn uninitialize(&mut self) {}

    /// Processes one buffer. The reference is only valid for this call.
    fn process_buffer(&mut self, buffer: &mut B);
}

/// Like [`BufferHandler`], but also receives the microseconds elapsed since
/// the previous call (0 on the first call).
pub trait TimedBufferHandler<B>: Send {
    fn initialize(&mut self) {}

    fn uninitialize(&mut self) {}

    fn process_buffer(&mut self, buffer: &mut B, elapsed_us: u64);
}

/// What a reader needs from its hosted handler.
pub trait Dispatch<B>: Send {
    type Handler;

    fn initialize(&mut self);

    fn uninitialize(&mut self);

    fn process(&mut self, buffer: &mut B);

    fn handler(&self) -> &Self::Handler;

    fn handler_mut(&mut self) -> &mut Self::Handler;
}

/// Dispatches to a [`BufferHandler`].
#[derive(Debug, Default)]
pub struct Untimed<H> {
    handler: H,
}

impl<H> Untimed<H> {
    pub fn new(handler: H) -> Self {
        Untimed { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_inner(self) -> H {
        self.handler
    }
}

impl<H> From<H> for Untimed<H> {
    fn from(handler: H) -> Self {
        Untimed::new(handler)
    }
}

impl<B, H> Dispatch<B> for Untimed<H>
where
    H: BufferHandler<B>,
{
    type Handler = H;

    #[inline]
    fn initialize(&mut self) {
        self.handler.initialize();
    }

    #[inline]
    fn uninitialize(&mut self) {
        self.handler.uninitialize();
    }

    #[inline]
    fn process(&mut self, buffer: &mut B) {
        self.handler.process_buffer(buffer);
    }

    fn handler(&self) -> &H {
        &self.handler
    }

    fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}

/// Dispatches to a [`TimedBufferHandler`], tracking the time of the previous
/// call.
///
/// Each dispatcher keeps its own timestamp, so two readers hosting equal
/// handlers measure independently.
#[derive(Debug, Default)]
pub struct Timed<H> {
    handler: H,
    last_tick: Option<Instant>,
}

impl<H> Timed<H> {
    pub fn new(handler: H) -> Self {
        Timed {
            handler,
            last_tick: None,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_inner(self) -> H {
        self.handler
    }

    fn elapsed_us(&mut self) -> u64 {
        let now = Instant::now();
        let elapsed = self
            .last_tick
            .map_or(0, |last| now.duration_since(last).as_micros() as u64);
        self.last_tick = Some(now);
        elapsed
    }
}

impl<H> From<H> for Timed<H> {
    fn from(handler: H) -> Self {
        Timed::new(handler)
    }
}

impl<B, H> Dispatch<B> for Timed<H>
where
    H: TimedBufferHandler<B>,
{
    type Handler = H;

    #[inline]
    fn initialize(&mut self) {
        self.handler.initialize();
    }

    #[inline]
    fn uninitialize(&mut self) {
        self.handler.uninitialize();
    }

    #[inline]
    fn process(&mut self, buffer: &mut B) {
        let elapsed = self.elapsed_us();
        self.handler.process_buffer(buffer, elapsed);
    }

    fn handler(&self) -> &H {
        &self.handler
    }

    fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}
