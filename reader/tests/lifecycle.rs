//! Lifecycle checks for readers that own their worker thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use rabotnik_reader::{
    BufferHandler, FixedQueue, PullBufferQueue, PushBufferQueue, ReaderError, ReaderOptions,
    ReaderState, ReaderThread, Timed, TimedBufferHandler, Untimed,
};
use tracing::Level;

const TIMEOUT: Duration = Duration::from_secs(5);

type Frame = FixedQueue<u32, 16>;

#[derive(Default)]
struct Counting {
    inits: usize,
    uninits: usize,
    frames: usize,
    values: Vec<u32>,
}

impl BufferHandler<Frame> for Counting {
    fn initialize(&mut self) {
        self.inits += 1;
    }

    fn uninitialize(&mut self) {
        self.uninits += 1;
    }

    fn process_buffer(&mut self, buffer: &mut Frame) {
        self.frames += 1;
        self.values.extend(buffer.iter().copied());
    }
}

type PushReader = ReaderThread<PushBufferQueue<Frame, 3>, Untimed<Counting>>;

/// Runs `f` on a helper thread and fails the test if it does not return in
/// time.
fn within_timeout<F>(what: &str, f: F)
where
    F: FnOnce() + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        f();
        let _ = tx.send(());
    });
    assert!(rx.recv_timeout(TIMEOUT).is_ok(), "{what} did not finish");
}

fn wait_until_drained(reader: &PushReader) {
    let deadline = Instant::now() + TIMEOUT;
    while !reader.queue().is_empty() {
        assert!(Instant::now() < deadline, "queue never drained");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn start_reaches_running_and_rejects_second_start() {
    let reader = PushReader::default();
    reader.start().unwrap();
    assert!(reader.wait_for_state_timeout(ReaderState::Running, TIMEOUT));

    match reader.start() {
        Err(ReaderError::InvalidState { expected, actual }) => {
            assert_eq!(expected, ReaderState::Stopped);
            assert_eq!(actual, ReaderState::Running);
        }
        other => panic!("unexpected start result: {other:?}"),
    }

    reader.interrupt();
    reader.join().unwrap();
    assert_eq!(reader.state(), ReaderState::Stopped);
    reader.with_handler(|h| {
        assert_eq!(h.inits, 1);
        assert_eq!(h.uninits, 1);
    });
}

#[test]
fn frames_reach_the_handler_in_order() {
    let reader = PushReader::default();
    reader.start().unwrap();

    let mut next = 0;
    for len in [3, 16, 0, 7] {
        let mut frame = reader.begin_writing().unwrap();
        for _ in 0..len {
            frame.push(next).unwrap();
            next += 1;
        }
        reader.finish_writing(frame);
    }

    wait_until_drained(&reader);
    reader.interrupt();
    reader.join().unwrap();

    reader.with_handler(|h| {
        assert_eq!(h.frames, 4);
        assert_eq!(h.values, (0..next).collect::<Vec<_>>());
    });
}

#[test]
fn stop_waits_for_the_next_buffer() {
    let reader = PushReader::default();
    reader.start().unwrap();
    reader.wait_for_state(ReaderState::Running);

    // The worker is parked on the empty queue; stop alone does not wake it.
    reader.stop();
    assert_eq!(reader.state(), ReaderState::Stopping);
    assert!(!reader.wait_for_state_timeout(ReaderState::Stopped, Duration::from_millis(50)));

    reader.begin_writing().unwrap().push(42).unwrap();
    assert!(reader.wait_for_state_timeout(ReaderState::Stopped, TIMEOUT));
    reader.join().unwrap();

    // The buffer that woke the worker was processed in full.
    assert_eq!(reader.with_handler(|h| h.values.clone()), vec![42]);
}

#[test]
fn interrupt_releases_a_blocked_worker() {
    let reader = PushReader::default();
    reader.start().unwrap();
    reader.wait_for_state(ReaderState::Running);

    reader.interrupt();
    assert!(reader.wait_for_state_timeout(ReaderState::Stopped, TIMEOUT));
    reader.join().unwrap();
    assert_eq!(reader.with_handler(|h| h.frames), 0);
}

#[test]
fn reader_can_be_restarted() {
    let reader = PushReader::default();
    for round in 0..3 {
        reader.start().unwrap();
        reader.begin_writing().unwrap().push(round).unwrap();
        wait_until_drained(&reader);
        reader.interrupt();
        reader.join().unwrap();
    }
    reader.with_handler(|h| {
        assert_eq!(h.values, vec![0, 1, 2]);
        assert_eq!(h.inits, 3);
        assert_eq!(h.uninits, 3);
    });
}

/// Takes a while to initialize so a drop can catch the reader in `Starting`.
struct SlowStart {
    delay: Duration,
    uninits: Arc<AtomicUsize>,
}

impl BufferHandler<Frame> for SlowStart {
    fn initialize(&mut self) {
        thread::sleep(self.delay);
    }

    fn uninitialize(&mut self) {
        self.uninits.fetch_add(1, Ordering::SeqCst);
    }

    fn process_buffer(&mut self, _buffer: &mut Frame) {}
}

type SlowReader = ReaderThread<PushBufferQueue<Frame, 2>, Untimed<SlowStart>>;

fn slow_reader(delay: Duration, uninits: &Arc<AtomicUsize>) -> SlowReader {
    ReaderThread::new(Untimed::new(SlowStart {
        delay,
        uninits: Arc::clone(uninits),
    }))
}

#[test]
fn drop_while_starting_does_not_hang() {
    let uninits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&uninits);
    within_timeout("drop while starting", move || {
        let reader = slow_reader(Duration::from_millis(100), &counter);
        reader.start().unwrap();
        assert_eq!(reader.state(), ReaderState::Starting);
        drop(reader);
    });
    assert_eq!(uninits.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_while_running_does_not_hang() {
    let uninits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&uninits);
    within_timeout("drop while running", move || {
        let reader = slow_reader(Duration::ZERO, &counter);
        reader.start().unwrap();
        reader.wait_for_state(ReaderState::Running);
        drop(reader);
    });
    assert_eq!(uninits.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_while_stopping_does_not_hang() {
    let uninits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&uninits);
    within_timeout("drop while stopping", move || {
        let reader = slow_reader(Duration::ZERO, &counter);
        reader.start().unwrap();
        reader.wait_for_state(ReaderState::Running);
        reader.stop();
        assert_eq!(reader.state(), ReaderState::Stopping);
        drop(reader);
    });
    assert_eq!(uninits.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_without_start_is_immediate() {
    within_timeout("drop without start", || {
        drop(PushReader::default());
    });
}

#[derive(Default)]
struct Intervals {
    elapsed: Vec<u64>,
}

impl TimedBufferHandler<Frame> for Intervals {
    fn process_buffer(&mut self, _buffer: &mut Frame, elapsed_us: u64) {
        self.elapsed.push(elapsed_us);
    }
}

#[test]
fn timed_handler_gets_zero_first() {
    let reader: ReaderThread<PushBufferQueue<Frame, 2>, Timed<Intervals>> =
        ReaderThread::default();
    reader.start().unwrap();

    for _ in 0..3 {
        reader.begin_writing().unwrap().push(1).unwrap();
        thread::sleep(Duration::from_millis(10));
    }

    let deadline = Instant::now() + TIMEOUT;
    while reader.with_handler(|h| h.elapsed.len()) < 3 {
        assert!(Instant::now() < deadline, "handler never saw three frames");
        thread::sleep(Duration::from_millis(1));
    }
    reader.interrupt();
    reader.join().unwrap();

    let elapsed = reader.with_handler(|h| h.elapsed.clone());
    assert_eq!(elapsed[0], 0);
    assert!(elapsed[1] >= 5_000, "second interval too short: {}", elapsed[1]);
    assert!(elapsed[2] >= 5_000, "third interval too short: {}", elapsed[2]);
}

struct Fragile {
    uninits: Arc<AtomicUsize>,
}

impl BufferHandler<Frame> for Fragile {
    fn uninitialize(&mut self) {
        self.uninits.fetch_add(1, Ordering::SeqCst);
    }

    fn process_buffer(&mut self, buffer: &mut Frame) {
        if buffer.iter().any(|&v| v == 13) {
            panic!("unlucky frame");
        }
    }
}

#[test]
fn panicking_handler_is_reported_by_join() {
    let uninits = Arc::new(AtomicUsize::new(0));
    let reader: ReaderThread<PushBufferQueue<Frame, 2>, Untimed<Fragile>> =
        ReaderThread::new(Untimed::new(Fragile {
            uninits: Arc::clone(&uninits),
        }));
    reader.start().unwrap();
    reader.begin_writing().unwrap().push(13).unwrap();

    assert!(reader.wait_for_state_timeout(ReaderState::Stopped, TIMEOUT));
    assert!(matches!(reader.join(), Err(ReaderError::Panicked)));
    assert_eq!(uninits.load(Ordering::SeqCst), 0);

    // A second join has nothing left to wait for.
    reader.join().unwrap();
}

#[test]
fn pull_reader_sees_every_value_once() {
    #[derive(Default)]
    struct Gather(Vec<u32>);

    impl BufferHandler<Vec<u32>> for Gather {
        fn process_buffer(&mut self, buffer: &mut Vec<u32>) {
            self.0.append(buffer);
        }
    }

    let reader: ReaderThread<PullBufferQueue<Vec<u32>>, Untimed<Gather>> =
        ReaderThread::default();
    reader.start().unwrap();
    reader.wait_for_state(ReaderState::Running);

    const COUNT: u32 = 2_000;
    for value in 0..COUNT {
        reader.begin_writing().unwrap().push(value);
        if value % 100 == 0 {
            thread::yield_now();
        }
    }

    reader.stop();
    reader.join().unwrap();

    // Whatever the worker did not swap out is still in the write slot.
    let mut seen = reader.with_handler(|h| std::mem::take(&mut h.0));
    seen.extend(reader.queue().begin_reading().iter().copied());
    assert_eq!(seen, (0..COUNT).collect::<Vec<_>>());
}

#[test]
fn options_name_the_worker_thread() {
    struct ThreadName(Option<String>);

    impl BufferHandler<Frame> for ThreadName {
        fn initialize(&mut self) {
            self.0 = thread::current().name().map(str::to_string);
        }

        fn process_buffer(&mut self, _buffer: &mut Frame) {}
    }

    let options = ReaderOptions::default()
        .with_name("mic-capture")
        .with_stack_size(256 * 1024);
    let reader: ReaderThread<PushBufferQueue<Frame, 2>, Untimed<ThreadName>> =
        ReaderThread::with_options(Untimed::new(ThreadName(None)), options.clone());
    assert_eq!(reader.options(), &options);

    reader.start().unwrap();
    reader.wait_for_state(ReaderState::Running);
    reader.interrupt();
    reader.join().unwrap();

    let name = reader.with_handler(|h| h.0.clone());
    assert_eq!(name.as_deref(), Some("mic-capture"));
}

#[test]
fn lifecycle_with_logging_enabled() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_test_writer()
        .try_init();

    let reader = PushReader::default();
    reader.start().unwrap();
    reader.begin_writing().unwrap().push(1).unwrap();
    wait_until_drained(&reader);
    reader.interrupt();
    reader.join().unwrap();
    assert_eq!(reader.state(), ReaderState::Stopped);
}

#[test]
fn restart_after_panic_initializes_again() {
    #[derive(Default)]
    struct Recovering {
        inits: usize,
        uninits: usize,
    }

    impl BufferHandler<Frame> for Recovering {
        fn initialize(&mut self) {
            self.inits += 1;
        }

        fn uninitialize(&mut self) {
            self.uninits += 1;
        }

        fn process_buffer(&mut self, buffer: &mut Frame) {
            if buffer.iter().any(|&v| v == 13) {
                panic!("unlucky frame");
            }
        }
    }

    let reader: ReaderThread<PushBufferQueue<Frame, 2>, Untimed<Recovering>> =
        ReaderThread::default();
    reader.start().unwrap();
    reader.begin_writing().unwrap().push(13).unwrap();
    assert!(reader.wait_for_state_timeout(ReaderState::Stopped, TIMEOUT));
    assert!(matches!(reader.join(), Err(ReaderError::Panicked)));

    reader.start().unwrap();
    assert!(reader.wait_for_state_timeout(ReaderState::Running, TIMEOUT));
    reader.interrupt();
    reader.join().unwrap();

    reader.with_handler(|h| {
        assert_eq!(h.inits, 2);
        assert_eq!(h.uninits, 1);
    });
}
