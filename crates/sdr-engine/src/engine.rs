//! The streaming acquisition engine.
//!
//! [`StreamEngine`] owns a [`RingBuffer`] and a shared [`SampleSource`]
//! handle, drives the acquisition lifecycle (waiting → receiving → waiting),
//! and runs the background worker thread that issues blocking reads and
//! delivers completed segments to the registered handler.
//!
//! # Concurrency model
//!
//! At most one worker thread exists per engine instance, spawned by
//! `start` and joined by `stop` (or the implicit stop inside `finalize`).
//! The ring buffer and the handler move into the worker for the duration of
//! a session and come back when it ends, so the single-writer invariant is
//! enforced by ownership rather than locking. The only state shared between
//! the owning thread and the worker is the session's atomic cancellation
//! flag and the state cell.
//!
//! Cancellation is cooperative: the flag is checked once per cycle
//! boundary, and an in-flight blocking read is never interrupted. `stop`
//! therefore blocks for at most the duration of one outstanding read. A
//! source that never returns from `read` makes `stop` block indefinitely;
//! there is no timeout mechanism.
//!
//! # Worker errors
//!
//! Errors on the worker thread (a read returning zero bytes, a
//! device-reported failure, a panicking handler) never unwind out of the
//! worker. They are recorded in the session outcome, the engine returns to
//! waiting, and the error is returned by `stop` or retrievable via
//! [`StreamEngine::take_last_error`] on the next interaction.

use crate::ring::RingBuffer;
use parking_lot::Mutex;
use sdr_core::config::{TransferConfig, TransferMode};
use sdr_core::error::{Result, SdrError};
use sdr_core::gain::split_level;
use sdr_core::source::SampleSource;
use sdr_core::state::EngineState;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, trace, warn};

/// Sample source handle shared between the owning thread and the worker.
pub type SharedSource = Arc<Mutex<dyn SampleSource + Send>>;

/// Caller-supplied segment callback: `(offset_in_buffer, filled_bytes)`.
///
/// Invoked synchronously on the worker thread, strictly ordered, once per
/// physical read segment.
pub type Handler = Box<dyn FnMut(usize, &[u8]) + Send>;

/// Everything the worker hands back when it exits.
struct WorkerOutcome {
    ring: RingBuffer,
    handler: Handler,
    result: Result<()>,
}

/// Live acquisition session: worker handle plus cancellation flag.
struct AcquisitionSession {
    worker: thread::JoinHandle<WorkerOutcome>,
    cancel: Arc<AtomicBool>,
    diagnostic: bool,
}

/// Ring-buffered streaming acquisition engine.
///
/// # Example
///
/// ```rust,ignore
/// let mut engine = StreamEngine::with_source(emulator, config)?;
/// engine.set_handler(|offset, data| tracing::info!(offset, len = data.len(), "segment"));
/// engine.initialize()?;
/// engine.start()?;
/// std::thread::sleep(std::time::Duration::from_secs(2));
/// engine.stop()?;
/// engine.finalize();
/// ```
pub struct StreamEngine {
    config: TransferConfig,
    source: SharedSource,
    state: Arc<Mutex<EngineState>>,
    ring: Option<RingBuffer>,
    handler: Option<Handler>,
    session: Option<AcquisitionSession>,
    last_error: Option<SdrError>,
    /// Secondary (IF) gain actually applied, in tenths of a dB.
    if_gain_applied: u32,
}

impl StreamEngine {
    /// Create an engine around a shared source handle.
    pub fn new(source: SharedSource, config: TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            state: Arc::new(Mutex::new(EngineState::Waiting)),
            ring: None,
            handler: None,
            session: None,
            last_error: None,
            if_gain_applied: 0,
        })
    }

    /// Create an engine that takes sole ownership of `source`.
    pub fn with_source<S>(source: S, config: TransferConfig) -> Result<Self>
    where
        S: SampleSource + Send + 'static,
    {
        let shared: SharedSource = Arc::new(Mutex::new(source));
        Self::new(shared, config)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Current transfer configuration.
    pub fn config(&self) -> TransferConfig {
        self.config
    }

    /// Register the segment handler. Replaces any previous handler.
    pub fn set_handler<F>(&mut self, handler: F)
    where
        F: FnMut(usize, &[u8]) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Replace the transfer configuration.
    ///
    /// Rejected while a session is live. If the buffer size changed, the
    /// allocated ring buffer is released and `initialize` must be called
    /// again before the next `start`.
    pub fn set_config(&mut self, config: TransferConfig) -> Result<()> {
        self.reap_finished();
        let current = *self.state.lock();
        if current.is_receiving() {
            return Err(SdrError::InvalidState {
                operation: "reconfigure",
                state: current,
            });
        }
        config.validate()?;
        let realloc_needed = self
            .ring
            .as_ref()
            .is_some_and(|ring| ring.capacity() != config.buffer_size);
        if realloc_needed {
            self.ring = None;
            debug!("buffer size changed, ring buffer released");
        }
        self.config = config;
        Ok(())
    }

    /// Change the acquisition mode only.
    pub fn set_mode(&mut self, mode: TransferMode) -> Result<()> {
        let mut config = self.config;
        config.mode = mode;
        self.set_config(config)
    }

    /// Change the packet size only.
    pub fn set_packet_size(&mut self, packet_size: usize) -> Result<()> {
        let mut config = self.config;
        config.packet_size = packet_size;
        self.set_config(config)
    }

    /// Allocate the ring buffer.
    ///
    /// Legal while idle even if a buffer already exists: the previous
    /// allocation is dropped and replaced, never leaked. Rejected while a
    /// session is live.
    pub fn initialize(&mut self) -> Result<()> {
        self.reap_finished();
        let current = *self.state.lock();
        if current.is_receiving() {
            return Err(SdrError::InvalidState {
                operation: "initialize",
                state: current,
            });
        }
        self.config.validate()?;
        self.ring = Some(RingBuffer::new(self.config.buffer_size)?);
        debug!(capacity = self.config.buffer_size, "allocated ring buffer");
        Ok(())
    }

    /// Start acquiring live data on a background worker.
    ///
    /// Requires a registered handler and an initialized buffer. In `Loop`
    /// mode the worker repeats read cycles until `stop`; in `Single` mode it
    /// performs exactly one cycle and the engine returns to waiting on its
    /// own, without an explicit `stop`.
    pub fn start(&mut self) -> Result<()> {
        self.spawn_session(false)
    }

    /// Start acquiring with the source's test-pattern mode enabled.
    ///
    /// The pattern mode is switched on before the worker spawns and
    /// switched back off when the session ends.
    pub fn start_diagnostic(&mut self) -> Result<()> {
        self.spawn_session(true)
    }

    fn spawn_session(&mut self, diagnostic: bool) -> Result<()> {
        self.reap_finished();
        let current = *self.state.lock();
        if current.is_receiving() {
            return Err(SdrError::Precondition {
                operation: "start",
                message: format!("a session is already live in state {}", current),
            });
        }
        if self.handler.is_none() {
            return Err(SdrError::Precondition {
                operation: "start",
                message: "no handler registered".to_string(),
            });
        }
        if self.ring.is_none() {
            return Err(SdrError::Precondition {
                operation: "start",
                message: "ring buffer not initialized".to_string(),
            });
        }
        if diagnostic {
            self.source.lock().set_test_pattern(true)?;
        }

        let mut ring = match self.ring.take() {
            Some(ring) => ring,
            None => {
                return Err(SdrError::Precondition {
                    operation: "start",
                    message: "ring buffer not initialized".to_string(),
                })
            }
        };
        let mut handler = match self.handler.take() {
            Some(handler) => handler,
            None => {
                self.ring = Some(ring);
                return Err(SdrError::Precondition {
                    operation: "start",
                    message: "no handler registered".to_string(),
                });
            }
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let state = Arc::clone(&self.state);
        let source = Arc::clone(&self.source);
        let mode = self.config.mode;
        let packet_size = self.config.packet_size;

        *state.lock() = if diagnostic {
            EngineState::Diagnostic
        } else {
            EngineState::Receiving
        };
        info!(
            mode = %mode,
            buffer_size = ring.capacity(),
            packet_size,
            diagnostic,
            "starting acquisition"
        );

        let cancel_for_worker = Arc::clone(&cancel);
        let worker = thread::Builder::new()
            .name("sdr-acquire".to_string())
            .spawn(move || {
                let result = run_worker(
                    mode,
                    packet_size,
                    &source,
                    &mut ring,
                    &mut handler,
                    &cancel_for_worker,
                );
                *state.lock() = EngineState::Waiting;
                WorkerOutcome {
                    ring,
                    handler,
                    result,
                }
            })
            .map_err(|err| {
                *self.state.lock() = EngineState::Waiting;
                SdrError::WorkerSpawn(err.to_string())
            })?;

        self.session = Some(AcquisitionSession {
            worker,
            cancel,
            diagnostic,
        });
        Ok(())
    }

    /// Stop a live acquisition session.
    ///
    /// Signals cancellation and blocks until the worker has observed it and
    /// exited (bounded by the duration of the read currently in flight).
    /// Returns the worker's error, if it recorded one. Calling `stop` while
    /// waiting fails with an invalid-state error and changes nothing.
    pub fn stop(&mut self) -> Result<()> {
        self.reap_finished();
        let current = *self.state.lock();
        if !current.is_receiving() {
            return Err(SdrError::InvalidState {
                operation: "stop",
                state: current,
            });
        }
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                return Err(SdrError::InvalidState {
                    operation: "stop",
                    state: current,
                })
            }
        };

        debug!("stopping acquisition");
        session.cancel.store(true, Ordering::Release);
        let outcome = session.worker.join();
        if session.diagnostic {
            self.disable_test_pattern();
        }
        *self.state.lock() = EngineState::Waiting;

        match outcome {
            Ok(outcome) => {
                self.restore(outcome.ring, outcome.handler);
                outcome.result
            }
            Err(_) => Err(SdrError::WorkerPanic),
        }
    }

    /// Release the buffer and any worker resources.
    ///
    /// Valid from any state; performs an implicit `stop` when a session is
    /// live (its error, if any, is stashed for [`Self::take_last_error`]).
    /// Safe to call multiple times.
    pub fn finalize(&mut self) {
        let receiving = self.state.lock().is_receiving();
        if receiving {
            if let Err(err) = self.stop() {
                warn!(error = %err, "implicit stop during finalize reported an error");
                self.last_error = Some(err);
            }
        }
        self.reap_finished();
        if self.ring.take().is_some() {
            debug!("released ring buffer");
        }
    }

    /// Buffer contents; `None` while a session is live or after `finalize`.
    pub fn buffer(&self) -> Option<&[u8]> {
        self.ring.as_ref().map(RingBuffer::as_slice)
    }

    /// Retrieve (and clear) the error recorded by a worker that stopped on
    /// its own, e.g. a mid-stream hardware read failure.
    pub fn take_last_error(&mut self) -> Option<SdrError> {
        self.reap_finished();
        self.last_error.take()
    }

    /// Tune the source's center frequency, validated against the
    /// device-supplied range before the device is touched.
    pub fn set_frequency(&mut self, hz: u64) -> Result<()> {
        let mut source = self.source.lock();
        let range = source.frequency_range();
        if !range.contains(&hz) {
            return Err(SdrError::Configuration(format!(
                "frequency {} Hz outside device range {}..={} Hz",
                hz,
                range.start(),
                range.end()
            )));
        }
        source.set_frequency(hz)?;
        Ok(())
    }

    /// Set the source's sampling rate. Thin pass-through.
    pub fn set_sample_rate(&mut self, hz: u32) -> Result<()> {
        self.source.lock().set_sample_rate(hz)?;
        Ok(())
    }

    /// Set the effective gain level, in tenths of a dB.
    ///
    /// Saturates the primary stage at the source-reported maximum and
    /// routes the overflow to the bounded secondary (IF) stage. When the
    /// request fits in the primary stage the secondary is left untouched.
    pub fn set_level(&mut self, tenth_db: u32) -> Result<()> {
        let mut source = self.source.lock();
        let split = split_level(tenth_db, source.max_primary_gain());
        source.set_primary_gain(split.primary)?;
        if let Some(secondary) = split.secondary {
            source.set_secondary_gain(secondary)?;
            self.if_gain_applied = secondary;
        }
        Ok(())
    }

    /// Effective gain level: primary-stage reading plus the secondary
    /// contribution actually applied (not the requested remainder).
    pub fn level(&self) -> u32 {
        self.source.lock().current_primary_gain() + self.if_gain_applied
    }

    /// Harvest a session whose worker already exited on its own (single-shot
    /// completion or a mid-stream error), restoring the buffer and handler
    /// and recording any worker error.
    fn reap_finished(&mut self) {
        let finished = self
            .session
            .as_ref()
            .is_some_and(|session| session.worker.is_finished());
        if !finished {
            return;
        }
        let Some(session) = self.session.take() else {
            return;
        };
        if session.diagnostic {
            self.disable_test_pattern();
        }
        match session.worker.join() {
            Ok(outcome) => {
                self.restore(outcome.ring, outcome.handler);
                if let Err(err) = outcome.result {
                    warn!(error = %err, "acquisition worker stopped on error");
                    self.last_error = Some(err);
                }
            }
            Err(_) => {
                self.last_error = Some(SdrError::WorkerPanic);
            }
        }
    }

    /// Put the worker's buffer and handler back unless the caller replaced
    /// them while the session was winding down.
    fn restore(&mut self, ring: RingBuffer, handler: Handler) {
        if self.ring.is_none() {
            self.ring = Some(ring);
        }
        if self.handler.is_none() {
            self.handler = Some(handler);
        }
    }

    fn disable_test_pattern(&mut self) {
        if let Err(err) = self.source.lock().set_test_pattern(false) {
            warn!(error = %err, "failed to disable test pattern");
        }
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        // No worker may outlive its buffer, however the engine goes away.
        self.finalize();
    }
}

/// Worker-thread entry: one cycle in single mode, cycle-until-cancelled in
/// loop mode.
///
/// Single mode guarantees exactly one full cycle; the cancellation flag is
/// loop-continuation state only and is never consulted here.
fn run_worker(
    mode: TransferMode,
    packet_size: usize,
    source: &SharedSource,
    ring: &mut RingBuffer,
    handler: &mut Handler,
    cancel: &AtomicBool,
) -> Result<()> {
    match mode {
        TransferMode::Single => {
            let read = run_cycle(source, ring, handler, packet_size)?;
            debug!(bytes = read, "single-shot cycle complete");
            Ok(())
        }
        TransferMode::Loop => {
            let mut cycles = 0u64;
            while !cancel.load(Ordering::Acquire) {
                let read = run_cycle(source, ring, handler, packet_size)?;
                cycles += 1;
                trace!(bytes = read, cycles, "cycle complete");
            }
            debug!(cycles, "cancellation observed, leaving receive loop");
            Ok(())
        }
    }
}

/// One split-read cycle: issue one blocking read per planned segment,
/// deliver each filled segment to the handler, then advance the cursor by
/// the full packet size.
///
/// A read returning zero bytes is a hard failure that aborts the cycle; a
/// short read passes its actual count to the handler and the cycle
/// continues with the planned remainder. A panicking handler is caught here
/// and reported as an error value.
fn run_cycle(
    source: &SharedSource,
    ring: &mut RingBuffer,
    handler: &mut Handler,
    packet_size: usize,
) -> Result<usize> {
    let plan = ring.plan(packet_size);
    let mut total = 0usize;
    for segment in plan.segments().iter().copied() {
        let read = {
            let dst = ring.segment_mut(segment);
            source.lock().read(dst)?
        };
        if read == 0 {
            return Err(SdrError::HardwareRead {
                requested: segment.len,
                returned: 0,
            });
        }
        if read < segment.len {
            warn!(requested = segment.len, read, "short read from sample source");
        }
        let data = &ring.as_slice()[segment.offset..segment.offset + read];
        if catch_unwind(AssertUnwindSafe(|| handler(segment.offset, data))).is_err() {
            return Err(SdrError::WorkerPanic);
        }
        total += read;
    }
    ring.advance(packet_size);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdr_core::source::{SourceError, SourceErrorKind};
    use std::ops::RangeInclusive;
    use std::time::{Duration, Instant};

    /// Scripted source that records every interaction.
    struct TestSource {
        open: bool,
        reads: Arc<Mutex<Vec<usize>>>,
        pattern_log: Arc<Mutex<Vec<bool>>>,
        primary_log: Arc<Mutex<Vec<u32>>>,
        secondary_log: Arc<Mutex<Vec<u32>>>,
        frequency_log: Arc<Mutex<Vec<u64>>>,
        zero_after: Option<u64>,
        reads_issued: u64,
        fill: u8,
        primary_gain: u32,
    }

    impl TestSource {
        fn new() -> Self {
            Self {
                open: true,
                reads: Arc::new(Mutex::new(Vec::new())),
                pattern_log: Arc::new(Mutex::new(Vec::new())),
                primary_log: Arc::new(Mutex::new(Vec::new())),
                secondary_log: Arc::new(Mutex::new(Vec::new())),
                frequency_log: Arc::new(Mutex::new(Vec::new())),
                zero_after: None,
                reads_issued: 0,
                fill: 0xAB,
                primary_gain: 0,
            }
        }
    }

    impl SampleSource for TestSource {
        fn open(&mut self) -> std::result::Result<(), SourceError> {
            self.open = true;
            Ok(())
        }

        fn close(&mut self) -> std::result::Result<(), SourceError> {
            self.open = false;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, SourceError> {
            if !self.open {
                return Err(SourceError::new(
                    "test",
                    SourceErrorKind::Read,
                    "device not open",
                ));
            }
            self.reads_issued += 1;
            self.reads.lock().push(buf.len());
            if self.zero_after.is_some_and(|n| self.reads_issued > n) {
                return Ok(0);
            }
            buf.fill(self.fill);
            // Pace the spin a little so loop-mode tests stay small.
            thread::sleep(Duration::from_micros(50));
            Ok(buf.len())
        }

        fn set_frequency(&mut self, hz: u64) -> std::result::Result<(), SourceError> {
            self.frequency_log.lock().push(hz);
            Ok(())
        }

        fn set_sample_rate(&mut self, _hz: u32) -> std::result::Result<(), SourceError> {
            Ok(())
        }

        fn set_primary_gain(&mut self, tenth_db: u32) -> std::result::Result<(), SourceError> {
            self.primary_gain = tenth_db;
            self.primary_log.lock().push(tenth_db);
            Ok(())
        }

        fn set_secondary_gain(&mut self, tenth_db: u32) -> std::result::Result<(), SourceError> {
            self.secondary_log.lock().push(tenth_db);
            Ok(())
        }

        fn set_test_pattern(&mut self, enabled: bool) -> std::result::Result<(), SourceError> {
            self.pattern_log.lock().push(enabled);
            Ok(())
        }

        fn max_primary_gain(&self) -> u32 {
            496
        }

        fn current_primary_gain(&self) -> u32 {
            self.primary_gain
        }

        fn frequency_range(&self) -> RangeInclusive<u64> {
            100_000..=1_750_000_000
        }
    }

    type SegmentLog = Arc<Mutex<Vec<(usize, usize)>>>;

    fn recording_handler() -> (SegmentLog, impl FnMut(usize, &[u8]) + Send + 'static) {
        let log: SegmentLog = Arc::new(Mutex::new(Vec::new()));
        let log_for_handler = Arc::clone(&log);
        let handler = move |offset: usize, data: &[u8]| {
            log_for_handler.lock().push((offset, data.len()));
        };
        (log, handler)
    }

    fn wait_for_waiting(engine: &StreamEngine) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.state() != EngineState::Waiting {
            assert!(
                Instant::now() < deadline,
                "worker did not return to waiting"
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn engine_with(
        source: TestSource,
        mode: TransferMode,
        buffer_size: usize,
        packet_size: usize,
    ) -> StreamEngine {
        let config = TransferConfig::new(mode, buffer_size, packet_size).unwrap();
        StreamEngine::with_source(source, config).unwrap()
    }

    #[test]
    fn single_shot_full_buffer_reads_once_then_waits() {
        let source = TestSource::new();
        let reads = Arc::clone(&source.reads);
        let mut engine = engine_with(source, TransferMode::Single, 512_000, 512_000);
        let (segments, handler) = recording_handler();
        engine.set_handler(handler);
        engine.initialize().unwrap();
        engine.start().unwrap();

        wait_for_waiting(&engine);
        // No explicit stop: the engine came back to waiting on its own.
        assert_eq!(*reads.lock(), vec![512_000]);
        assert_eq!(*segments.lock(), vec![(0, 512_000)]);
        assert!(engine.take_last_error().is_none());
    }

    #[test]
    fn loop_mode_splits_at_wrap_boundary() {
        let source = TestSource::new();
        let mut engine = engine_with(source, TransferMode::Loop, 1000, 350);
        let (segments, handler) = recording_handler();
        engine.set_handler(handler);
        engine.initialize().unwrap();
        engine.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while segments.lock().len() < 5 {
            assert!(Instant::now() < deadline, "too few segments delivered");
            thread::sleep(Duration::from_millis(1));
        }
        engine.stop().unwrap();

        let recorded = segments.lock();
        assert_eq!(
            &recorded[..5],
            &[(0, 350), (350, 350), (700, 300), (0, 50), (50, 350)]
        );
    }

    #[test]
    fn stop_while_waiting_is_invalid_state() {
        let mut engine = engine_with(TestSource::new(), TransferMode::Loop, 1000, 100);
        let err = engine.stop().unwrap_err();
        assert!(matches!(
            err,
            SdrError::InvalidState {
                operation: "stop",
                state: EngineState::Waiting,
            }
        ));
        assert_eq!(engine.state(), EngineState::Waiting);
    }

    #[test]
    fn start_without_handler_fails() {
        let mut engine = engine_with(TestSource::new(), TransferMode::Loop, 1000, 100);
        engine.initialize().unwrap();
        let err = engine.start().unwrap_err();
        assert!(matches!(err, SdrError::Precondition { .. }));
        assert_eq!(engine.state(), EngineState::Waiting);
    }

    #[test]
    fn start_without_initialize_fails() {
        let mut engine = engine_with(TestSource::new(), TransferMode::Loop, 1000, 100);
        let (_segments, handler) = recording_handler();
        engine.set_handler(handler);
        let err = engine.start().unwrap_err();
        assert!(matches!(err, SdrError::Precondition { .. }));
    }

    #[test]
    fn reentrant_start_fails() {
        let mut engine = engine_with(TestSource::new(), TransferMode::Loop, 1000, 100);
        let (_segments, handler) = recording_handler();
        engine.set_handler(handler);
        engine.initialize().unwrap();
        engine.start().unwrap();

        let err = engine.start().unwrap_err();
        assert!(matches!(err, SdrError::Precondition { .. }));
        engine.stop().unwrap();
    }

    #[test]
    fn zero_length_read_parks_engine_and_records_error() {
        let mut source = TestSource::new();
        source.zero_after = Some(3);
        let mut engine = engine_with(source, TransferMode::Loop, 1000, 100);
        let (_segments, handler) = recording_handler();
        engine.set_handler(handler);
        engine.initialize().unwrap();
        engine.start().unwrap();

        wait_for_waiting(&engine);
        let err = engine.take_last_error();
        assert!(matches!(
            err,
            Some(SdrError::HardwareRead {
                requested: 100,
                returned: 0,
            })
        ));
        // The error channel is drained once retrieved.
        assert!(engine.take_last_error().is_none());
    }

    #[test]
    fn diagnostic_session_toggles_test_pattern() {
        let source = TestSource::new();
        let pattern_log = Arc::clone(&source.pattern_log);
        let mut engine = engine_with(source, TransferMode::Loop, 1000, 100);
        let (_segments, handler) = recording_handler();
        engine.set_handler(handler);
        engine.initialize().unwrap();

        engine.start_diagnostic().unwrap();
        assert_eq!(engine.state(), EngineState::Diagnostic);
        engine.stop().unwrap();

        assert_eq!(*pattern_log.lock(), vec![true, false]);
        assert_eq!(engine.state(), EngineState::Waiting);
    }

    #[test]
    fn finalize_stops_live_session_and_is_idempotent() {
        let mut engine = engine_with(TestSource::new(), TransferMode::Loop, 1000, 100);
        let (_segments, handler) = recording_handler();
        engine.set_handler(handler);
        engine.initialize().unwrap();
        engine.start().unwrap();

        engine.finalize();
        assert_eq!(engine.state(), EngineState::Waiting);
        assert!(engine.buffer().is_none());
        engine.finalize();
        assert!(engine.buffer().is_none());
    }

    #[test]
    fn handler_panic_is_contained_in_the_session() {
        let mut engine = engine_with(TestSource::new(), TransferMode::Loop, 1000, 100);
        engine.set_handler(|_offset, _data: &[u8]| panic!("handler bug"));
        engine.initialize().unwrap();
        engine.start().unwrap();

        wait_for_waiting(&engine);
        assert!(matches!(
            engine.take_last_error(),
            Some(SdrError::WorkerPanic)
        ));
    }

    #[test]
    fn single_mode_can_restart_after_completion() {
        let source = TestSource::new();
        let reads = Arc::clone(&source.reads);
        let mut engine = engine_with(source, TransferMode::Single, 1000, 400);
        let (_segments, handler) = recording_handler();
        engine.set_handler(handler);
        engine.initialize().unwrap();

        engine.start().unwrap();
        wait_for_waiting(&engine);
        engine.start().unwrap();
        wait_for_waiting(&engine);

        // Second cycle starts where the first left off: 400, then 400 from
        // offset 400 is contiguous as well.
        assert_eq!(*reads.lock(), vec![400, 400]);
    }

    #[test]
    fn buffer_is_readable_after_session_ends() {
        let mut engine = engine_with(TestSource::new(), TransferMode::Single, 16, 16);
        let (_segments, handler) = recording_handler();
        engine.set_handler(handler);
        engine.initialize().unwrap();
        engine.start().unwrap();

        wait_for_waiting(&engine);
        // reap happens on the next interaction
        assert!(engine.take_last_error().is_none());
        let buffer = engine.buffer().unwrap();
        assert!(buffer.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn reinitialize_while_idle_replaces_buffer() {
        let mut engine = engine_with(TestSource::new(), TransferMode::Loop, 1000, 100);
        engine.initialize().unwrap();
        engine.initialize().unwrap();
        assert_eq!(engine.buffer().map(<[u8]>::len), Some(1000));
    }

    #[test]
    fn reconfigure_while_receiving_is_rejected() {
        let mut engine = engine_with(TestSource::new(), TransferMode::Loop, 1000, 100);
        let (_segments, handler) = recording_handler();
        engine.set_handler(handler);
        engine.initialize().unwrap();
        engine.start().unwrap();

        let err = engine.set_packet_size(200).unwrap_err();
        assert!(matches!(err, SdrError::InvalidState { .. }));
        engine.stop().unwrap();
    }

    #[test]
    fn gain_within_primary_stage_leaves_secondary_untouched() {
        let source = TestSource::new();
        let primary = Arc::clone(&source.primary_log);
        let secondary = Arc::clone(&source.secondary_log);
        let mut engine = engine_with(source, TransferMode::Loop, 1000, 100);

        engine.set_level(100).unwrap();
        assert_eq!(*primary.lock(), vec![100]);
        assert!(secondary.lock().is_empty());
        assert_eq!(engine.level(), 100);
    }

    #[test]
    fn gain_overflow_saturates_primary_and_routes_to_secondary() {
        let source = TestSource::new();
        let primary = Arc::clone(&source.primary_log);
        let secondary = Arc::clone(&source.secondary_log);
        let mut engine = engine_with(source, TransferMode::Loop, 1000, 100);

        engine.set_level(600).unwrap();
        assert_eq!(*primary.lock(), vec![496]);
        assert_eq!(*secondary.lock(), vec![104]);
        // Effective level is what was applied, not what was requested.
        assert_eq!(engine.level(), 600);
    }

    #[test]
    fn out_of_range_frequency_never_touches_the_device() {
        let source = TestSource::new();
        let frequency_log = Arc::clone(&source.frequency_log);
        let mut engine = engine_with(source, TransferMode::Loop, 1000, 100);

        let err = engine.set_frequency(10).unwrap_err();
        assert!(matches!(err, SdrError::Configuration(_)));
        assert!(frequency_log.lock().is_empty());

        engine.set_frequency(100_000_000).unwrap();
        assert_eq!(*frequency_log.lock(), vec![100_000_000]);
    }
}
