//! Software sample source for testing without hardware.
//!
//! [`SdrEmulator`] implements [`SampleSource`] with fully deterministic
//! behavior:
//!
//! - live-mode samples come from a seeded ChaCha8 stream, so two emulators
//!   built with the same seed produce identical byte sequences;
//! - test-pattern mode emits an 8-bit incrementing counter that is
//!   continuous across read boundaries, which makes wraparound bugs in the
//!   consumer visible as counter discontinuities;
//! - reads are paced to the configured sample rate (a read of `n` bytes
//!   blocks for `n / sample_rate` seconds), or not at all when built
//!   unpaced for fast unit tests;
//! - failure scenarios inject device faults at a chosen read count.
//!
//! # Example
//!
//! ```rust,ignore
//! let emulator = SdrEmulator::builder()
//!     .seed(42)
//!     .sample_rate(1_000_000)
//!     .build();
//! ```

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sdr_core::source::{SampleSource, SourceError, SourceErrorKind};
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::{debug, trace};

/// R820T-style tuner gain steps, in tenths of a dB. The maximum supported
/// gain is the last entry, derived by lookup rather than indexing past the
/// end.
const GAIN_STEPS_TENTH_DB: &[u32] = &[
    0, 9, 14, 27, 37, 77, 87, 125, 144, 157, 166, 197, 207, 229, 254, 280, 297, 328, 338, 364,
    372, 386, 402, 421, 434, 439, 445, 480, 496,
];

/// Tunable range the emulated device reports, in Hz.
const FREQUENCY_RANGE_HZ: RangeInclusive<u64> = 100_000..=1_750_000_000;

const SOURCE_TYPE: &str = "emulator";

/// Injected device fault, keyed on the number of reads already issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScenario {
    /// Never fail.
    None,
    /// Report a device error once `reads` reads have succeeded.
    FailAfterReads(u64),
    /// Return zero bytes (a stalled device) once `reads` reads have
    /// succeeded.
    ZeroLengthAfterReads(u64),
    /// Produce short reads of `len` bytes once `reads` reads have
    /// succeeded.
    ShortReadAfterReads {
        /// Reads to complete normally first.
        reads: u64,
        /// Length of each subsequent short read.
        len: usize,
    },
}

/// Builder for [`SdrEmulator`].
#[derive(Debug, Clone)]
pub struct SdrEmulatorBuilder {
    seed: u64,
    sample_rate: u32,
    paced: bool,
    scenario: FailureScenario,
}

impl SdrEmulatorBuilder {
    /// Seed for the sample stream. Same seed, same bytes.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Initial sampling rate, in samples per second.
    pub fn sample_rate(mut self, hz: u32) -> Self {
        self.sample_rate = hz;
        self
    }

    /// Disable read pacing. Reads return immediately; useful for unit
    /// tests that only care about data flow.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Inject a failure scenario.
    pub fn scenario(mut self, scenario: FailureScenario) -> Self {
        self.scenario = scenario;
        self
    }

    /// Build the emulator. The device starts closed.
    pub fn build(self) -> SdrEmulator {
        SdrEmulator {
            opened: false,
            sample_rate: self.sample_rate,
            frequency: 100_000_000,
            test_pattern: false,
            counter: 0,
            primary_gain: 0,
            secondary_gain: 0,
            rng: ChaCha8Rng::seed_from_u64(self.seed),
            scenario: self.scenario,
            reads_issued: 0,
            paced: self.paced,
        }
    }
}

impl Default for SdrEmulatorBuilder {
    fn default() -> Self {
        Self {
            seed: 0,
            sample_rate: 1_000_000,
            paced: true,
            scenario: FailureScenario::None,
        }
    }
}

/// Deterministic software implementation of [`SampleSource`].
#[derive(Debug)]
pub struct SdrEmulator {
    opened: bool,
    sample_rate: u32,
    frequency: u64,
    test_pattern: bool,
    /// Test-pattern counter, continuous across read boundaries.
    counter: u8,
    primary_gain: u32,
    secondary_gain: u32,
    rng: ChaCha8Rng,
    scenario: FailureScenario,
    reads_issued: u64,
    paced: bool,
}

impl SdrEmulator {
    /// Emulator with default settings (seed 0, 1 MS/s, paced).
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building an emulator.
    pub fn builder() -> SdrEmulatorBuilder {
        SdrEmulatorBuilder::default()
    }

    /// Reads issued so far, including failed ones.
    pub fn reads_issued(&self) -> u64 {
        self.reads_issued
    }

    fn not_open(&self, kind: SourceErrorKind) -> SourceError {
        SourceError::new(SOURCE_TYPE, kind, "device not open")
    }

    /// Snap a requested primary gain to the nearest supported step, the way
    /// tuner drivers do.
    fn snap_gain(requested: u32) -> u32 {
        GAIN_STEPS_TENTH_DB
            .iter()
            .copied()
            .min_by_key(|step| step.abs_diff(requested))
            .unwrap_or(0)
    }
}

impl Default for SdrEmulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for SdrEmulator {
    fn open(&mut self) -> Result<(), SourceError> {
        self.opened = true;
        debug!(sample_rate = self.sample_rate, "emulator opened");
        Ok(())
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.opened = false;
        debug!("emulator closed");
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        if !self.opened {
            return Err(self.not_open(SourceErrorKind::Read));
        }
        self.reads_issued += 1;

        let mut len = buf.len();
        match self.scenario {
            FailureScenario::None => {}
            FailureScenario::FailAfterReads(reads) => {
                if self.reads_issued > reads {
                    return Err(SourceError::new(
                        SOURCE_TYPE,
                        SourceErrorKind::Read,
                        format!("injected device fault on read {}", self.reads_issued),
                    ));
                }
            }
            FailureScenario::ZeroLengthAfterReads(reads) => {
                if self.reads_issued > reads {
                    return Ok(0);
                }
            }
            FailureScenario::ShortReadAfterReads { reads, len: short } => {
                if self.reads_issued > reads {
                    len = short.min(len);
                }
            }
        }

        if self.test_pattern {
            for byte in &mut buf[..len] {
                *byte = self.counter;
                self.counter = self.counter.wrapping_add(1);
            }
        } else {
            self.rng.fill_bytes(&mut buf[..len]);
        }

        if self.paced && self.sample_rate > 0 {
            std::thread::sleep(Duration::from_secs_f64(
                len as f64 / f64::from(self.sample_rate),
            ));
        }
        trace!(requested = buf.len(), produced = len, "emulator read");
        Ok(len)
    }

    fn set_frequency(&mut self, hz: u64) -> Result<(), SourceError> {
        if !FREQUENCY_RANGE_HZ.contains(&hz) {
            return Err(SourceError::new(
                SOURCE_TYPE,
                SourceErrorKind::Tune,
                format!("frequency {} Hz not tunable", hz),
            ));
        }
        self.frequency = hz;
        debug!(hz, "emulator tuned");
        Ok(())
    }

    fn set_sample_rate(&mut self, hz: u32) -> Result<(), SourceError> {
        if hz == 0 {
            return Err(SourceError::new(
                SOURCE_TYPE,
                SourceErrorKind::Tune,
                "sample rate must be > 0",
            ));
        }
        self.sample_rate = hz;
        debug!(hz, "emulator sample rate set");
        Ok(())
    }

    fn set_primary_gain(&mut self, tenth_db: u32) -> Result<(), SourceError> {
        self.primary_gain = Self::snap_gain(tenth_db);
        debug!(
            requested = tenth_db,
            applied = self.primary_gain,
            "emulator primary gain set"
        );
        Ok(())
    }

    fn set_secondary_gain(&mut self, tenth_db: u32) -> Result<(), SourceError> {
        self.secondary_gain = tenth_db;
        debug!(tenth_db, "emulator secondary gain set");
        Ok(())
    }

    fn set_test_pattern(&mut self, enabled: bool) -> Result<(), SourceError> {
        self.test_pattern = enabled;
        if enabled {
            self.counter = 0;
        }
        debug!(enabled, "emulator test pattern mode");
        Ok(())
    }

    fn max_primary_gain(&self) -> u32 {
        GAIN_STEPS_TENTH_DB.last().copied().unwrap_or(0)
    }

    fn current_primary_gain(&self) -> u32 {
        self.primary_gain
    }

    fn frequency_range(&self) -> RangeInclusive<u64> {
        FREQUENCY_RANGE_HZ
    }
}
