//! The sample source capability.
//!
//! [`SampleSource`] is the seam between the streaming engine and whatever
//! physically (or synthetically) produces samples. The engine depends only
//! on this trait; a hardware adapter and the software emulator are its two
//! implementors, and neither is part of the core.
//!
//! All reads are blocking. There is no async variant: the engine's
//! concurrency model is one dedicated worker thread issuing synchronous
//! reads, so the trait stays synchronous as well.

use std::ops::RangeInclusive;
use thiserror::Error;

/// Failure category reported by a sample source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Opening or closing the device-like resource failed.
    Open,
    /// A blocking read failed.
    Read,
    /// Tuning (frequency or sample rate) was rejected by the device.
    Tune,
    /// A gain stage rejected the requested value.
    Gain,
    /// Switching test-pattern mode failed.
    Mode,
}

impl std::fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SourceErrorKind::Open => "open",
            SourceErrorKind::Read => "read",
            SourceErrorKind::Tune => "tune",
            SourceErrorKind::Gain => "gain",
            SourceErrorKind::Mode => "mode",
        };
        write!(f, "{}", label)
    }
}

/// Device-reported error from a sample source.
#[derive(Error, Debug, Clone)]
#[error("Source '{source_type}' {kind} error: {message}")]
pub struct SourceError {
    /// Which implementor reported the error (e.g. "emulator").
    pub source_type: String,
    /// Failure category.
    pub kind: SourceErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl SourceError {
    /// Build a source error.
    pub fn new(
        source_type: impl Into<String>,
        kind: SourceErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// A device-like producer of raw sample bytes.
///
/// Gain values are in tenths of a dB throughout, matching common tuner
/// driver conventions.
pub trait SampleSource {
    /// Acquire the underlying resource. Must be called before `read`.
    fn open(&mut self) -> Result<(), SourceError>;

    /// Release the underlying resource.
    fn close(&mut self) -> Result<(), SourceError>;

    /// Blocking read of up to `buf.len()` bytes into `buf`.
    ///
    /// Returns the number of bytes actually produced. Callers treat a zero
    /// return as a hard failure; implementors signal device faults through
    /// `Err` instead of a sentinel count.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError>;

    /// Tune the center frequency, in Hz.
    fn set_frequency(&mut self, hz: u64) -> Result<(), SourceError>;

    /// Set the sampling rate, in samples per second.
    fn set_sample_rate(&mut self, hz: u32) -> Result<(), SourceError>;

    /// Set the primary (tuner) gain stage, in tenths of a dB.
    fn set_primary_gain(&mut self, tenth_db: u32) -> Result<(), SourceError>;

    /// Set the secondary (IF) gain stage, in tenths of a dB.
    fn set_secondary_gain(&mut self, tenth_db: u32) -> Result<(), SourceError>;

    /// Switch the source's known-test-pattern mode on or off.
    fn set_test_pattern(&mut self, enabled: bool) -> Result<(), SourceError>;

    /// Maximum value the primary gain stage supports, in tenths of a dB.
    fn max_primary_gain(&self) -> u32;

    /// Primary gain actually applied by the device, in tenths of a dB.
    fn current_primary_gain(&self) -> u32;

    /// Tunable frequency range of the configured device, in Hz.
    ///
    /// The engine validates requested frequencies against this; the range is
    /// a property of the device, never hard-coded in the core.
    fn frequency_range(&self) -> RangeInclusive<u64>;
}
