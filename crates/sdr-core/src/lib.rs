//! Core types and traits for sdr-daq.
//!
//! This crate is the leaf of the workspace: it defines the error taxonomy,
//! the transfer configuration, the [`SampleSource`] capability trait that
//! decouples the streaming engine from physical hardware, and the two-stage
//! gain arithmetic shared by all tuner-like sources.
//!
//! Nothing here spawns threads or touches devices; the streaming engine
//! lives in `sdr-engine` and the software device in `sdr-driver-emulator`.

pub mod config;
pub mod error;
pub mod gain;
pub mod source;
pub mod state;

pub use config::{TransferConfig, TransferMode};
pub use error::{Result, SdrError};
pub use gain::{split_level, GainSplit, MAX_IF_GAIN_TENTH_DB};
pub use source::{SampleSource, SourceError, SourceErrorKind};
pub use state::EngineState;
