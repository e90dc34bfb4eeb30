//! Transfer configuration.
//!
//! [`TransferConfig`] is immutable once an acquisition session has started.
//! Validation happens at configuration time; invalid values fail loudly and
//! are never silently clamped.

use crate::error::{Result, SdrError};
use serde::{Deserialize, Serialize};

/// Acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Repeat read cycles until stopped.
    Loop,
    /// Perform exactly one read cycle, then return to idle.
    Single,
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferMode::Loop => write!(f, "loop"),
            TransferMode::Single => write!(f, "single"),
        }
    }
}

/// Ring buffer and chunking parameters for an acquisition.
///
/// `packet_size` may exceed, equal, or be non-divisible into `buffer_size`;
/// the engine's cursor-split algorithm handles all three. Both sizes must be
/// strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Acquisition mode.
    pub mode: TransferMode,
    /// Ring buffer capacity in bytes.
    pub buffer_size: usize,
    /// Logical chunk ("packet") size in bytes.
    pub packet_size: usize,
}

impl TransferConfig {
    /// Create a validated configuration.
    pub fn new(mode: TransferMode, buffer_size: usize, packet_size: usize) -> Result<Self> {
        let config = Self {
            mode,
            buffer_size,
            packet_size,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject non-positive sizes.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(SdrError::Configuration(
                "buffer_size must be > 0".to_string(),
            ));
        }
        if self.packet_size == 0 {
            return Err(SdrError::Configuration(
                "packet_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
