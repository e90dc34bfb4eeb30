//! Custom error types for the acquisition stack.
//!
//! [`SdrError`] is the primary error type, built with `thiserror`. The
//! variants follow the failure surfaces of the streaming engine:
//!
//! - **`Configuration`**: semantically invalid values caught before any
//!   device interaction (zero buffer/packet sizes, out-of-range frequency).
//! - **`Precondition`**: an operation was called before its requirements
//!   were met (start without a handler or buffer, re-entrant start).
//! - **`InvalidState`**: an illegal lifecycle transition (stop while idle).
//! - **`HardwareRead`**: a blocking read returned zero bytes mid-stream;
//!   carries the byte counts so a stalled source can be diagnosed without
//!   inspecting internals.
//! - **`Source`**: a device-reported failure, wrapped from [`SourceError`].
//! - **`WorkerPanic`**: the acquisition worker (or a caller-supplied
//!   handler running on it) panicked; observed at join, never unwound
//!   past the worker's top frame.
//!
//! Configuration and precondition errors are always raised synchronously to
//! the calling thread, before any worker is spawned. Worker-side errors are
//! recorded in the session outcome and surfaced by `stop()` or retrievable
//! on the next interaction with the engine.

use crate::source::SourceError;
use crate::state::EngineState;
use thiserror::Error;

/// Convenience alias for results using the acquisition error type.
pub type Result<T> = std::result::Result<T, SdrError>;

/// Primary error type for the acquisition stack.
#[derive(Error, Debug, Clone)]
pub enum SdrError {
    /// Semantically invalid configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An operation was invoked before its preconditions held.
    #[error("Precondition not met for {operation}: {message}")]
    Precondition {
        /// The operation that was attempted.
        operation: &'static str,
        /// What was missing.
        message: String,
    },

    /// Illegal lifecycle transition.
    #[error("Cannot {operation} while engine is {state}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the engine was in.
        state: EngineState,
    },

    /// A blocking read returned no data mid-stream.
    #[error("Hardware read failed: requested {requested} bytes, source returned {returned}")]
    HardwareRead {
        /// Bytes requested from the source.
        requested: usize,
        /// Bytes the source actually produced.
        returned: usize,
    },

    /// Device-reported failure from a sample source.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The acquisition worker panicked; observed when joining it.
    #[error("Acquisition worker panicked")]
    WorkerPanic,

    /// The OS refused to spawn the acquisition worker thread.
    #[error("Failed to spawn acquisition worker: {0}")]
    WorkerSpawn(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceErrorKind;

    #[test]
    fn hardware_read_error_carries_byte_counts() {
        let err = SdrError::HardwareRead {
            requested: 350,
            returned: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("350"));
        assert!(msg.contains("0"));
    }

    #[test]
    fn source_error_converts_transparently() {
        let src = SourceError::new("emulator", SourceErrorKind::Read, "device not open");
        let err: SdrError = src.into();
        assert!(err.to_string().contains("emulator"));
        assert!(err.to_string().contains("device not open"));
    }

    #[test]
    fn invalid_state_names_the_state() {
        let err = SdrError::InvalidState {
            operation: "stop",
            state: EngineState::Waiting,
        };
        assert_eq!(err.to_string(), "Cannot stop while engine is waiting");
    }
}
