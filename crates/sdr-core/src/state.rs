//! Acquisition lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a streaming engine.
///
/// `Waiting` is both the initial and the terminal state. `Diagnostic` is a
/// receiving sub-mode in which the sample source emits a known test pattern
/// instead of live data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Idle; no acquisition session is live.
    Waiting,
    /// A background worker is streaming live data.
    Receiving,
    /// A background worker is streaming the source's test pattern.
    Diagnostic,
}

impl EngineState {
    /// Whether a session is live in this state.
    pub fn is_receiving(self) -> bool {
        matches!(self, EngineState::Receiving | EngineState::Diagnostic)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EngineState::Waiting => "waiting",
            EngineState::Receiving => "receiving",
            EngineState::Diagnostic => "diagnostic",
        };
        write!(f, "{}", label)
    }
}
