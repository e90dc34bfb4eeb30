//! Two-stage gain arithmetic.
//!
//! Tuner-like sources have a primary gain stage capped at a device-reported
//! maximum and a bounded secondary ("IF") stage that picks up the remainder
//! once the primary saturates. [`split_level`] is the pure routing function;
//! the engine applies the result to the source and remembers the secondary
//! contribution it actually set, so the reported effective level is what
//! was applied rather than what was requested.

/// Upper bound of the secondary (IF) gain stage, in tenths of a dB.
///
/// Matches the 15 dB limit of the last IF amplifier stage on E4000-class
/// tuners.
pub const MAX_IF_GAIN_TENTH_DB: u32 = 150;

/// Gain routed to the two hardware stages, in tenths of a dB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainSplit {
    /// Value for the primary (tuner) stage.
    pub primary: u32,
    /// Value for the secondary (IF) stage, if the primary saturated.
    /// `None` means the secondary stage is left untouched.
    pub secondary: Option<u32>,
}

/// Route a requested level across the two gain stages.
///
/// If the request fits within the primary stage it is applied there
/// entirely. Otherwise the primary saturates at `max_primary` and the
/// overflow goes to the secondary stage, capped at
/// [`MAX_IF_GAIN_TENTH_DB`].
pub fn split_level(requested_tenth_db: u32, max_primary: u32) -> GainSplit {
    if requested_tenth_db > max_primary {
        let overflow = requested_tenth_db - max_primary;
        GainSplit {
            primary: max_primary,
            secondary: Some(overflow.min(MAX_IF_GAIN_TENTH_DB)),
        }
    } else {
        GainSplit {
            primary: requested_tenth_db,
            secondary: None,
        }
    }
}
