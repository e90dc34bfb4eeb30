//! Ring-buffered streaming acquisition engine.
//!
//! The engine consumes the abstract [`sdr_core::SampleSource`] capability
//! and knows nothing about how samples are physically produced. See
//! [`engine::StreamEngine`] for the lifecycle and concurrency model, and
//! [`ring::RingBuffer`] for the cursor-split arithmetic.

pub mod engine;
pub mod ring;

pub use engine::{Handler, SharedSource, StreamEngine};
pub use ring::{RingBuffer, Segment, SegmentPlan};
