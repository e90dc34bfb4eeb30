//! Fixed-capacity ring buffer with a wrap-around write cursor.
//!
//! The buffer owns its storage outright; there is no reference counting and
//! no locking. The single-writer invariant comes from the engine: only the
//! acquisition worker holds the buffer while a session is live, and the
//! owning thread gets it back when the session ends.

use sdr_core::error::{Result, SdrError};

/// One contiguous destination range inside the ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Byte offset of the segment's start.
    pub offset: usize,
    /// Segment length in bytes.
    pub len: usize,
}

/// The physical read segments making up one logical packet.
///
/// A packet that fits before the wrap point is a single segment. A packet
/// that crosses the wrap point splits into `(cursor, available)` followed by
/// `(0, remainder)`. A packet larger than the whole buffer keeps wrapping,
/// producing one full-buffer pass per lap; every segment still gets its own
/// handler invocation, never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPlan {
    segments: Vec<Segment>,
}

impl SegmentPlan {
    /// Whether the packet crosses the wrap point.
    pub fn is_split(&self) -> bool {
        self.segments.len() > 1
    }

    /// The planned segments, in write order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// Fixed-capacity byte storage with a monotonically advancing, wrap-around
/// write cursor.
#[derive(Debug)]
pub struct RingBuffer {
    storage: Box<[u8]>,
    cursor: usize,
}

impl RingBuffer {
    /// Allocate a buffer of `capacity` bytes with the cursor at zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SdrError::Configuration(
                "ring buffer capacity must be > 0".to_string(),
            ));
        }
        Ok(Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
        })
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Current write cursor, always in `[0, capacity)`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Compute the physical segments for the next `packet_size` bytes.
    ///
    /// With `available = capacity - cursor`: one segment of `packet_size`
    /// when `available >= packet_size`, otherwise `(cursor, available)`
    /// followed by the wrapped remainder starting at offset 0.
    pub fn plan(&self, packet_size: usize) -> SegmentPlan {
        let mut segments = Vec::with_capacity(2);
        let mut offset = self.cursor;
        let mut remaining = packet_size;
        while remaining > 0 {
            let available = self.capacity() - offset;
            let len = remaining.min(available);
            segments.push(Segment { offset, len });
            remaining -= len;
            offset = 0;
        }
        SegmentPlan { segments }
    }

    /// Advance the cursor by one packet: `cursor = (cursor + packet_size)
    /// % capacity`.
    ///
    /// The resulting cursor sequence is periodic with period
    /// `capacity / gcd(capacity, packet_size)`.
    pub fn advance(&mut self, packet_size: usize) {
        self.cursor = (self.cursor + packet_size) % self.capacity();
    }

    /// Mutable view of one planned segment's destination range.
    pub fn segment_mut(&mut self, segment: Segment) -> &mut [u8] {
        &mut self.storage[segment.offset..segment.offset + segment.len]
    }

    /// The whole buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gcd(a: usize, b: usize) -> usize {
        if b == 0 {
            a
        } else {
            gcd(b, a % b)
        }
    }

    #[test]
    fn contiguous_packet_is_one_segment() {
        let ring = RingBuffer::new(1000).unwrap();
        let plan = ring.plan(350);
        assert!(!plan.is_split());
        assert_eq!(
            plan.segments(),
            &[Segment {
                offset: 0,
                len: 350
            }]
        );
    }

    #[test]
    fn wrap_splits_into_tail_and_head() {
        let mut ring = RingBuffer::new(1000).unwrap();
        ring.advance(350);
        ring.advance(350);
        assert_eq!(ring.cursor(), 700);

        let plan = ring.plan(350);
        assert!(plan.is_split());
        assert_eq!(
            plan.segments(),
            &[
                Segment {
                    offset: 700,
                    len: 300
                },
                Segment { offset: 0, len: 50 },
            ]
        );
    }

    #[test]
    fn split_segment_lengths_sum_to_packet_size() {
        for (cap, packet, pos) in [(1000, 350, 700), (512, 100, 450), (4096, 4095, 1)] {
            let mut ring = RingBuffer::new(cap).unwrap();
            ring.advance(pos);
            let plan = ring.plan(packet);
            let total: usize = plan.segments().iter().map(|s| s.len).sum();
            assert_eq!(total, packet);
            assert_eq!(plan.segments()[0].offset, pos % cap);
        }
    }

    #[test]
    fn exact_fit_is_contiguous() {
        let ring = RingBuffer::new(512000).unwrap();
        let plan = ring.plan(512000);
        assert!(!plan.is_split());
        assert_eq!(plan.segments()[0].len, 512000);
    }

    #[test]
    fn oversized_packet_laps_the_buffer() {
        let ring = RingBuffer::new(100).unwrap();
        let plan = ring.plan(250);
        assert_eq!(
            plan.segments(),
            &[
                Segment {
                    offset: 0,
                    len: 100
                },
                Segment {
                    offset: 0,
                    len: 100
                },
                Segment { offset: 0, len: 50 },
            ]
        );
    }

    #[test]
    fn cursor_walks_gcd_period_for_1000_by_350() {
        // cap=1000, packet=350 -> 0, 350, 700, 50, 400, 750, 100, ...
        let mut ring = RingBuffer::new(1000).unwrap();
        let mut positions = vec![ring.cursor()];
        for _ in 0..6 {
            ring.advance(350);
            positions.push(ring.cursor());
        }
        assert_eq!(positions, vec![0, 350, 700, 50, 400, 750, 100]);
    }

    #[test]
    fn cursor_is_periodic_with_gcd_period() {
        for (cap, packet) in [(1000usize, 350usize), (1024, 256), (512000, 153600), (7, 3)] {
            let period = cap / gcd(cap, packet);
            let mut ring = RingBuffer::new(cap).unwrap();
            for i in 1..=period {
                ring.advance(packet);
                if i < period {
                    assert_ne!(ring.cursor(), 0, "cap={} packet={} i={}", cap, packet, i);
                }
            }
            assert_eq!(ring.cursor(), 0, "cap={} packet={}", cap, packet);
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            RingBuffer::new(0),
            Err(SdrError::Configuration(_))
        ));
    }
}
