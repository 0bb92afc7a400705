//! Packet reassembly.
//!
//! Fragments are accepted only when their length equals the layout's
//! packet size exactly. Anything else is dropped without touching the
//! frame buffer or the progress counter: there is no partial copy and
//! no merging of short fragments.
//!
//! ```text
//!  fragment ──► len == packet_bytes? ──no──► Incomplete { accepted: false }
//!                      │
//!                     yes
//!                      ▼
//!       copy at progress * packet_bytes, progress += 1
//!                      │
//!        progress == packet_count? ──no──► Incomplete { accepted: true }
//!                      │
//!                     yes ──► progress = 0, Complete
//! ```

use tracing::{debug, trace};

use crate::error::Result;
use crate::frame::{FrameLayout, try_zeroed};

/// Outcome of feeding one fragment to the [`Reassembler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// The frame still needs more fragments.
    ///
    /// `accepted` is `false` when the fragment had the wrong size and
    /// was discarded.
    Incomplete { accepted: bool },

    /// The fragment completed the frame; [`Reassembler::frame`] now
    /// holds it.
    Complete,
}

impl Ingest {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Accumulates fixed-size fragments into one frame.
pub struct Reassembler {
    layout: FrameLayout,
    /// Fixed-capacity frame store, `layout.total_bytes()` long.
    buffer: Vec<u8>,
    /// Fragments accepted since the last completed frame.
    progress: usize,
}

impl Reassembler {
    /// Create a reassembler, reserving the frame buffer up front.
    pub fn new(layout: FrameLayout) -> Result<Self> {
        Ok(Self {
            layout,
            buffer: try_zeroed(layout.total_bytes())?,
            progress: 0,
        })
    }

    /// Feed one fragment.
    pub fn ingest(&mut self, fragment: &[u8]) -> Ingest {
        let packet_bytes = self.layout.packet_bytes();
        if fragment.len() != packet_bytes {
            debug!(
                len = fragment.len(),
                expected = packet_bytes,
                "discarding malformed fragment"
            );
            return Ingest::Incomplete { accepted: false };
        }

        let offset = self.progress * packet_bytes;
        self.buffer[offset..offset + packet_bytes].copy_from_slice(fragment);
        self.progress += 1;
        trace!(
            fragment = self.progress,
            of = self.layout.packet_count(),
            "fragment accepted"
        );

        if self.progress == self.layout.packet_count() {
            self.progress = 0;
            Ingest::Complete
        } else {
            Ingest::Incomplete { accepted: true }
        }
    }

    /// Fragments accepted towards the current frame.
    pub fn progress(&self) -> usize {
        self.progress
    }

    /// The frame buffer.
    ///
    /// Holds a whole frame right after [`Ingest::Complete`]; the next
    /// accepted fragment starts overwriting it.
    pub fn frame(&self) -> &[u8] {
        &self.buffer
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Abandon any partially received frame.
    pub fn reset(&mut self) {
        self.progress = 0;
    }
}

impl std::fmt::Debug for Reassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reassembler")
            .field("layout", &self.layout)
            .field("progress", &self.progress)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PACKET_BYTES, PACKET_COUNT, TOTAL_BYTES};

    fn fragment(fill: u8) -> Vec<u8> {
        vec![fill; PACKET_BYTES]
    }

    #[test]
    fn completes_on_last_fragment_and_resets_progress() {
        let mut r = Reassembler::new(FrameLayout::default()).unwrap();

        for i in 0..PACKET_COUNT - 1 {
            let status = r.ingest(&fragment(i as u8));
            assert_eq!(status, Ingest::Incomplete { accepted: true });
            assert_eq!(r.progress(), i + 1);
        }

        let status = r.ingest(&fragment(0xFF));
        assert_eq!(status, Ingest::Complete);
        assert_eq!(r.progress(), 0);
    }

    #[test]
    fn fragments_land_in_order() {
        let mut r = Reassembler::new(FrameLayout::default()).unwrap();
        for i in 0..PACKET_COUNT {
            r.ingest(&fragment(i as u8 + 1));
        }

        let frame = r.frame();
        assert_eq!(frame.len(), TOTAL_BYTES);
        for i in 0..PACKET_COUNT {
            let chunk = &frame[i * PACKET_BYTES..(i + 1) * PACKET_BYTES];
            assert!(chunk.iter().all(|&b| b == i as u8 + 1));
        }
    }

    #[test]
    fn wrong_size_is_ignored() {
        let mut r = Reassembler::new(FrameLayout::default()).unwrap();
        r.ingest(&fragment(0xAA));
        let before = r.frame().to_vec();

        for len in [0, 1, 600, PACKET_BYTES - 1, PACKET_BYTES + 1, TOTAL_BYTES] {
            let status = r.ingest(&vec![0x55; len]);
            assert_eq!(status, Ingest::Incomplete { accepted: false });
            assert_eq!(r.progress(), 1);
            assert_eq!(r.frame(), &before[..]);
        }
    }

    #[test]
    fn wrong_size_before_first_fragment_keeps_counter_at_zero() {
        let mut r = Reassembler::new(FrameLayout::default()).unwrap();
        assert!(!r.ingest(&[0u8; 600]).is_complete());
        assert_eq!(r.progress(), 0);

        r.ingest(&fragment(7));
        assert_eq!(r.progress(), 1);
        assert!(r.frame()[..PACKET_BYTES].iter().all(|&b| b == 7));
    }

    #[test]
    fn back_to_back_frames() {
        let mut r = Reassembler::new(FrameLayout::new(8, 2).unwrap()).unwrap();
        assert!(!r.ingest(&[1; 8]).is_complete());
        assert!(r.ingest(&[2; 8]).is_complete());
        assert!(!r.ingest(&[3; 8]).is_complete());
        assert!(r.ingest(&[4; 8]).is_complete());
        assert_eq!(r.frame(), &[3, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4]);
    }

    #[test]
    fn reset_drops_partial_frame() {
        let mut r = Reassembler::new(FrameLayout::default()).unwrap();
        r.ingest(&fragment(1));
        r.ingest(&fragment(2));
        r.reset();
        assert_eq!(r.progress(), 0);
    }

    #[test]
    fn single_packet_layout_completes_immediately() {
        let mut r = Reassembler::new(FrameLayout::new(4, 1).unwrap()).unwrap();
        assert!(r.ingest(&[0, 0, 128, 63]).is_complete());
        assert_eq!(r.progress(), 0);
    }
}
