//! Frame geometry shared by the reassembler, decoder and client.
//!
//! One frame is a single-channel 32x32 feature map of little-endian
//! `f32` samples, sent as `PACKET_COUNT` packets of `PACKET_BYTES` each.

use crate::error::{NnaError, Result};

/// Bytes per fragment on the wire.
pub const PACKET_BYTES: usize = 1024;

/// Fragments per frame.
pub const PACKET_COUNT: usize = 4;

/// Bytes per complete frame.
pub const TOTAL_BYTES: usize = PACKET_BYTES * PACKET_COUNT;

/// Width of one `f32` sample on the wire.
pub const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Samples per complete frame.
pub const SAMPLE_COUNT: usize = TOTAL_BYTES / SAMPLE_BYTES;

/// Height and width of the input feature map.
pub const INPUT_SIDE: usize = 32;

/// Fixed-point scale factor of the accelerator's numeric format.
pub const SCALE: f32 = 256.0;

/// Length of the accelerator's output vector.
pub const NUM_CLASSES: usize = 10;

/// Byte sent back after every accepted, non-final fragment.
pub const ACK_BYTE: u8 = b's';

/// Port the classifier listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 7;

// ── FrameLayout ──────────────────────────────────────────────────

/// How a frame is cut into fragments.
///
/// Invariant: `packet_bytes` is a non-zero multiple of [`SAMPLE_BYTES`]
/// and `packet_count` is non-zero, so a sample never straddles two
/// fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    packet_bytes: usize,
    packet_count: usize,
}

impl FrameLayout {
    /// Validate and build a layout.
    pub fn new(packet_bytes: usize, packet_count: usize) -> Result<Self> {
        if packet_bytes == 0 {
            return Err(NnaError::InvalidLayout("packet size must be non-zero"));
        }
        if packet_count == 0 {
            return Err(NnaError::InvalidLayout("packet count must be non-zero"));
        }
        if packet_bytes % SAMPLE_BYTES != 0 {
            return Err(NnaError::InvalidLayout(
                "packet size must be a multiple of the sample width",
            ));
        }
        packet_bytes
            .checked_mul(packet_count)
            .ok_or(NnaError::InvalidLayout("frame size overflows"))?;

        Ok(Self {
            packet_bytes,
            packet_count,
        })
    }

    pub fn packet_bytes(&self) -> usize {
        self.packet_bytes
    }

    pub fn packet_count(&self) -> usize {
        self.packet_count
    }

    pub fn total_bytes(&self) -> usize {
        self.packet_bytes * self.packet_count
    }

    pub fn sample_count(&self) -> usize {
        self.total_bytes() / SAMPLE_BYTES
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            packet_bytes: PACKET_BYTES,
            packet_count: PACKET_COUNT,
        }
    }
}

impl std::fmt::Display for FrameLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} x {} B ({} samples)",
            self.packet_count,
            self.packet_bytes,
            self.sample_count()
        )
    }
}

/// Reserve a zero-filled buffer, reporting failure instead of aborting.
pub(crate) fn try_zeroed<T: Default + Clone>(len: usize) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| NnaError::AllocationFailure {
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    buf.resize(len, T::default());
    Ok(buf)
}
