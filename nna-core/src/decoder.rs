//! Sample decoding: wire bytes → fixed-point tensor.
//!
//! The frame is read as little-endian `f32` samples, four bytes at a
//! time, and each sample is scaled into the accelerator's `i16`
//! fixed-point format by truncating `sample * scale` toward zero.
//!
//! # Overflow
//!
//! Conversion saturates: a scaled value above `i16::MAX` becomes
//! `i16::MAX`, below `i16::MIN` becomes `i16::MIN`, and NaN becomes 0.

use crate::error::{NnaError, Result};
use crate::frame::{SAMPLE_BYTES, SCALE, try_zeroed};

/// Fixed-point input of the accelerator.
pub type Tensor = Vec<i16>;

/// Converts completed frames into [`Tensor`]s.
#[derive(Debug, Clone, Copy)]
pub struct SampleDecoder {
    scale: f32,
}

impl SampleDecoder {
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Decode a whole frame.
    pub fn decode(&self, frame: &[u8]) -> Result<Tensor> {
        if frame.len() % SAMPLE_BYTES != 0 {
            return Err(NnaError::InvalidFrameLength {
                expected: frame.len() - frame.len() % SAMPLE_BYTES,
                actual: frame.len(),
            });
        }

        let mut tensor: Tensor = try_zeroed(frame.len() / SAMPLE_BYTES)?;
        for (slot, chunk) in tensor.iter_mut().zip(frame.chunks_exact(SAMPLE_BYTES)) {
            let sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            *slot = self.quantize(sample);
        }
        Ok(tensor)
    }

    /// Scale one sample into fixed point.
    pub fn quantize(&self, sample: f32) -> i16 {
        // `as` truncates toward zero and saturates.
        (sample * self.scale) as i16
    }

    /// Inverse rescale of one fixed-point value.
    pub fn dequantize(&self, value: i16) -> f32 {
        f32::from(value) / self.scale
    }
}

impl Default for SampleDecoder {
    fn default() -> Self {
        Self::new(SCALE)
    }
}

/// Serialise samples into the little-endian wire form of a frame.
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

// ── Tests ────────────────────────────────────────────────────────
