//! Result encoding: accelerator output → single class byte.

use crate::error::{NnaError, Result};
use crate::frame::{NUM_CLASSES, SCALE};

/// Raw fixed-point output of the accelerator.
pub type OutputVector = Vec<i16>;

/// Index of the winning class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassIndex(usize);

impl ClassIndex {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn get(&self) -> usize {
        self.0
    }

    /// The single signed byte sent on the wire.
    pub fn to_wire(self) -> Result<u8> {
        let byte = i8::try_from(self.0).map_err(|_| NnaError::ResultOutOfRange(self.0))?;
        Ok(byte as u8)
    }
}

impl std::fmt::Display for ClassIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reduces an [`OutputVector`] to a [`ClassIndex`].
#[derive(Debug, Clone, Copy)]
pub struct ResultEncoder {
    scale: f32,
    num_classes: usize,
}

impl ResultEncoder {
    /// `num_classes` must be in `1..=128` so every index fits a signed byte.
    pub fn new(scale: f32, num_classes: usize) -> Result<Self> {
        if num_classes == 0 {
            return Err(NnaError::InvalidLayout("class count must be non-zero"));
        }
        if num_classes > i8::MAX as usize + 1 {
            return Err(NnaError::ResultOutOfRange(num_classes - 1));
        }
        Ok(Self { scale, num_classes })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Argmax over the rescaled output.
    ///
    /// Strict `>` against the running maximum: the earliest of several
    /// equal maxima wins.
    pub fn encode(&self, output: &[i16]) -> Result<ClassIndex> {
        if output.len() != self.num_classes {
            return Err(NnaError::OutputLength {
                expected: self.num_classes,
                actual: output.len(),
            });
        }
        Ok(ClassIndex(argmax(output.iter().map(|&v| f32::from(v) / self.scale))))
    }
}

impl Default for ResultEncoder {
    fn default() -> Self {
        Self {
            scale: SCALE,
            num_classes: NUM_CLASSES,
        }
    }
}

/// Index of the first maximal element; 0 for an empty sequence.
pub fn argmax<I>(values: I) -> usize
where
    I: IntoIterator,
    I::Item: PartialOrd,
{
    let mut values = values.into_iter().enumerate();
    let Some((_, mut best)) = values.next() else {
        return 0;
    };
    let mut best_index = 0;
    for (i, v) in values {
        if v > best {
            best = v;
            best_index = i;
        }
    }
    best_index
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earliest_maximum_wins_ties() {
        assert_eq!(argmax([3, 3, 5, 5, 1]), 2);
        assert_eq!(argmax([7.0, 7.0]), 0);
    }

    #[test]
    fn picks_the_peak() {
        let encoder = ResultEncoder::default();
        let class = encoder.encode(&[0, 0, 0, 7, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(class.get(), 3);
        assert_eq!(class.to_wire().unwrap(), 3);
    }

    #[test]
    fn all_negative_output() {
        let encoder = ResultEncoder::default();
        let out = [-90, -40, -300, -41, -500, -40, -999, -1000, -77, -88];
        assert_eq!(encoder.encode(&out).unwrap().get(), 1);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let encoder = ResultEncoder::default();
        assert!(matches!(
            encoder.encode(&[1, 2, 3]),
            Err(NnaError::OutputLength {
                expected: 10,
                actual: 3
            })
        ));
    }

    #[test]
    fn wire_byte_guards_signed_range() {
        assert_eq!(ClassIndex::new(127).to_wire().unwrap(), 127);
        assert!(matches!(
            ClassIndex::new(128).to_wire(),
            Err(NnaError::ResultOutOfRange(128))
        ));
    }

    #[test]
    fn class_count_must_fit_a_signed_byte() {
        assert!(ResultEncoder::new(SCALE, 128).is_ok());
        assert!(ResultEncoder::new(SCALE, 129).is_err());
        assert!(ResultEncoder::new(SCALE, 0).is_err());
    }
}
