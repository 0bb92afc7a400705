//! Domain-specific error types for the NNA classifier link.
//!
//! All fallible operations return `Result<T, NnaError>`.
//! No panics on invalid input: every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the NNA classifier link.
#[derive(Debug, Error)]
pub enum NnaError {
    // ── Frame Errors ─────────────────────────────────────────────
    /// A scratch or frame buffer could not be reserved.
    #[error("allocation failure: could not reserve {bytes} bytes")]
    AllocationFailure { bytes: usize },

    /// The frame layout parameters are inconsistent.
    #[error("invalid frame layout: {0}")]
    InvalidLayout(&'static str),

    /// A frame handed to the decoder has the wrong length.
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidFrameLength { expected: usize, actual: usize },

    // ── Accelerator Errors ───────────────────────────────────────
    /// No configuration entry exists for the requested device.
    #[error("accelerator lookup failed for device {device_id}")]
    AcceleratorLookup { device_id: u32 },

    /// The accelerator driver refused to initialise.
    #[error("accelerator initialisation failed: {0}")]
    AcceleratorInit(String),

    /// The accelerator did not report completion before the deadline.
    #[error("accelerator timed out after {0:?}")]
    AcceleratorTimeout(Duration),

    /// The accelerator produced an output vector of unexpected size.
    #[error("invalid output length: expected {expected}, got {actual}")]
    OutputLength { expected: usize, actual: usize },

    /// A class index does not fit the single signed result byte.
    #[error("classification result {0} does not fit a signed byte")]
    ResultOutOfRange(usize),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A state transition or reply violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The peer closed the connection before the exchange finished.
    #[error("connection closed")]
    ConnectionClosed,

    // ── Application Errors ───────────────────────────────────────
    /// Configuration could not be parsed or applied.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using [`NnaError`].
pub type Result<T> = std::result::Result<T, NnaError>;

// ── Convenient From implementations ──────────────────────────────

impl From<String> for NnaError {
    fn from(s: String) -> Self {
        NnaError::Other(s)
    }
}

impl From<&str> for NnaError {
    fn from(s: &str) -> Self {
        NnaError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = NnaError::AcceleratorLookup { device_id: 3 };
        assert!(e.to_string().contains("device 3"));

        let e = NnaError::OutputLength {
            expected: 10,
            actual: 4,
        };
        assert!(e.to_string().contains("10"));
        assert!(e.to_string().contains("4"));

        let e = NnaError::AcceleratorTimeout(Duration::from_millis(250));
        assert!(e.to_string().contains("250ms"));
    }

    #[test]
    fn from_string() {
        let e: NnaError = "something broke".into();
        assert!(matches!(e, NnaError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: NnaError = io_err.into();
        assert!(matches!(e, NnaError::Connection(_)));
    }
}
