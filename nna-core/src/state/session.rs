//! Per-session protocol state machine.
//!
//! Replaces ad hoc completion flags with one explicit phase value,
//! transitioned only through validated operations that return
//! `Result` instead of panicking.

use crate::error::NnaError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of one classifier session.
///
/// ```text
///  Receiving ──► Dispatching
///      ▲              │
///      └──────────────┘
///      │
///      ▼
///    Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Accepting fragments of the current frame. Initial state.
    #[default]
    Receiving,

    /// A complete frame is being decoded, computed and encoded.
    Dispatching,

    /// The connection is gone. Terminal.
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Receiving => write!(f, "Receiving"),
            Self::Dispatching => write!(f, "Dispatching"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl SessionPhase {
    pub fn is_receiving(&self) -> bool {
        matches!(self, Self::Receiving)
    }

    pub fn is_dispatching(&self) -> bool {
        matches!(self, Self::Dispatching)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Dispatching`.
    ///
    /// Valid from: `Receiving`.
    pub fn begin_dispatch(&mut self) -> Result<(), NnaError> {
        match self {
            Self::Receiving => {
                *self = Self::Dispatching;
                Ok(())
            }
            _ => Err(NnaError::ProtocolViolation(
                "cannot dispatch: not in Receiving state",
            )),
        }
    }

    /// Transition back to `Receiving`.
    ///
    /// Valid from: `Dispatching`.
    pub fn finish_dispatch(&mut self) -> Result<(), NnaError> {
        match self {
            Self::Dispatching => {
                *self = Self::Receiving;
                Ok(())
            }
            _ => Err(NnaError::ProtocolViolation(
                "cannot finish dispatch: not in Dispatching state",
            )),
        }
    }

    /// Transition to `Closed` from any state.
    pub fn close(&mut self) {
        *self = Self::Closed;
    }
}

// ── Tests ────────────────────────────────────────────────────────
