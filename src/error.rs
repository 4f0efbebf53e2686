//! Error taxonomy surfaced by the queue, QSO and status operations.
//!
//! Domain outcomes (inactive, duplicate, full, missing, nothing to advance)
//! are expected and carry enough detail to render a message to the user.
//! [`PileupError::StoreUnavailable`] is infrastructural: read-only count and
//! status probes degrade instead of returning it, mutations surface it.

use crate::{persist::StoreError, types::Callsign};

/// Errors returned by pileup operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PileupError {
    /// Registration attempted while the system is switched off.
    #[error("System is currently inactive. Registration is not available.")]
    SystemInactive,

    /// The callsign already holds a queue slot.
    #[error("Callsign {0} is already in the queue")]
    AlreadyQueued(Callsign),

    /// The queue is at capacity.
    #[error("Queue is full. Maximum queue size is {capacity}")]
    QueueFull {
        /// Configured maximum queue size.
        capacity: usize,
    },

    /// The callsign is not in the queue.
    #[error("Callsign {0} not found in queue")]
    NotFound(Callsign),

    /// Neither a queued entry nor a current QSO existed.
    #[error("Queue is empty and no QSO is in progress")]
    NothingToAdvance,

    /// The callsign text failed normalization or validation.
    #[error("Invalid callsign {callsign:?}: {reason}")]
    InvalidCallsign {
        /// The offending input (normalized when possible).
        callsign: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Operating frequency text was empty after trimming.
    #[error("Frequency is required")]
    InvalidFrequency,

    /// The backing store failed or timed out.
    #[error("Store unavailable during {operation}: {reason}")]
    StoreUnavailable {
        /// Store operation that failed.
        operation: &'static str,
        /// Backend error text.
        reason: String,
    },

    /// A store write overran its timeout and grace period; it may or may
    /// not have been applied.
    #[error("Outcome of {operation} unknown after {waited_ms} ms; the write may still apply")]
    OutcomeUnknown {
        /// Store operation that stalled.
        operation: &'static str,
        /// How long the handle waited before giving up.
        waited_ms: u64,
    },

    /// A status transition failed after some of its steps applied, or on a
    /// step whose outcome is unknown.
    #[error(
        "Status change to active={active} partially applied (completed: {completed:?}); {failed} failed: {reason}"
    )]
    PartialStatusChange {
        /// Requested status.
        active: bool,
        /// Steps that finished before the failure.
        completed: Vec<&'static str>,
        /// Step that failed.
        failed: &'static str,
        /// Backend error text.
        reason: String,
    },

    /// Configuration value could not be used.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The runtime actor is gone.
    #[error("pileup runtime channel closed")]
    ChannelClosed,
}

impl PileupError {
    /// Wraps a backend failure for `operation`.
    ///
    /// A uniqueness violation from the store is the duplicate-registration
    /// outcome, not an infrastructure failure.
    pub fn from_store(operation: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(call) => Self::AlreadyQueued(Callsign::normalize(&call)),
            other => Self::StoreUnavailable {
                operation,
                reason: other.to_string(),
            },
        }
    }

    /// Returns true when the failed step may nevertheless have been applied.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, Self::OutcomeUnknown { .. })
    }

    /// Returns true for expected domain outcomes.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::SystemInactive
                | Self::AlreadyQueued(_)
                | Self::QueueFull { .. }
                | Self::NotFound(_)
                | Self::NothingToAdvance
                | Self::InvalidCallsign { .. }
                | Self::InvalidFrequency
        )
    }
}

/// Result alias for pileup operations.
pub type PileupResult<T> = Result<T, PileupError>;
