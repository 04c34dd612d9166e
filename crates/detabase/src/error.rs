//! Error and Result types for Detabase operations.

use crate::store::Timestamp;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for Detabase operations.
pub type Result<T> = std::result::Result<T, DetabaseError>;

/// The error type for Detabase operations.
///
/// Every variant is a per-request failure; none of them leaves the engine in
/// an unusable state.
#[derive(Debug, Error)]
pub enum DetabaseError {
    /// A creation descriptor field failed validation.
    #[error("Invalid descriptor field `{field}`: {reason}")]
    InvalidDescriptor {
        /// Name of the offending descriptor field.
        field: &'static str,
        /// Human readable description of the violation.
        reason: String,
    },

    /// A Detabase with the same name is already registered.
    #[error("Detabase already exists: {0}")]
    AlreadyExists(String),

    /// No Detabase is registered under the requested name.
    #[error("Detabase not found: {0}")]
    NotFound(String),

    /// Payload length does not match the configured payload size.
    #[error("Bad payload size: expected {expected} bytes, got {actual}")]
    BadPayloadSize {
        /// Configured payload size in bytes.
        expected: usize,
        /// Length of the rejected payload.
        actual: usize,
    },

    /// Timestamp is not a multiple of the resolution.
    #[error("Misaligned timestamp {timestamp}: not a multiple of resolution {resolution}")]
    Misaligned {
        /// Rejected timestamp.
        timestamp: Timestamp,
        /// Configured resolution.
        resolution: i64,
    },

    /// The target epoch is sealed and rejects writes.
    #[error("Epoch starting at {start} is sealed")]
    EpochSealed {
        /// Start timestamp of the sealed epoch.
        start: Timestamp,
    },

    /// The target epoch is older than the retained window, was evicted, or
    /// cannot be represented.
    #[error("Timestamp {timestamp} is older than the retained window starting at {oldest}")]
    EpochTooOld {
        /// Rejected timestamp.
        timestamp: Timestamp,
        /// First timestamp past the expired range holding `timestamp`.
        oldest: Timestamp,
    },

    /// Timestamp does not belong to the epoch it was written to.
    #[error("Epoch mismatch: timestamp {timestamp} not in epoch starting at {start}")]
    EpochMismatch {
        /// Rejected timestamp.
        timestamp: Timestamp,
        /// Start timestamp of the epoch (inclusive).
        start: Timestamp,
    },

    /// Slot index is past the end of the segment.
    #[error("Slot {slot} out of range for segment of length {length}")]
    SlotOutOfRange {
        /// Requested slot index.
        slot: usize,
        /// Segment length in slots.
        length: usize,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Bootstrap file could not be parsed.
    #[error("Bootstrap error: {0}")]
    BootstrapError(String),
}

impl DetabaseError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            field,
            reason: reason.into(),
        }
    }
}
