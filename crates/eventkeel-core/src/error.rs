//! Domain error types.

use thiserror::Error;

use crate::identity::Version;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(String),

    /// A point-in-time read asked for a version beyond what is committed.
    #[error("aggregate {aggregate_id} has no version {requested} (committed version is {committed})")]
    VersionNotFound {
        /// The aggregate that was queried.
        aggregate_id: String,
        /// The version the caller asked for.
        requested: Version,
        /// The latest committed version in the store.
        committed: Version,
    },

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: String,
        /// The expected version.
        expected: Version,
        /// The actual version found.
        actual: Version,
    },

    /// A change could not be constructed.
    #[error("invalid change: {0}")]
    InvalidChange(#[from] InvalidChange),

    /// A change history failed integrity validation.
    #[error("history integrity error: {0}")]
    Integrity(#[from] IntegrityViolation),

    /// An erased payload was narrowed to the wrong type.
    #[error("payload type mismatch: expected {expected}, found {actual}")]
    PayloadType {
        /// The type the caller asked for.
        expected: &'static str,
        /// The type the payload actually holds.
        actual: &'static str,
    },

    /// A handler rejected a change that breaks a domain rule.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

/// Reasons a change cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidChange {
    /// The change identifier is empty.
    #[error("change id is empty")]
    EmptyId,
    /// The change reason is empty.
    #[error("change reason is empty")]
    EmptyReason,
    /// The raising aggregate has an unset identity.
    #[error("aggregate id is empty")]
    EmptyAggregateId,
    /// No payload was supplied.
    #[error("change payload is missing")]
    MissingPayload,
}

/// A single integrity failure found while validating a change history.
///
/// Every variant carries the index of the offending change within the
/// candidate batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    /// The change carries no aggregate reference.
    #[error("change at index {index} has no aggregate reference")]
    MissingAggregateRef {
        /// Position of the change in the batch.
        index: usize,
    },

    /// The change references a different aggregate identity.
    #[error("change at index {index} has aggregate id {actual}, want {expected}")]
    AggregateIdMismatch {
        /// Position of the change in the batch.
        index: usize,
        /// The aggregate's identity.
        expected: String,
        /// The identity carried by the change.
        actual: String,
    },

    /// The change references a different aggregate name.
    #[error("change at index {index} has aggregate name {actual:?}, want {expected:?}")]
    AggregateNameMismatch {
        /// Position of the change in the batch.
        index: usize,
        /// The aggregate's name.
        expected: String,
        /// The name carried by the change.
        actual: String,
    },

    /// The change does not continue the aggregate's version sequence.
    #[error("change at index {index} has unexpected version {actual}, want {expected}")]
    UnexpectedVersion {
        /// Position of the change in the batch.
        index: usize,
        /// The next consecutive version.
        expected: Version,
        /// The version carried by the change.
        actual: Version,
    },

    /// The change has no payload.
    #[error("change at index {index} has no payload")]
    MissingPayload {
        /// Position of the change in the batch.
        index: usize,
    },

    /// The change has a zero timestamp.
    #[error("change at index {index} has a zero timestamp")]
    MissingTimestamp {
        /// Position of the change in the batch.
        index: usize,
    },
}

impl IntegrityViolation {
    /// Returns the index of the offending change within the batch.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::MissingAggregateRef { index }
            | Self::AggregateIdMismatch { index, .. }
            | Self::AggregateNameMismatch { index, .. }
            | Self::UnexpectedVersion { index, .. }
            | Self::MissingPayload { index }
            | Self::MissingTimestamp { index } => *index,
        }
    }
}
