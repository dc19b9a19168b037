//! Error kinds for the document core.

use crate::clock::TimeTicket;
use thiserror::Error;

/// Everything that can go wrong inside the document core.
///
/// Local `update` sessions surface these to the caller and abort the
/// session atomically (see [`Document::update`](crate::document::Document::update)).
/// Remote replay treats [`DocumentError::NotFound`] as non-fatal and skips
/// the offending operation instead of propagating; see
/// [`crate::operation::apply`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// An element handle was used before the document attached it.
    #[error("element `{key}` used before initialization")]
    NotInitialized {
        /// The key or path that was not yet initialized.
        key: String,
    },

    /// A caller-supplied argument violates a structural invariant.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Human-readable description of the violated constraint.
        message: String,
    },

    /// A parent or target ticket referenced by an operation is absent.
    /// Recovered from during remote replay by skipping the operation.
    #[error("no element found for ticket {ticket}")]
    NotFound {
        /// The ticket that could not be resolved.
        ticket: TimeTicket,
    },

    /// A primitive value could not be converted to the requested type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The type the caller expected.
        expected: &'static str,
        /// The type the value actually held.
        actual: &'static str,
    },

    /// An operation or value type was not recognized. Fatal during replay.
    #[error("unimplemented: {what}")]
    Unimplemented {
        /// What was unrecognized.
        what: String,
    },

    /// The document has been removed and can no longer be mutated.
    #[error("document has been removed")]
    DocumentRemoved,

    /// The document has not been attached to a client/session yet.
    #[error("document is not attached")]
    DocumentNotAttached,

    /// A size limit on the document was exceeded.
    #[error("document size {actual} exceeds limit {limit}")]
    DocumentSizeExceedsLimit {
        /// The configured limit.
        limit: usize,
        /// The size that would result from the rejected mutation.
        actual: usize,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, DocumentError>;
