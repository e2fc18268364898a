use std::fmt;

use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid identifier {input:?}: {reason}")]
    InvalidId { input: String, reason: String },
}

/// Caller-facing classification of a failure.
///
/// Every crate-level error type exposes a `kind()` that maps onto one of
/// these, so callers can decide between surfacing, retrying, and dropping
/// without matching on every variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A branch, commit, blob, or deployment does not exist.
    NotFound,
    /// A record with the same unique key already exists.
    AlreadyExists,
    /// A merge was requested from a branch with no commits.
    EmptySource,
    /// An identifier, name, or path could not be parsed or is not allowed.
    MalformedInput,
    /// Store, stream, or filesystem connectivity failure. Safe to retry.
    TransientIo,
    /// A concurrent writer moved a branch head, or a merge would discard history.
    Conflict,
    /// A deployment status change would move backwards.
    InvalidTransition,
}

impl ErrorKind {
    /// Returns `true` if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::EmptySource => "empty_source",
            Self::MalformedInput => "malformed_input",
            Self::TransientIo => "transient_io",
            Self::Conflict => "conflict",
            Self::InvalidTransition => "invalid_transition",
        };
        write!(f, "{s}")
    }
}

impl From<TypeError> for ErrorKind {
    fn from(_: TypeError) -> Self {
        Self::MalformedInput
    }
}
