//! Error types for version engine operations.

use sg_store::StoreError;
use sg_types::{CommitId, ErrorKind};
use thiserror::Error;

/// Errors that can occur while creating branches, commits, and merges.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No branch with this name exists on the site.
    #[error("branch not found: {name}")]
    BranchNotFound { name: String },

    /// The commit does not exist, or belongs to another site.
    #[error("commit not found: {0}")]
    CommitNotFound(CommitId),

    /// A branch with this name already exists on the site.
    #[error("branch already exists: {name}")]
    BranchExists { name: String },

    /// The merge source has no commits.
    #[error("cannot merge from unborn branch: {name}")]
    EmptySource { name: String },

    /// The branch name is invalid.
    #[error("invalid branch name: {name}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// A file path in a snapshot is invalid.
    #[error("invalid tree path: {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// The target branch has commits the merge would discard.
    #[error("branch {target} has diverged from {source_branch}")]
    Divergent { source_branch: String, target: String },

    /// Error from the record store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Caller-facing classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BranchNotFound { .. } | Self::CommitNotFound(_) => ErrorKind::NotFound,
            Self::BranchExists { .. } => ErrorKind::AlreadyExists,
            Self::EmptySource { .. } => ErrorKind::EmptySource,
            Self::InvalidBranchName { .. } | Self::InvalidPath { .. } => ErrorKind::MalformedInput,
            Self::Divergent { .. } => ErrorKind::Conflict,
            Self::Store(e) => e.kind(),
        }
    }
}

/// Convenience type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_kind() {
        let err: EngineError = StoreError::already_exists("branch", "main").into();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err: EngineError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::TransientIo);
    }

    #[test]
    fn engine_kinds() {
        let empty = EngineError::EmptySource { name: "feature".into() };
        assert_eq!(empty.kind(), ErrorKind::EmptySource);
        assert!(empty.to_string().contains("feature"));

        let divergent = EngineError::Divergent {
            source_branch: "feature".into(),
            target: "main".into(),
        };
        assert_eq!(divergent.kind(), ErrorKind::Conflict);
    }
}
