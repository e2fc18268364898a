use std::io;
use std::path::PathBuf;

use sg_deploy::DeployError;
use sg_store::StoreError;
use sg_stream::StreamError;
use sg_types::{CommitId, ErrorKind, TypeError};

/// Errors raised while building a deployment.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The deployment's commit reference is not a commit id.
    #[error("invalid commit reference {commit_ref:?}: {source}")]
    InvalidCommitRef {
        commit_ref: String,
        #[source]
        source: TypeError,
    },

    /// The commit does not exist, or belongs to another site.
    #[error("commit not found: {0}")]
    CommitNotFound(CommitId),

    /// A stored tree entry has a path that cannot be materialized.
    #[error("invalid tree entry path {path:?}: {reason}")]
    InvalidEntryPath { path: String, reason: String },

    /// Writing an artifact failed.
    #[error("failed to write artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl WorkerError {
    /// Caller-facing classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCommitRef { .. } | Self::InvalidEntryPath { .. } => {
                ErrorKind::MalformedInput
            }
            Self::CommitNotFound(_) => ErrorKind::NotFound,
            Self::Artifact { .. } => ErrorKind::TransientIo,
            Self::Store(e) => e.kind(),
            Self::Deploy(e) => e.kind(),
            Self::Stream(e) => e.kind(),
        }
    }

    /// Returns `true` if the same message may succeed on redelivery.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Result alias for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let missing: WorkerError = StoreError::not_found("blob", "abc").into();
        assert!(!missing.is_retryable());

        let down: WorkerError = StoreError::Unavailable("db".into()).into();
        assert!(down.is_retryable());

        let disk = WorkerError::Artifact {
            path: PathBuf::from("a/b"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert!(disk.is_retryable());

        let bad_ref = WorkerError::InvalidCommitRef {
            commit_ref: "nope".into(),
            source: "nope".parse::<CommitId>().unwrap_err(),
        };
        assert_eq!(bad_ref.kind(), ErrorKind::MalformedInput);
        assert!(!bad_ref.is_retryable());
    }
}
