use sg_stream::StreamError;
use sg_types::{DeploymentId, ErrorKind};

use crate::record::DeploymentStatus;

/// Errors from deployment lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("deployment not found: {0}")]
    NotFound(DeploymentId),

    #[error("deployment already exists: {0}")]
    AlreadyExists(DeploymentId),

    /// The requested status change would move the deployment backwards.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    /// The deployment was recorded but its build request was not published.
    #[error("deployment {deployment_id} recorded but not published: {source}")]
    Publish {
        deployment_id: DeploymentId,
        #[source]
        source: StreamError,
    },

    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Writing an audit record failed.
    #[error("audit write failed: {0}")]
    Audit(String),

    /// The deployment store cannot serve requests right now.
    #[error("deployment store unavailable: {0}")]
    Unavailable(String),
}

impl DeployError {
    /// Caller-facing classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Publish { source, .. } => source.kind(),
            Self::Stream(e) => e.kind(),
            Self::Audit(_) | Self::Unavailable(_) => ErrorKind::TransientIo,
        }
    }
}

/// Result alias for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;
