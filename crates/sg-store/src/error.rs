use sg_types::{BranchId, CommitId, Digest, ErrorKind};

/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    /// A record with the same unique key already exists.
    #[error("{what} already exists: {key}")]
    AlreadyExists { what: &'static str, key: String },

    /// A branch head compare-and-swap lost a race with another writer.
    #[error("branch {branch} moved: expected head {expected:?}, found {actual:?}")]
    HeadMoved {
        branch: BranchId,
        expected: Option<CommitId>,
        actual: Option<CommitId>,
    },

    /// Stored payload no longer matches its digest.
    #[error("blob {digest} is corrupt: computed {computed}")]
    CorruptBlob { digest: Digest, computed: Digest },

    /// A staged write would break a structural invariant.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend temporarily unavailable (connection loss, poisoned lock).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(what: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            what,
            key: key.to_string(),
        }
    }

    pub fn already_exists(what: &'static str, key: impl ToString) -> Self {
        Self::AlreadyExists {
            what,
            key: key.to_string(),
        }
    }

    /// Caller-facing classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::HeadMoved { .. } => ErrorKind::Conflict,
            Self::CorruptBlob { .. } | Self::Integrity(_) => ErrorKind::MalformedInput,
            Self::Io(_) | Self::Unavailable(_) => ErrorKind::TransientIo,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
