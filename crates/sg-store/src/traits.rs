use sg_types::{CommitId, Digest, SiteId};

use crate::error::StoreResult;
use crate::record::{Blob, Branch, Commit, TreeEntry};
use crate::transaction::Transaction;

/// Content-addressed payload storage.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait BlobStore: Send + Sync {
    /// Insert a blob unless one with the same digest already exists.
    ///
    /// Returns `true` if the blob was physically written, `false` if it was
    /// already present. Duplicate inserts are never an error.
    fn insert_blob(&self, blob: &Blob) -> StoreResult<bool>;

    /// Look up a blob by digest. Returns `Ok(None)` if absent.
    fn get_blob(&self, digest: &Digest) -> StoreResult<Option<Blob>>;

    /// Check whether a digest is stored.
    fn contains_blob(&self, digest: &Digest) -> StoreResult<bool> {
        Ok(self.get_blob(digest)?.is_some())
    }
}

/// Read access to commits and their flat snapshots.
///
/// Commits and tree entries are only ever written through a
/// [`Transaction`], never individually.
pub trait CommitStore: Send + Sync {
    /// Look up a commit by id. Returns `Ok(None)` if absent.
    fn get_commit(&self, id: &CommitId) -> StoreResult<Option<Commit>>;

    /// All tree entries owned by a commit, sorted by path.
    ///
    /// Returns an empty list for an unknown commit.
    fn tree_entries(&self, commit_id: &CommitId) -> StoreResult<Vec<TreeEntry>>;
}

/// Branch pointer storage.
pub trait BranchStore: Send + Sync {
    /// Insert a new branch.
    ///
    /// Fails with `AlreadyExists` if `(site_id, name)` is taken, which makes
    /// the uniqueness guarantee hold even when two callers race past an
    /// existence check.
    fn insert_branch(&self, branch: &Branch) -> StoreResult<()>;

    /// Look up a branch by site and name. Returns `Ok(None)` if absent.
    fn get_branch(&self, site_id: &SiteId, name: &str) -> StoreResult<Option<Branch>>;

    /// All branches of a site, sorted by name.
    fn list_branches(&self, site_id: &SiteId) -> StoreResult<Vec<Branch>>;
}

/// Scoped-transaction capability.
///
/// A [`Transaction`] collects staged writes; [`Transactional::apply`] makes
/// them visible all at once or not at all.
pub trait Transactional: Send + Sync {
    /// Atomically apply every write staged in `tx`.
    ///
    /// On error nothing from `tx` is visible.
    fn apply(&self, tx: Transaction) -> StoreResult<()>;

    /// Run `f` against a fresh transaction and apply it if `f` succeeds.
    ///
    /// If `f` returns an error the staged writes are discarded.
    fn with_transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        Self: Sized,
        F: FnOnce(&mut Transaction) -> StoreResult<T>,
    {
        let mut tx = Transaction::new();
        let value = f(&mut tx)?;
        self.apply(tx)?;
        Ok(value)
    }
}

/// Everything the version engine needs from storage.
pub trait GraphStore: BlobStore + CommitStore + BranchStore + Transactional {}

impl<T> GraphStore for T where T: BlobStore + CommitStore + BranchStore + Transactional {}
