use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sg_crypto::ContentHasher;
use sg_types::{BranchId, CommitId, Digest, SiteId, TreeEntryId, UserId};

/// File mode recorded for every regular file entry.
pub const REGULAR_FILE_MODE: &str = "100644";

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Content-addressed immutable payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    /// Domain-separated BLAKE3 digest of `payload`.
    pub digest: Digest,
    pub payload: Vec<u8>,
    /// Length of `payload` in bytes.
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl Blob {
    /// Create a blob from raw bytes, computing its digest.
    pub fn new(payload: Vec<u8>) -> Self {
        let digest = Self::digest_of(&payload);
        let size = payload.len() as u64;
        Self {
            digest,
            payload,
            size,
            created_at: Utc::now(),
        }
    }

    /// The digest a payload would be stored under.
    pub fn digest_of(payload: &[u8]) -> Digest {
        ContentHasher::BLOB.hash(payload)
    }

    /// Returns `true` if the payload still hashes to `digest`.
    pub fn verify(&self) -> bool {
        ContentHasher::BLOB.verify(&self.payload, &self.digest)
    }
}

// ---------------------------------------------------------------------------
// TreeEntry
// ---------------------------------------------------------------------------

/// What a tree entry refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Tree => write!(f, "tree"),
        }
    }
}

/// One row of a commit's flat snapshot.
///
/// Every file visible in a commit has its own entry; entries are never shared
/// between commits even when the file is unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub id: TreeEntryId,
    /// The commit that owns this entry.
    pub commit_id: CommitId,
    /// Site-relative, `/`-separated path.
    pub path: String,
    pub blob_digest: Digest,
    pub kind: EntryKind,
    pub mode: String,
}

impl TreeEntry {
    /// A regular-file entry owned by `commit_id`.
    pub fn file(commit_id: CommitId, path: impl Into<String>, blob_digest: Digest) -> Self {
        Self {
            id: TreeEntryId::new(),
            commit_id,
            path: path.into(),
            blob_digest,
            kind: EntryKind::Blob,
            mode: REGULAR_FILE_MODE.to_string(),
        }
    }

    /// Copy this entry into another commit's snapshot under a fresh id.
    pub fn copy_to(&self, commit_id: CommitId) -> Self {
        Self {
            id: TreeEntryId::new(),
            commit_id,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Immutable snapshot node in a site's version graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub site_id: SiteId,
    /// Digest over the sorted `(path, blob digest)` pairs of the snapshot.
    pub tree_digest: Digest,
    /// First parent. `None` marks a root commit.
    pub parent_id: Option<CommitId>,
    /// Second parent. `Some` marks a merge commit.
    pub merge_parent_id: Option<CommitId>,
    pub message: String,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Commit {
    /// Returns `true` if this commit has no parents.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() && self.merge_parent_id.is_none()
    }

    /// Returns `true` if this commit has two parents.
    pub fn is_merge(&self) -> bool {
        self.merge_parent_id.is_some()
    }

    /// First parent, then merge parent, skipping absent ones.
    pub fn parents(&self) -> impl Iterator<Item = CommitId> + '_ {
        self.parent_id.into_iter().chain(self.merge_parent_id)
    }
}

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

/// Mutable named pointer to a commit, unique per `(site_id, name)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub site_id: SiteId,
    pub name: String,
    /// `None` while the branch is unborn.
    pub head_commit_id: Option<CommitId>,
    pub is_protected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Branch {
    /// A new unprotected branch pointing at `head`.
    pub fn new(site_id: SiteId, name: impl Into<String>, head: Option<CommitId>) -> Self {
        let now = Utc::now();
        Self {
            id: BranchId::new(),
            site_id,
            name: name.into(),
            head_commit_id: head,
            is_protected: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the branch has no commits yet.
    pub fn is_unborn(&self) -> bool {
        self.head_commit_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(parent: Option<CommitId>, merge_parent: Option<CommitId>) -> Commit {
        Commit {
            id: CommitId::new(),
            site_id: SiteId::new(),
            tree_digest: Digest::of(b"tree"),
            parent_id: parent,
            merge_parent_id: merge_parent,
            message: "msg".into(),
            author_id: UserId::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn blob_digest_and_size() {
        let blob = Blob::new(b"<html>Hello</html>".to_vec());
        assert_eq!(blob.size, 18);
        assert_eq!(blob.digest, Blob::digest_of(b"<html>Hello</html>"));
        assert!(blob.verify());
    }

    #[test]
    fn tampered_blob_fails_verification() {
        let mut blob = Blob::new(b"original".to_vec());
        blob.payload = b"tampered".to_vec();
        assert!(!blob.verify());
    }

    #[test]
    fn file_entry_defaults() {
        let entry = TreeEntry::file(CommitId::new(), "index.html", Digest::of(b"x"));
        assert_eq!(entry.kind, EntryKind::Blob);
        assert_eq!(entry.mode, "100644");
    }

    #[test]
    fn copied_entry_gets_new_identity() {
        let entry = TreeEntry::file(CommitId::new(), "a.md", Digest::of(b"x"));
        let target = CommitId::new();
        let copy = entry.copy_to(target);
        assert_ne!(copy.id, entry.id);
        assert_eq!(copy.commit_id, target);
        assert_eq!(copy.path, entry.path);
        assert_eq!(copy.blob_digest, entry.blob_digest);
    }

    #[test]
    fn entry_kind_display() {
        assert_eq!(EntryKind::Blob.to_string(), "blob");
        assert_eq!(EntryKind::Tree.to_string(), "tree");
    }

    #[test]
    fn commit_shapes() {
        let root = commit(None, None);
        assert!(root.is_root());
        assert!(!root.is_merge());
        assert_eq!(root.parents().count(), 0);

        let p = CommitId::new();
        let m = CommitId::new();
        let merge = commit(Some(p), Some(m));
        assert!(merge.is_merge());
        assert_eq!(merge.parents().collect::<Vec<_>>(), vec![p, m]);
    }

    #[test]
    fn new_branch_is_unborn_without_head() {
        let branch = Branch::new(SiteId::new(), "main", None);
        assert!(branch.is_unborn());
        assert!(!branch.is_protected);
        assert_eq!(branch.created_at, branch.updated_at);
    }
}
