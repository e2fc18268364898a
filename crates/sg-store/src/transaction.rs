//! Staged writes applied all-or-nothing by a [`Transactional`] store.
//!
//! [`Transactional`]: crate::traits::Transactional

use chrono::{DateTime, Utc};
use sg_types::{BranchId, CommitId, Digest};

use crate::record::{Blob, Branch, Commit, TreeEntry};

/// A compare-and-swap move of a branch head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadUpdate {
    pub branch_id: BranchId,
    /// Head the caller observed; the move fails if the stored head differs.
    pub expected: Option<CommitId>,
    pub new_head: CommitId,
    pub updated_at: DateTime<Utc>,
}

/// Buffer of writes that become visible together.
#[derive(Debug, Default)]
pub struct Transaction {
    blobs: Vec<Blob>,
    commits: Vec<Commit>,
    tree_entries: Vec<TreeEntry>,
    head_updates: Vec<HeadUpdate>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a payload as a blob and return its digest.
    ///
    /// Staging the same payload twice stores it once.
    pub fn stage_blob(&mut self, payload: &[u8]) -> Digest {
        let digest = Blob::digest_of(payload);
        if !self.blobs.iter().any(|b| b.digest == digest) {
            self.blobs.push(Blob::new(payload.to_vec()));
        }
        digest
    }

    pub fn stage_commit(&mut self, commit: Commit) {
        self.commits.push(commit);
    }

    pub fn stage_tree_entries(&mut self, entries: impl IntoIterator<Item = TreeEntry>) {
        self.tree_entries.extend(entries);
    }

    /// Stage a move of `branch` from its observed head to `new_head`.
    pub fn stage_head_update(&mut self, branch: &Branch, new_head: CommitId) {
        self.head_updates.push(HeadUpdate {
            branch_id: branch.id,
            expected: branch.head_commit_id,
            new_head,
            updated_at: Utc::now(),
        });
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    pub fn tree_entries(&self) -> &[TreeEntry] {
        &self.tree_entries
    }

    pub fn head_updates(&self) -> &[HeadUpdate] {
        &self.head_updates
    }

    /// Returns `true` if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
            && self.commits.is_empty()
            && self.tree_entries.is_empty()
            && self.head_updates.is_empty()
    }

    /// Consume the transaction, yielding its staged writes.
    pub fn into_parts(self) -> (Vec<Blob>, Vec<Commit>, Vec<TreeEntry>, Vec<HeadUpdate>) {
        (self.blobs, self.commits, self.tree_entries, self.head_updates)
    }
}
