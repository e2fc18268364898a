use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use sg_types::{BranchId, CommitId, Digest, SiteId};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::record::{Blob, Branch, Commit, TreeEntry};
use crate::traits::{BlobStore, BranchStore, CommitStore, Transactional};
use crate::transaction::Transaction;

/// In-memory, HashMap-based record store.
///
/// Intended for tests and embedding. Every record type lives behind a single
/// `RwLock`, which is what lets [`Transactional::apply`] validate and write a
/// whole transaction without any reader observing a partial state.
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

#[derive(Default)]
struct GraphState {
    blobs: HashMap<Digest, Blob>,
    commits: HashMap<CommitId, Commit>,
    tree_entries: HashMap<CommitId, Vec<TreeEntry>>,
    branches: HashMap<BranchId, Branch>,
    branch_index: HashMap<(SiteId, String), BranchId>,
}

impl InMemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, GraphState>> {
        self.state
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, GraphState>> {
        self.state
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    /// Number of distinct blobs stored.
    pub fn blob_count(&self) -> usize {
        self.read().map(|s| s.blobs.len()).unwrap_or(0)
    }

    /// Number of commits stored.
    pub fn commit_count(&self) -> usize {
        self.read().map(|s| s.commits.len()).unwrap_or(0)
    }

    /// Total payload bytes across all stored blobs.
    pub fn total_blob_bytes(&self) -> u64 {
        self.read()
            .map(|s| s.blobs.values().map(|b| b.size).sum())
            .unwrap_or(0)
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryGraphStore {
    fn insert_blob(&self, blob: &Blob) -> StoreResult<bool> {
        let mut state = self.write()?;
        if state.blobs.contains_key(&blob.digest) {
            return Ok(false);
        }
        state.blobs.insert(blob.digest, blob.clone());
        Ok(true)
    }

    fn get_blob(&self, digest: &Digest) -> StoreResult<Option<Blob>> {
        Ok(self.read()?.blobs.get(digest).cloned())
    }

    fn contains_blob(&self, digest: &Digest) -> StoreResult<bool> {
        Ok(self.read()?.blobs.contains_key(digest))
    }
}

impl CommitStore for InMemoryGraphStore {
    fn get_commit(&self, id: &CommitId) -> StoreResult<Option<Commit>> {
        Ok(self.read()?.commits.get(id).cloned())
    }

    fn tree_entries(&self, commit_id: &CommitId) -> StoreResult<Vec<TreeEntry>> {
        let state = self.read()?;
        let mut entries = state.tree_entries.get(commit_id).cloned().unwrap_or_default();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

impl BranchStore for InMemoryGraphStore {
    fn insert_branch(&self, branch: &Branch) -> StoreResult<()> {
        let mut state = self.write()?;
        let key = (branch.site_id, branch.name.clone());
        if state.branch_index.contains_key(&key) {
            return Err(StoreError::already_exists("branch", &branch.name));
        }
        if let Some(head) = branch.head_commit_id {
            if !state.commits.contains_key(&head) {
                return Err(StoreError::not_found("commit", head));
            }
        }
        state.branch_index.insert(key, branch.id);
        state.branches.insert(branch.id, branch.clone());
        Ok(())
    }

    fn get_branch(&self, site_id: &SiteId, name: &str) -> StoreResult<Option<Branch>> {
        let state = self.read()?;
        Ok(state
            .branch_index
            .get(&(*site_id, name.to_string()))
            .and_then(|id| state.branches.get(id))
            .cloned())
    }

    fn list_branches(&self, site_id: &SiteId) -> StoreResult<Vec<Branch>> {
        let state = self.read()?;
        let mut branches: Vec<Branch> = state
            .branches
            .values()
            .filter(|b| b.site_id == *site_id)
            .cloned()
            .collect();
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }
}

impl Transactional for InMemoryGraphStore {
    fn apply(&self, tx: Transaction) -> StoreResult<()> {
        let mut state = self.write()?;
        validate(&state, &tx)?;

        let (blobs, commits, entries, head_updates) = tx.into_parts();
        let (blob_count, commit_count, entry_count) = (blobs.len(), commits.len(), entries.len());

        for blob in blobs {
            state.blobs.entry(blob.digest).or_insert(blob);
        }
        for commit in commits {
            state.commits.insert(commit.id, commit);
        }
        for entry in entries {
            state.tree_entries.entry(entry.commit_id).or_default().push(entry);
        }
        // Heads move last; validation above already guaranteed success.
        for update in &head_updates {
            if let Some(branch) = state.branches.get_mut(&update.branch_id) {
                branch.head_commit_id = Some(update.new_head);
                branch.updated_at = update.updated_at;
            }
        }

        debug!(
            blobs = blob_count,
            commits = commit_count,
            entries = entry_count,
            heads = head_updates.len(),
            "transaction applied"
        );
        Ok(())
    }
}

/// Check every staged write against the current state before touching it.
fn validate(state: &GraphState, tx: &Transaction) -> StoreResult<()> {
    let staged: HashSet<CommitId> = tx.commits().iter().map(|c| c.id).collect();
    let exists = |id: &CommitId| state.commits.contains_key(id) || staged.contains(id);

    for blob in tx.blobs() {
        if !blob.verify() {
            return Err(StoreError::Integrity(format!(
                "staged blob {} does not match its payload",
                blob.digest
            )));
        }
    }

    for commit in tx.commits() {
        if state.commits.contains_key(&commit.id) {
            return Err(StoreError::already_exists("commit", commit.id));
        }
        for parent in commit.parents() {
            if !exists(&parent) {
                return Err(StoreError::not_found("commit", parent));
            }
        }
    }

    for entry in tx.tree_entries() {
        if !staged.contains(&entry.commit_id) {
            return Err(StoreError::Integrity(format!(
                "tree entry {} targets commit {} outside this transaction",
                entry.path, entry.commit_id
            )));
        }
        let known = state.blobs.contains_key(&entry.blob_digest)
            || tx.blobs().iter().any(|b| b.digest == entry.blob_digest);
        if !known {
            return Err(StoreError::not_found("blob", entry.blob_digest));
        }
    }

    for update in tx.head_updates() {
        let branch = state
            .branches
            .get(&update.branch_id)
            .ok_or_else(|| StoreError::not_found("branch", update.branch_id))?;
        if branch.head_commit_id != update.expected {
            return Err(StoreError::HeadMoved {
                branch: update.branch_id,
                expected: update.expected,
                actual: branch.head_commit_id,
            });
        }
        if !exists(&update.new_head) {
            return Err(StoreError::not_found("commit", update.new_head));
        }
    }

    Ok(())
}

impl std::fmt::Debug for InMemoryGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryGraphStore")
            .field("blob_count", &self.blob_count())
            .field("commit_count", &self.commit_count())
            .finish()
    }
}
