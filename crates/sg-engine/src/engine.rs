//! The version engine: branches, full-snapshot commits, and merges.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sg_crypto::tree_digest;
use sg_store::{Branch, Commit, ContentStore, GraphStore, StoreError, TreeEntry};
use sg_types::{CommitId, SiteId, UserId};
use tracing::{debug, info};

use crate::ancestry;
use crate::config::{EngineConfig, MergePolicy};
use crate::error::{EngineError, Result};
use crate::names::{validate_branch_name, validate_tree_layout, validate_tree_path};

/// Orchestrates every mutation of a site's version graph.
///
/// Commit and merge stage all of their writes into one store transaction, so
/// the branch head only moves once the commit and its tree entries are in
/// place. The head move itself is a compare-and-swap against the head read at
/// the start of the operation; losing that race surfaces as
/// [`ErrorKind::Conflict`](sg_types::ErrorKind::Conflict).
pub struct VersionEngine<S> {
    store: Arc<S>,
    content: ContentStore<S>,
    config: EngineConfig,
}

impl<S: GraphStore> VersionEngine<S> {
    /// Create an engine with the default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            content: ContentStore::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create branch `name` on `site_id`, pointing at `from` (unborn if `None`).
    pub fn create_branch(
        &self,
        site_id: SiteId,
        name: &str,
        from: Option<CommitId>,
    ) -> Result<Branch> {
        validate_branch_name(name)?;

        if self.store.get_branch(&site_id, name)?.is_some() {
            return Err(EngineError::BranchExists {
                name: name.to_string(),
            });
        }
        if let Some(commit_id) = from {
            self.site_commit(site_id, commit_id)?;
        }

        let branch = Branch::new(site_id, name, from);
        self.store.insert_branch(&branch).map_err(|e| match e {
            StoreError::AlreadyExists { .. } => EngineError::BranchExists {
                name: name.to_string(),
            },
            other => other.into(),
        })?;

        info!(site = %site_id, branch = name, head = ?from, "branch created");
        Ok(branch)
    }

    /// Look up a branch by name.
    pub fn get_branch(&self, site_id: SiteId, name: &str) -> Result<Branch> {
        self.store
            .get_branch(&site_id, name)?
            .ok_or_else(|| EngineError::BranchNotFound {
                name: name.to_string(),
            })
    }

    /// All branches of a site, sorted by name.
    pub fn list_branches(&self, site_id: SiteId) -> Result<Vec<Branch>> {
        Ok(self.store.list_branches(&site_id)?)
    }

    pub fn get_commit(&self, commit_id: CommitId) -> Result<Commit> {
        self.store
            .get_commit(&commit_id)?
            .ok_or(EngineError::CommitNotFound(commit_id))
    }

    /// Commit `files` as the complete snapshot of `branch_name`.
    ///
    /// `files` replaces the tree wholesale; nothing is inherited from the
    /// parent commit. The new commit's parent is the branch head observed at
    /// the start of the call.
    pub fn commit_changes(
        &self,
        site_id: SiteId,
        branch_name: &str,
        message: &str,
        author_id: UserId,
        files: &BTreeMap<String, Vec<u8>>,
    ) -> Result<Commit> {
        let branch = self.get_branch(site_id, branch_name)?;
        for path in files.keys() {
            validate_tree_path(path)?;
        }
        validate_tree_layout(files.keys().map(String::as_str))?;

        let commit_id = CommitId::new();
        let commit = self.store.with_transaction(|tx| {
            let entries: Vec<TreeEntry> = files
                .iter()
                .map(|(path, bytes)| TreeEntry::file(commit_id, path.as_str(), tx.stage_blob(bytes)))
                .collect();
            let commit = Commit {
                id: commit_id,
                site_id,
                tree_digest: tree_digest(entries.iter().map(|e| (e.path.as_str(), &e.blob_digest))),
                parent_id: branch.head_commit_id,
                merge_parent_id: None,
                message: message.to_string(),
                author_id,
                created_at: Utc::now(),
            };
            tx.stage_tree_entries(entries);
            tx.stage_head_update(&branch, commit_id);
            tx.stage_commit(commit.clone());
            Ok(commit)
        })?;

        info!(
            site = %site_id,
            branch = branch_name,
            commit = %commit.id,
            tree = %commit.tree_digest.short_hex(),
            files = files.len(),
            "commit created"
        );
        Ok(commit)
    }

    /// Merge `source` into `target`, producing a two-parent commit on `target`.
    ///
    /// The merge commit takes the source head's tree as-is. Under
    /// [`MergePolicy::RejectDivergent`] the merge is refused when the target
    /// head is not an ancestor of the source head.
    pub fn merge_branches(
        &self,
        site_id: SiteId,
        source: &str,
        target: &str,
        author_id: UserId,
    ) -> Result<Commit> {
        let source_branch = self.get_branch(site_id, source)?;
        let target_branch = self.get_branch(site_id, target)?;

        let source_head_id = source_branch
            .head_commit_id
            .ok_or_else(|| EngineError::EmptySource {
                name: source.to_string(),
            })?;
        let source_head = self.get_commit(source_head_id)?;

        if self.config.merge_policy == MergePolicy::RejectDivergent {
            if let Some(target_head) = target_branch.head_commit_id {
                if !ancestry::is_ancestor(self.store.as_ref(), target_head, source_head_id)? {
                    return Err(EngineError::Divergent {
                        source_branch: source.to_string(),
                        target: target.to_string(),
                    });
                }
            }
        }

        let source_entries = self.store.tree_entries(&source_head_id)?;
        let merge_id = CommitId::new();
        let commit = self.store.with_transaction(|tx| {
            let commit = Commit {
                id: merge_id,
                site_id,
                tree_digest: source_head.tree_digest,
                parent_id: target_branch.head_commit_id,
                merge_parent_id: Some(source_head_id),
                message: format!("Merge branch '{source}' into '{target}'"),
                author_id,
                created_at: Utc::now(),
            };
            tx.stage_tree_entries(source_entries.iter().map(|e| e.copy_to(merge_id)));
            tx.stage_head_update(&target_branch, merge_id);
            tx.stage_commit(commit.clone());
            Ok(commit)
        })?;

        info!(
            site = %site_id,
            source,
            target,
            commit = %commit.id,
            "branches merged"
        );
        Ok(commit)
    }

    /// Up to `limit` commits of `branch_name`, newest first, following first
    /// parents.
    pub fn log(&self, site_id: SiteId, branch_name: &str, limit: usize) -> Result<Vec<Commit>> {
        let branch = self.get_branch(site_id, branch_name)?;
        match branch.head_commit_id {
            Some(head) => ancestry::first_parent_history(self.store.as_ref(), head, limit),
            None => Ok(Vec::new()),
        }
    }

    /// Every `(path, bytes)` pair of a commit's snapshot, sorted by path.
    pub fn read_tree(&self, commit_id: CommitId) -> Result<Vec<(String, Vec<u8>)>> {
        self.get_commit(commit_id)?;
        let entries = self.store.tree_entries(&commit_id)?;
        debug!(commit = %commit_id, entries = entries.len(), "reading tree");
        entries
            .into_iter()
            .map(|entry| {
                let bytes = self.content.get(&entry.blob_digest)?;
                Ok((entry.path, bytes))
            })
            .collect()
    }

    fn site_commit(&self, site_id: SiteId, commit_id: CommitId) -> Result<Commit> {
        match self.store.get_commit(&commit_id)? {
            Some(commit) if commit.site_id == site_id => Ok(commit),
            _ => Err(EngineError::CommitNotFound(commit_id)),
        }
    }
}

impl<S> Clone for VersionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            content: self.content.clone(),
            config: self.config.clone(),
        }
    }
}
