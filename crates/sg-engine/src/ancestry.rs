//! Commit ancestry queries over `parent_id` / `merge_parent_id` links.

use std::collections::{HashSet, VecDeque};

use sg_store::{Commit, CommitStore};
use sg_types::CommitId;

use crate::error::{EngineError, Result};

/// Returns `true` if `ancestor` is reachable from `descendant` by following
/// parent links. A commit counts as its own ancestor.
pub fn is_ancestor<S>(store: &S, ancestor: CommitId, descendant: CommitId) -> Result<bool>
where
    S: CommitStore + ?Sized,
{
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([descendant]);
    visited.insert(descendant);

    while let Some(current) = queue.pop_front() {
        if current == ancestor {
            return Ok(true);
        }
        let commit = store
            .get_commit(&current)?
            .ok_or(EngineError::CommitNotFound(current))?;
        for parent in commit.parents() {
            if visited.insert(parent) {
                queue.push_back(parent);
            }
        }
    }
    Ok(false)
}

/// Up to `limit` commits starting at `head`, following first parents only.
pub fn first_parent_history<S>(store: &S, head: CommitId, limit: usize) -> Result<Vec<Commit>>
where
    S: CommitStore + ?Sized,
{
    let mut history = Vec::new();
    let mut next = Some(head);
    while let Some(id) = next {
        if history.len() >= limit {
            break;
        }
        let commit = store
            .get_commit(&id)?
            .ok_or(EngineError::CommitNotFound(id))?;
        next = commit.parent_id;
        history.push(commit);
    }
    Ok(history)
}
