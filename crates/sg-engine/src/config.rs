use serde::{Deserialize, Serialize};

/// How `merge_branches` treats a target branch with its own commits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The merge commit takes the source head's tree verbatim.
    #[default]
    Theirs,
    /// Like `Theirs`, but refuse when the target head is not an ancestor of
    /// the source head.
    RejectDivergent,
}

/// Version engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub merge_policy: MergePolicy,
    /// Branch used when callers do not name one.
    pub default_branch: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            merge_policy: MergePolicy::Theirs,
            default_branch: "main".to_string(),
        }
    }
}
