use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sg_types::{DeploymentId, EnvironmentId, SiteId, UserId, WorkspaceId};

use crate::error::{DeployError, DeployResult};

/// Lifecycle status of a deployment.
///
/// The only legal moves are `Pending -> Building` and
/// `Building -> Success | Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Building,
    Success,
    Failed,
}

impl DeploymentStatus {
    /// Returns `true` for `Success` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Building) | (Self::Building, Self::Success | Self::Failed)
        )
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One publish attempt of a site at a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub workspace_id: WorkspaceId,
    pub site_id: SiteId,
    pub environment_id: EnvironmentId,
    pub status: DeploymentStatus,
    /// The commit to build, as given by the caller. Parsed by the worker.
    pub commit_ref: String,
    /// Artifact location relative to the storage root, once building.
    pub storage_path: Option<String>,
    pub url: Option<String>,
    /// Newline-separated build log.
    pub logs: String,
    pub triggered_by: UserId,
    pub created_at: DateTime<Utc>,
    /// Set exactly when the status becomes terminal.
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether the build request event reached the stream.
    pub event_published: bool,
}

impl Deployment {
    pub fn new(
        workspace_id: WorkspaceId,
        site_id: SiteId,
        environment_id: EnvironmentId,
        commit_ref: impl Into<String>,
        triggered_by: UserId,
    ) -> Self {
        Self {
            id: DeploymentId::new(),
            workspace_id,
            site_id,
            environment_id,
            status: DeploymentStatus::Pending,
            commit_ref: commit_ref.into(),
            storage_path: None,
            url: None,
            logs: String::new(),
            triggered_by,
            created_at: Utc::now(),
            finished_at: None,
            event_published: false,
        }
    }

    /// Move to `next`, stamping `finished_at` if `next` is terminal.
    pub fn transition(&mut self, next: DeploymentStatus) -> DeployResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DeployError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Append one line to the build log.
    pub fn log_line(&mut self, line: impl AsRef<str>) {
        self.logs.push_str(line.as_ref());
        self.logs.push('\n');
    }
}
