use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sg_types::{UserId, WorkspaceId};
use tracing::info;

use crate::error::{DeployError, DeployResult};

/// One entry of the audit trail.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub workspace_id: WorkspaceId,
    pub actor: UserId,
    /// Dotted action name, e.g. `deployment.create`.
    pub action: String,
    /// Id of the record acted on.
    pub target: String,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        workspace_id: WorkspaceId,
        actor: UserId,
        action: impl Into<String>,
        target: impl ToString,
        details: serde_json::Value,
    ) -> Self {
        Self {
            workspace_id,
            actor,
            action: action.into(),
            target: target.to_string(),
            details,
            at: Utc::now(),
        }
    }
}

/// Destination for audit records.
///
/// Writes are best-effort: callers log a failed write and carry on.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditRecord) -> DeployResult<()>;
}

/// Audit sink that keeps records in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditRecord> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, entry: AuditRecord) -> DeployResult<()> {
        self.entries
            .lock()
            .map_err(|e| DeployError::Audit(e.to_string()))?
            .push(entry);
        Ok(())
    }
}

/// Audit sink that emits each record as an `info!` event on the
/// `sitegraph::audit` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditRecord) -> DeployResult<()> {
        info!(
            target: "sitegraph::audit",
            workspace = %entry.workspace_id,
            actor = %entry.actor,
            action = %entry.action,
            subject = %entry.target,
            details = %entry.details,
            at = %entry.at,
            "audit"
        );
        Ok(())
    }
}
