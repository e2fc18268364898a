//! Deployment lifecycle: record, publish, and drive through the status machine.

use std::sync::Arc;

use serde_json::json;
use sg_stream::{DeploymentRequested, EventPublisher};
use sg_types::{DeploymentId, EnvironmentId, SiteId, UserId, WorkspaceId};
use tracing::{debug, info, warn};

use crate::audit::{AuditRecord, AuditSink};
use crate::error::{DeployError, DeployResult};
use crate::record::{Deployment, DeploymentStatus};
use crate::store::DeploymentStore;

/// Front door for everything that changes a [`Deployment`].
///
/// Creation records the deployment first and publishes its build request
/// second. If publishing fails the record stays behind with
/// `event_published = false`; [`DeploymentService::relay_unpublished`]
/// picks those up later.
#[derive(Clone)]
pub struct DeploymentService {
    store: Arc<dyn DeploymentStore>,
    publisher: Arc<dyn EventPublisher>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl DeploymentService {
    pub fn new(store: Arc<dyn DeploymentStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            store,
            publisher,
            audit: None,
        }
    }

    /// Attach an audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn store(&self) -> &Arc<dyn DeploymentStore> {
        &self.store
    }

    /// Record a new `Pending` deployment and request its build.
    pub async fn create_deployment(
        &self,
        workspace_id: WorkspaceId,
        site_id: SiteId,
        environment_id: EnvironmentId,
        commit_ref: &str,
        triggered_by: UserId,
    ) -> DeployResult<Deployment> {
        let deployment =
            Deployment::new(workspace_id, site_id, environment_id, commit_ref, triggered_by);
        self.store.insert(&deployment)?;

        let deployment = self.publish(deployment).await?;
        info!(
            deployment_id = %deployment.id,
            site = %site_id,
            commit_ref,
            "deployment created"
        );

        self.audit(AuditRecord::new(
            workspace_id,
            triggered_by,
            "deployment.create",
            deployment.id,
            json!({
                "site_id": site_id,
                "environment_id": environment_id,
                "commit_ref": commit_ref,
            }),
        ))
        .await;
        Ok(deployment)
    }

    /// Look up a deployment.
    pub async fn get(&self, id: DeploymentId) -> DeployResult<Deployment> {
        self.store.get(&id)?.ok_or(DeployError::NotFound(id))
    }

    pub async fn list_by_site(&self, site_id: SiteId) -> DeployResult<Vec<Deployment>> {
        self.store.list_by_site(&site_id)
    }

    /// Move a deployment to `status`. Backwards moves fail with
    /// [`DeployError::InvalidTransition`].
    pub async fn update_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
    ) -> DeployResult<Deployment> {
        let updated = self
            .store
            .update(&id, &mut |d: &mut Deployment| d.transition(status))?;
        debug!(deployment_id = %id, status = %status, "deployment status updated");
        Ok(updated)
    }

    /// Mark a deployment as building.
    ///
    /// A deployment that is already `Building` (a redelivered request) is
    /// returned unchanged apart from a log line, so a resumed build emits no
    /// second transition.
    pub async fn start_build(&self, id: DeploymentId) -> DeployResult<Deployment> {
        self.store.update(&id, &mut |d: &mut Deployment| {
            if d.status == DeploymentStatus::Building {
                d.log_line("resuming build");
                return Ok(());
            }
            d.transition(DeploymentStatus::Building)
        })
    }

    /// Record where a deployment's artifacts are written and served from.
    pub async fn record_output(
        &self,
        id: DeploymentId,
        storage_path: &str,
        url: &str,
    ) -> DeployResult<Deployment> {
        self.store.update(&id, &mut |d: &mut Deployment| {
            d.storage_path = Some(storage_path.to_string());
            d.url = Some(url.to_string());
            Ok(())
        })
    }

    /// Append one line to a deployment's build log.
    pub async fn append_log(&self, id: DeploymentId, line: &str) -> DeployResult<()> {
        self.store
            .update(&id, &mut |d: &mut Deployment| {
                d.log_line(line);
                Ok(())
            })
            .map(|_| ())
    }

    /// Republish build requests for deployments whose publish failed.
    ///
    /// Returns how many were published. Deployments that already left
    /// `Pending` are marked published without a new event.
    pub async fn relay_unpublished(&self) -> DeployResult<usize> {
        let mut relayed = 0;
        for deployment in self.store.list_unpublished()? {
            if deployment.status != DeploymentStatus::Pending {
                self.mark_published(deployment.id)?;
                continue;
            }
            let id = deployment.id;
            self.publish(deployment).await?;
            relayed += 1;
            info!(deployment_id = %id, "relayed unpublished deployment");
        }
        Ok(relayed)
    }

    async fn publish(&self, deployment: Deployment) -> DeployResult<Deployment> {
        let event = DeploymentRequested::new(deployment.id);
        match self.publisher.publish(event.to_fields()).await {
            Ok(message_id) => {
                debug!(deployment_id = %deployment.id, message = %message_id, "build requested");
                self.mark_published(deployment.id)
            }
            Err(source) => {
                warn!(
                    deployment_id = %deployment.id,
                    error = %source,
                    "failed to publish build request"
                );
                Err(DeployError::Publish {
                    deployment_id: deployment.id,
                    source,
                })
            }
        }
    }

    fn mark_published(&self, id: DeploymentId) -> DeployResult<Deployment> {
        self.store.update(&id, &mut |d: &mut Deployment| {
            d.event_published = true;
            Ok(())
        })
    }

    async fn audit(&self, entry: AuditRecord) {
        let Some(sink) = &self.audit else {
            return;
        };
        let action = entry.action.clone();
        if let Err(e) = sink.record(entry).await {
            warn!(action = %action, error = %e, "audit write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use sg_stream::{Fields, InMemoryStream, MessageId, StreamConsumer, StreamError};

    use crate::audit::InMemoryAuditLog;
    use crate::store::InMemoryDeploymentStore;

    /// Publisher that fails while `down` is set.
    #[derive(Default)]
    struct FlakyPublisher {
        inner: InMemoryStream,
        down: AtomicBool,
    }

    #[async_trait]
    impl EventPublisher for FlakyPublisher {
        async fn publish(&self, fields: Fields) -> sg_stream::Result<MessageId> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StreamError::Unavailable("broker down".into()));
            }
            self.inner.publish(fields).await
        }
    }

    struct BrokenAudit;

    #[async_trait]
    impl AuditSink for BrokenAudit {
        async fn record(&self, _entry: AuditRecord) -> DeployResult<()> {
            Err(DeployError::Audit("disk full".into()))
        }
    }

    fn service() -> (DeploymentService, Arc<InMemoryStream>, Arc<InMemoryAuditLog>) {
        let stream = Arc::new(InMemoryStream::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let service = DeploymentService::new(
            Arc::new(InMemoryDeploymentStore::new()),
            Arc::clone(&stream) as Arc<dyn EventPublisher>,
        )
        .with_audit(Arc::clone(&audit) as Arc<dyn AuditSink>);
        (service, stream, audit)
    }

    async fn create(service: &DeploymentService) -> DeployResult<Deployment> {
        service
            .create_deployment(
                WorkspaceId::new(),
                SiteId::new(),
                EnvironmentId::new(),
                "some-commit",
                UserId::new(),
            )
            .await
    }

    #[tokio::test]
    async fn create_records_publishes_and_audits() {
        let (service, stream, audit) = service();
        let deployment = create(&service).await.unwrap();

        assert_eq!(deployment.status, DeploymentStatus::Pending);
        assert!(deployment.event_published);

        let message = stream.try_claim().await.unwrap().unwrap();
        let event = DeploymentRequested::from_fields(&message.fields).unwrap();
        assert_eq!(event.deployment_id, deployment.id);

        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "deployment.create");
        assert_eq!(entries[0].target, deployment.id.to_string());
    }

    #[tokio::test]
    async fn publish_failure_leaves_unpublished_record() {
        let publisher = Arc::new(FlakyPublisher::default());
        publisher.down.store(true, Ordering::SeqCst);
        let store = Arc::new(InMemoryDeploymentStore::new());
        let service = DeploymentService::new(
            Arc::clone(&store) as Arc<dyn DeploymentStore>,
            Arc::clone(&publisher) as Arc<dyn EventPublisher>,
        );

        let err = create(&service).await.unwrap_err();
        let deployment_id = match err {
            DeployError::Publish { deployment_id, .. } => deployment_id,
            other => panic!("expected publish error, got {other:?}"),
        };
        let stored = service.get(deployment_id).await.unwrap();
        assert_eq!(stored.status, DeploymentStatus::Pending);
        assert!(!stored.event_published);
        assert_eq!(publisher.inner.pending_len(), 0);

        // Broker comes back: the relay publishes exactly once.
        publisher.down.store(false, Ordering::SeqCst);
        assert_eq!(service.relay_unpublished().await.unwrap(), 1);
        assert_eq!(service.relay_unpublished().await.unwrap(), 0);
        assert_eq!(publisher.inner.pending_len(), 1);
        assert!(service.get(deployment_id).await.unwrap().event_published);
    }

    #[tokio::test]
    async fn audit_failure_does_not_fail_creation() {
        let service = DeploymentService::new(
            Arc::new(InMemoryDeploymentStore::new()),
            Arc::new(InMemoryStream::new()),
        )
        .with_audit(Arc::new(BrokenAudit));
        assert!(create(&service).await.is_ok());
    }

    #[tokio::test]
    async fn status_moves_forward_only() {
        let (service, _, _) = service();
        let d = create(&service).await.unwrap();

        let building = service.update_status(d.id, DeploymentStatus::Building).await.unwrap();
        assert!(building.finished_at.is_none());
        let done = service.update_status(d.id, DeploymentStatus::Success).await.unwrap();
        assert!(done.finished_at.is_some());

        let err = service
            .update_status(d.id, DeploymentStatus::Building)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), sg_types::ErrorKind::InvalidTransition);
        assert_eq!(
            service.get(d.id).await.unwrap().status,
            DeploymentStatus::Success
        );
    }

    #[tokio::test]
    async fn start_build_resumes_without_second_transition() {
        let (service, _, _) = service();
        let d = create(&service).await.unwrap();

        let first = service.start_build(d.id).await.unwrap();
        assert_eq!(first.status, DeploymentStatus::Building);

        let resumed = service.start_build(d.id).await.unwrap();
        assert_eq!(resumed.status, DeploymentStatus::Building);
        assert!(resumed.logs.contains("resuming build"));

        service.update_status(d.id, DeploymentStatus::Failed).await.unwrap();
        let err = service.start_build(d.id).await.unwrap_err();
        assert!(matches!(err, DeployError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn record_output_sets_location() {
        let (service, _, _) = service();
        let d = create(&service).await.unwrap();
        let updated = service
            .record_output(d.id, "ws/site/c", "https://x/ws/site/c/")
            .await
            .unwrap();
        assert_eq!(updated.storage_path.as_deref(), Some("ws/site/c"));
        assert_eq!(updated.url.as_deref(), Some("https://x/ws/site/c/"));
        assert_eq!(updated.status, DeploymentStatus::Pending);
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let (service, _, _) = service();
        let err = service.get(DeploymentId::new()).await.unwrap_err();
        assert_eq!(err.kind(), sg_types::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn append_log_accumulates() {
        let (service, _, _) = service();
        let d = create(&service).await.unwrap();
        service.append_log(d.id, "one").await.unwrap();
        service.append_log(d.id, "two").await.unwrap();
        assert_eq!(service.get(d.id).await.unwrap().logs, "one\ntwo\n");
    }
}
