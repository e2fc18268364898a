//! The build worker: turns deployment requests into published files.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sg_deploy::{Deployment, DeploymentService, DeploymentStatus};
use sg_engine::{validate_tree_layout, validate_tree_path, EngineError};
use sg_store::{BlobStore, CommitStore, ContentStore, EntryKind, TreeEntry};
use sg_stream::{DeploymentRequested, StreamConsumer, StreamMessage};
use sg_types::{CommitId, DeploymentId, ErrorKind};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::artifact::ArtifactStore;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::render::{output_path, render};

/// What happened to one delivered message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every file was written and the deployment succeeded.
    Built {
        deployment_id: DeploymentId,
        files: usize,
    },
    /// The deployment failed for a reason redelivery cannot fix.
    Failed {
        deployment_id: DeploymentId,
        reason: String,
    },
    /// A retryable failure; the message goes back for redelivery.
    Retry {
        deployment_id: Option<DeploymentId>,
        reason: String,
    },
    /// A retryable failure on the last allowed delivery.
    DeadLettered {
        deployment_id: Option<DeploymentId>,
        reason: String,
    },
    /// The deployment already finished; this was a duplicate delivery.
    AlreadyFinished { deployment_id: DeploymentId },
    /// The payload was unusable and the message was discarded.
    Dropped { reason: String },
}

impl Outcome {
    /// Whether the message is acknowledged after this outcome.
    pub fn acknowledges(&self) -> bool {
        !matches!(self, Self::Retry { .. })
    }
}

/// Running totals over a worker's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub built: usize,
    pub failed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub duplicates: usize,
    pub dropped: usize,
}

impl WorkerStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Built { .. } => self.built += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Retry { .. } => self.retried += 1,
            Outcome::DeadLettered { .. } => self.dead_lettered += 1,
            Outcome::AlreadyFinished { .. } => self.duplicates += 1,
            Outcome::Dropped { .. } => self.dropped += 1,
        }
    }

    /// Messages handled, counting each delivery once.
    pub fn processed(&self) -> usize {
        self.built + self.failed + self.retried + self.dead_lettered + self.duplicates + self.dropped
    }
}

/// Single consumer of the deployment request stream.
///
/// Messages are processed one at a time. For each, the worker loads the
/// deployment, marks it `Building`, resolves the commit's flat tree, writes
/// every blob under `<workspace>/<site>/<commit>/`, and marks it `Success`.
/// Permanent failures mark the deployment `Failed` and acknowledge; retryable
/// ones release the message until `max_deliveries` is reached.
pub struct BuildWorker<S> {
    graph: Arc<S>,
    content: ContentStore<S>,
    deployments: DeploymentService,
    consumer: Arc<dyn StreamConsumer>,
    artifacts: Arc<dyn ArtifactStore>,
    config: WorkerConfig,
}

impl<S: BlobStore + CommitStore> BuildWorker<S> {
    pub fn new(
        graph: Arc<S>,
        deployments: DeploymentService,
        consumer: Arc<dyn StreamConsumer>,
        artifacts: Arc<dyn ArtifactStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            content: ContentStore::new(Arc::clone(&graph)),
            graph,
            deployments,
            consumer,
            artifacts,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Consume messages until `shutdown` flips to `true` or its sender drops.
    ///
    /// Shutdown is only observed between messages; a message being processed
    /// always runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let mut backoff = self.config.read_backoff_initial();
        info!(max_deliveries = self.config.max_deliveries, "build worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            let claimed = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                claimed = self.consumer.claim_next() => claimed,
            };

            let delay = match claimed {
                Ok(message) => {
                    backoff = self.config.read_backoff_initial();
                    match self.handle(message).await {
                        Ok(outcome) => {
                            stats.record(&outcome);
                            self.retry_delay(&outcome)
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to settle message");
                            Some(self.config.read_backoff_initial())
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "stream read failed");
                    let delay = backoff;
                    backoff = (backoff * 2).min(self.config.read_backoff_max());
                    Some(delay)
                }
            };

            if let Some(delay) = delay {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        info!(processed = stats.processed(), "build worker stopped");
        stats
    }

    /// Process messages until none is claimable.
    pub async fn run_until_idle(&self) -> WorkerResult<WorkerStats> {
        let mut stats = WorkerStats::default();
        while let Some(message) = self.consumer.try_claim().await? {
            let outcome = self.handle(message).await?;
            stats.record(&outcome);
            if let Some(delay) = self.retry_delay(&outcome) {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(stats)
    }

    /// Process one claimed message, then acknowledge or release it.
    pub async fn handle(&self, message: StreamMessage) -> WorkerResult<Outcome> {
        let outcome = self.process(&message).await;
        if outcome.acknowledges() {
            self.consumer.ack(message.id).await?;
        } else {
            self.consumer.release(message.id).await?;
        }
        debug!(message = %message.id, outcome = ?outcome, "message settled");
        Ok(outcome)
    }

    fn retry_delay(&self, outcome: &Outcome) -> Option<Duration> {
        matches!(outcome, Outcome::Retry { .. }).then(|| self.config.read_backoff_initial())
    }

    async fn process(&self, message: &StreamMessage) -> Outcome {
        let request = match DeploymentRequested::from_fields(&message.fields) {
            Ok(request) => request,
            Err(e) => {
                warn!(message = %message.id, error = %e, "dropping malformed build request");
                return Outcome::Dropped {
                    reason: e.to_string(),
                };
            }
        };
        let id = request.deployment_id;

        let deployment = match self.deployments.get(id).await {
            Ok(deployment) => deployment,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(deployment_id = %id, "dropping build request for unknown deployment");
                return Outcome::Dropped {
                    reason: e.to_string(),
                };
            }
            Err(e) => return self.retry_or_give_up(message, None, e.into()).await,
        };

        if deployment.status.is_terminal() {
            info!(
                deployment_id = %id,
                status = %deployment.status,
                "deployment already finished; acknowledging duplicate"
            );
            return Outcome::AlreadyFinished { deployment_id: id };
        }

        match self.build(&deployment).await {
            Ok(files) => {
                info!(deployment_id = %id, files, "deployment built");
                Outcome::Built {
                    deployment_id: id,
                    files,
                }
            }
            Err(e) if e.is_retryable() => self.retry_or_give_up(message, Some(id), e).await,
            Err(e) => self.fail(id, e).await,
        }
    }

    async fn build(&self, deployment: &Deployment) -> WorkerResult<usize> {
        let id = deployment.id;
        self.deployments.start_build(id).await?;

        let commit_id: CommitId =
            deployment
                .commit_ref
                .parse()
                .map_err(|source| WorkerError::InvalidCommitRef {
                    commit_ref: deployment.commit_ref.clone(),
                    source,
                })?;
        let commit = self
            .graph
            .get_commit(&commit_id)?
            .filter(|c| c.site_id == deployment.site_id)
            .ok_or(WorkerError::CommitNotFound(commit_id))?;

        let storage_path = format!(
            "{}/{}/{}",
            deployment.workspace_id, deployment.site_id, commit.id
        );
        let url = self.config.public_url(&storage_path);
        self.deployments.record_output(id, &storage_path, &url).await?;

        let entries = self.graph.tree_entries(&commit.id)?;
        let (planned, skipped) = plan_outputs(&entries)?;
        for entry in skipped {
            let note = format!(
                "skipped {}: {} is published from another file",
                entry.path,
                output_path(&entry.path)
            );
            warn!(deployment_id = %id, path = %entry.path, "rendered output clashes; skipping");
            self.deployments.append_log(id, &note).await?;
        }

        let mut written = 0;
        for entry in planned {
            let payload = self.content.get(&entry.blob_digest)?;
            let file = render(&entry.path, &payload);
            let target = Path::new(&storage_path).join(&*file.path);
            self.artifacts
                .write(&target, &file.contents)
                .await
                .map_err(|source| WorkerError::Artifact {
                    path: target.clone(),
                    source,
                })?;
            debug!(deployment_id = %id, path = %target.display(), "file written");
            written += 1;
        }

        self.deployments
            .append_log(id, &format!("wrote {written} files to {storage_path}"))
            .await?;
        self.deployments
            .update_status(id, DeploymentStatus::Success)
            .await?;
        Ok(written)
    }

    async fn fail(&self, id: DeploymentId, error: WorkerError) -> Outcome {
        error!(deployment_id = %id, error = %error, "build failed");
        let reason = error.to_string();
        match self.mark_failed(id, &reason).await {
            Ok(()) => Outcome::Failed {
                deployment_id: id,
                reason,
            },
            Err(e) if e.is_retryable() => {
                warn!(deployment_id = %id, error = %e, "could not record failure; will retry");
                Outcome::Retry {
                    deployment_id: Some(id),
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                error!(deployment_id = %id, error = %e, "could not record failure");
                Outcome::Failed {
                    deployment_id: id,
                    reason,
                }
            }
        }
    }

    async fn retry_or_give_up(
        &self,
        message: &StreamMessage,
        deployment_id: Option<DeploymentId>,
        error: WorkerError,
    ) -> Outcome {
        let reason = error.to_string();
        if message.delivery_count >= self.config.max_deliveries {
            error!(
                message = %message.id,
                deliveries = message.delivery_count,
                error = %error,
                "giving up on build request"
            );
            if let Some(id) = deployment_id {
                let note = format!("gave up after {} attempts: {reason}", message.delivery_count);
                if let Err(e) = self.mark_failed(id, &note).await {
                    error!(deployment_id = %id, error = %e, "could not record failure");
                }
            }
            return Outcome::DeadLettered {
                deployment_id,
                reason,
            };
        }

        warn!(
            message = %message.id,
            attempt = message.delivery_count,
            error = %error,
            "retryable build failure; releasing for redelivery"
        );
        if let Some(id) = deployment_id {
            let note = format!("attempt {} failed: {reason}", message.delivery_count);
            if let Err(e) = self.deployments.append_log(id, &note).await {
                debug!(deployment_id = %id, error = %e, "could not append to build log");
            }
        }
        Outcome::Retry {
            deployment_id,
            reason,
        }
    }

    /// Drive a deployment to `Failed` along the forward-only path.
    async fn mark_failed(&self, id: DeploymentId, reason: &str) -> WorkerResult<()> {
        self.deployments
            .append_log(id, &format!("build failed: {reason}"))
            .await?;
        let current = self.deployments.get(id).await?;
        if current.status == DeploymentStatus::Pending {
            self.deployments
                .update_status(id, DeploymentStatus::Building)
                .await?;
        }
        if !current.status.is_terminal() {
            self.deployments
                .update_status(id, DeploymentStatus::Failed)
                .await?;
        }
        Ok(())
    }
}

/// Split a commit's blob entries into those to publish and those whose
/// output path is already taken.
///
/// A committed file always keeps its own path; a rendered file whose output
/// would overwrite it is skipped, as is a rendered file clashing with an
/// earlier one. Stored paths must be valid and must not shadow directories.
fn plan_outputs(entries: &[TreeEntry]) -> WorkerResult<(Vec<&TreeEntry>, Vec<&TreeEntry>)> {
    let blobs: Vec<&TreeEntry> = entries.iter().filter(|e| e.kind == EntryKind::Blob).collect();
    for entry in &blobs {
        validate_tree_path(&entry.path).map_err(|e| WorkerError::InvalidEntryPath {
            path: entry.path.clone(),
            reason: e.to_string(),
        })?;
    }

    let mut taken: BTreeSet<Cow<'_, str>> = blobs
        .iter()
        .map(|&e| output_path(&e.path))
        .filter(|out| matches!(out, Cow::Borrowed(_)))
        .collect();
    let mut planned = Vec::new();
    let mut skipped = Vec::new();
    for entry in blobs {
        let out = output_path(&entry.path);
        if matches!(out, Cow::Owned(_)) && !taken.insert(out) {
            skipped.push(entry);
        } else {
            planned.push(entry);
        }
    }

    let outputs: Vec<Cow<'_, str>> = planned.iter().map(|&e| output_path(&e.path)).collect();
    validate_tree_layout(outputs.iter().map(|p| p.as_ref())).map_err(|e| match e {
        EngineError::InvalidPath { path, reason } => WorkerError::InvalidEntryPath { path, reason },
        other => WorkerError::InvalidEntryPath {
            path: String::new(),
            reason: other.to_string(),
        },
    })?;
    Ok((planned, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sg_deploy::{DeployResult, DeploymentStore, InMemoryDeploymentStore};
    use sg_engine::VersionEngine;
    use sg_store::{BranchStore, Commit, InMemoryGraphStore, Transactional, TreeEntry};
    use sg_stream::{EventPublisher, Fields, InMemoryStream};
    use sg_types::{EnvironmentId, SiteId, UserId, WorkspaceId};

    use crate::artifact::{LocalArtifactStore, MemoryArtifactStore};

    /// Deployment store that remembers every status it has stored.
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryDeploymentStore,
        history: Mutex<Vec<(DeploymentId, DeploymentStatus)>>,
    }

    impl RecordingStore {
        fn note(&self, d: &Deployment) {
            self.history.lock().unwrap().push((d.id, d.status));
        }

        /// Distinct consecutive statuses observed for `id`.
        fn statuses(&self, id: DeploymentId) -> Vec<DeploymentStatus> {
            let mut seq: Vec<DeploymentStatus> = self
                .history
                .lock()
                .unwrap()
                .iter()
                .filter(|(d, _)| *d == id)
                .map(|(_, s)| *s)
                .collect();
            seq.dedup();
            seq
        }
    }

    impl DeploymentStore for RecordingStore {
        fn insert(&self, deployment: &Deployment) -> DeployResult<()> {
            self.inner.insert(deployment)?;
            self.note(deployment);
            Ok(())
        }

        fn get(&self, id: &DeploymentId) -> DeployResult<Option<Deployment>> {
            self.inner.get(id)
        }

        fn update(
            &self,
            id: &DeploymentId,
            f: &mut dyn FnMut(&mut Deployment) -> DeployResult<()>,
        ) -> DeployResult<Deployment> {
            let updated = self.inner.update(id, f)?;
            self.note(&updated);
            Ok(updated)
        }

        fn list_by_site(&self, site_id: &SiteId) -> DeployResult<Vec<Deployment>> {
            self.inner.list_by_site(site_id)
        }

        fn list_unpublished(&self) -> DeployResult<Vec<Deployment>> {
            self.inner.list_unpublished()
        }
    }

    /// Artifact store whose first `failures` writes fail.
    struct FlakyArtifacts {
        inner: MemoryArtifactStore,
        failures: AtomicUsize,
    }

    impl FlakyArtifacts {
        fn failing(times: usize) -> Self {
            Self {
                inner: MemoryArtifactStore::new(),
                failures: AtomicUsize::new(times),
            }
        }
    }

    #[async_trait]
    impl ArtifactStore for FlakyArtifacts {
        async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(io::Error::new(io::ErrorKind::Other, "disk unavailable"));
            }
            self.inner.write(path, contents).await
        }
    }

    struct Harness {
        graph: Arc<InMemoryGraphStore>,
        engine: VersionEngine<InMemoryGraphStore>,
        records: Arc<RecordingStore>,
        deployments: DeploymentService,
        stream: Arc<InMemoryStream>,
        workspace: WorkspaceId,
        site: SiteId,
        environment: EnvironmentId,
        user: UserId,
    }

    impl Harness {
        fn new() -> Self {
            let graph = Arc::new(InMemoryGraphStore::new());
            let records = Arc::new(RecordingStore::default());
            let stream = Arc::new(InMemoryStream::new());
            let deployments = DeploymentService::new(
                Arc::clone(&records) as Arc<dyn DeploymentStore>,
                Arc::clone(&stream) as Arc<dyn EventPublisher>,
            );
            Self {
                engine: VersionEngine::new(Arc::clone(&graph)),
                graph,
                records,
                deployments,
                stream,
                workspace: WorkspaceId::new(),
                site: SiteId::new(),
                environment: EnvironmentId::new(),
                user: UserId::new(),
            }
        }

        fn worker(
            &self,
            artifacts: Arc<dyn ArtifactStore>,
            config: WorkerConfig,
        ) -> BuildWorker<InMemoryGraphStore> {
            BuildWorker::new(
                Arc::clone(&self.graph),
                self.deployments.clone(),
                Arc::clone(&self.stream) as Arc<dyn StreamConsumer>,
                artifacts,
                config,
            )
        }

        fn commit(&self, branch: &str, files: &[(&str, &str)]) -> Commit {
            if self.graph.get_branch(&self.site, branch).unwrap().is_none() {
                self.engine.create_branch(self.site, branch, None).unwrap();
            }
            let files: BTreeMap<String, Vec<u8>> = files
                .iter()
                .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                .collect();
            self.engine
                .commit_changes(self.site, branch, "update", self.user, &files)
                .unwrap()
        }

        async fn deploy(&self, commit_ref: &str) -> Deployment {
            self.deployments
                .create_deployment(
                    self.workspace,
                    self.site,
                    self.environment,
                    commit_ref,
                    self.user,
                )
                .await
                .unwrap()
        }

        async fn deployment(&self, id: DeploymentId) -> Deployment {
            self.deployments.get(id).await.unwrap()
        }

        fn artifact_path(&self, commit: CommitId, file: &str) -> PathBuf {
            PathBuf::from(format!("{}/{}/{}/{}", self.workspace, self.site, commit, file))
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            max_deliveries: 3,
            read_backoff_initial_ms: 1,
            read_backoff_max_ms: 5,
            ..WorkerConfig::default()
        }
    }

    fn assert_forward_only(seq: &[DeploymentStatus]) {
        use DeploymentStatus::*;
        let allowed: &[&[DeploymentStatus]] = &[
            &[Pending],
            &[Pending, Building],
            &[Pending, Building, Success],
            &[Pending, Building, Failed],
        ];
        assert!(allowed.contains(&seq), "status regressed: {seq:?}");
    }

    // -----------------------------------------------------------------------
    // End-to-end scenarios
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn commit_then_deploy_writes_files() {
        let h = Harness::new();
        let branch = h.engine.create_branch(h.site, "main", None).unwrap();
        assert!(branch.head_commit_id.is_none());

        let commit = h.commit("main", &[("index.html", "<html>Hello</html>")]);
        assert_eq!(
            h.engine.get_branch(h.site, "main").unwrap().head_commit_id,
            Some(commit.id)
        );
        let entries = h.graph.tree_entries(&commit.id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "index.html");

        let root = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            storage_root: root.path().to_path_buf(),
            public_base_url: "https://sites.example.com".into(),
            ..fast_config()
        };
        let worker = h.worker(Arc::new(LocalArtifactStore::new(root.path())), config);

        let deployment = h.deploy(&commit.id.to_string()).await;
        let stats = worker.run_until_idle().await.unwrap();
        assert_eq!(stats.built, 1);

        let done = h.deployment(deployment.id).await;
        assert_eq!(done.status, DeploymentStatus::Success);
        assert!(done.finished_at.is_some());
        let storage_path = format!("{}/{}/{}", h.workspace, h.site, commit.id);
        assert_eq!(done.storage_path.as_deref(), Some(storage_path.as_str()));
        assert_eq!(
            done.url,
            Some(format!("https://sites.example.com/{storage_path}/"))
        );
        assert!(done.logs.contains("wrote 1 files"));

        let written =
            std::fs::read(root.path().join(h.artifact_path(commit.id, "index.html"))).unwrap();
        assert_eq!(written, b"<html>Hello</html>");
        assert_eq!(h.stream.pending_len(), 0);
    }

    #[tokio::test]
    async fn merge_keeps_source_tree() {
        let h = Harness::new();
        let base = h.commit("main", &[("index.html", "base")]);
        h.engine.create_branch(h.site, "feature", Some(base.id)).unwrap();
        let source = h.commit("feature", &[("index.html", "feature"), ("new.html", "n")]);
        let target = h.commit("main", &[("index.html", "hotfix")]);
        assert_ne!(source.tree_digest, target.tree_digest);

        let merge = h
            .engine
            .merge_branches(h.site, "feature", "main", h.user)
            .unwrap();
        assert_eq!(merge.tree_digest, source.tree_digest);
        assert_eq!(merge.parent_id, Some(target.id));
        assert_eq!(merge.merge_parent_id, Some(source.id));
        assert_eq!(
            h.engine.get_branch(h.site, "main").unwrap().head_commit_id,
            Some(merge.id)
        );

        // Deploying the merge publishes the source's files.
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let worker = h.worker(artifacts.clone(), fast_config());
        h.deploy(&merge.id.to_string()).await;
        worker.run_until_idle().await.unwrap();
        assert_eq!(
            artifacts.read(h.artifact_path(merge.id, "index.html")),
            Some(b"feature".to_vec())
        );
        assert!(artifacts.read(h.artifact_path(merge.id, "new.html")).is_some());
    }

    #[tokio::test]
    async fn unresolvable_commit_ref_fails_without_writes() {
        let h = Harness::new();
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let worker = h.worker(artifacts.clone(), fast_config());

        let garbage = h.deploy("not-a-commit").await;
        let unknown = h.deploy(&CommitId::new().to_string()).await;
        let stats = worker.run_until_idle().await.unwrap();

        assert_eq!(stats.failed, 2);
        for id in [garbage.id, unknown.id] {
            let d = h.deployment(id).await;
            assert_eq!(d.status, DeploymentStatus::Failed);
            assert!(d.finished_at.is_some());
            assert!(d.logs.contains("build failed"));
            assert_forward_only(&h.records.statuses(id));
        }
        assert!(artifacts.is_empty());
        assert_eq!(h.stream.pending_len(), 0);
    }

    #[tokio::test]
    async fn duplicate_branch_keeps_first_head() {
        let h = Harness::new();
        let first = h.commit("main", &[("a.html", "a")]);
        let err = h.engine.create_branch(h.site, "main", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(
            h.engine.get_branch(h.site, "main").unwrap().head_commit_id,
            Some(first.id)
        );
    }

    // -----------------------------------------------------------------------
    // Failure classification
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn commit_of_another_site_is_not_found() {
        let h = Harness::new();
        let other_site = SiteId::new();
        h.engine.create_branch(other_site, "main", None).unwrap();
        let foreign = h
            .engine
            .commit_changes(
                other_site,
                "main",
                "elsewhere",
                h.user,
                &BTreeMap::from([("a.html".to_string(), b"a".to_vec())]),
            )
            .unwrap();

        let artifacts = Arc::new(MemoryArtifactStore::new());
        let worker = h.worker(artifacts.clone(), fast_config());
        let d = h.deploy(&foreign.id.to_string()).await;
        worker.run_until_idle().await.unwrap();
        assert_eq!(h.deployment(d.id).await.status, DeploymentStatus::Failed);
        assert!(artifacts.is_empty());

        let own = h.commit("main", &[("b.html", "b")]);
        let ok = h.deploy(&own.id.to_string()).await;
        worker.run_until_idle().await.unwrap();
        assert_eq!(h.deployment(ok.id).await.status, DeploymentStatus::Success);
    }

    #[tokio::test]
    async fn invalid_stored_path_fails_without_writes() {
        let h = Harness::new();
        let real = h.commit("main", &[("index.html", "ok")]);
        let mut bad = real.clone();
        bad.id = CommitId::new();
        bad.parent_id = None;
        h.graph
            .with_transaction(|tx| {
                let digest = tx.stage_blob(b"evil");
                tx.stage_tree_entries([
                    TreeEntry::file(bad.id, "a.html", digest),
                    TreeEntry::file(bad.id, "../escape.html", digest),
                ]);
                tx.stage_commit(bad.clone());
                Ok(())
            })
            .unwrap();

        let artifacts = Arc::new(MemoryArtifactStore::new());
        let worker = h.worker(artifacts.clone(), fast_config());
        let d = h.deploy(&bad.id.to_string()).await;
        let stats = worker.run_until_idle().await.unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(h.deployment(d.id).await.status, DeploymentStatus::Failed);
        assert!(artifacts.is_empty());
        assert_eq!(h.stream.pending_len(), 0);
    }

    #[tokio::test]
    async fn stored_file_shadowing_a_directory_fails_once() {
        let h = Harness::new();
        let real = h.commit("main", &[("index.html", "ok")]);
        let mut bad = real.clone();
        bad.id = CommitId::new();
        bad.parent_id = None;
        h.graph
            .with_transaction(|tx| {
                let digest = tx.stage_blob(b"x");
                tx.stage_tree_entries([
                    TreeEntry::file(bad.id, "docs", digest),
                    TreeEntry::file(bad.id, "docs/a.html", digest),
                ]);
                tx.stage_commit(bad.clone());
                Ok(())
            })
            .unwrap();

        let artifacts = Arc::new(MemoryArtifactStore::new());
        let worker = h.worker(artifacts.clone(), fast_config());
        let d = h.deploy(&bad.id.to_string()).await;
        let stats = worker.run_until_idle().await.unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retried, 0);
        let done = h.deployment(d.id).await;
        assert_eq!(done.status, DeploymentStatus::Failed);
        assert!(done.logs.contains("docs"));
        assert!(artifacts.is_empty());
        assert_eq!(h.stream.pending_len(), 0);
    }

    #[tokio::test]
    async fn committed_file_wins_over_rendered_markdown() {
        let h = Harness::new();
        let commit = h.commit(
            "main",
            &[("a.html", "REAL HTML"), ("a.md", "# md"), ("b.md", "# b")],
        );
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let worker = h.worker(artifacts.clone(), fast_config());
        let d = h.deploy(&commit.id.to_string()).await;

        let stats = worker.run_until_idle().await.unwrap();
        assert_eq!(stats.built, 1);
        assert_eq!(
            artifacts.read(h.artifact_path(commit.id, "a.html")),
            Some(b"REAL HTML".to_vec())
        );
        assert_eq!(
            artifacts.read(h.artifact_path(commit.id, "b.html")),
            Some(b"<html><body><pre># b</pre></body></html>".to_vec())
        );
        assert_eq!(artifacts.len(), 2);

        let done = h.deployment(d.id).await;
        assert_eq!(done.status, DeploymentStatus::Success);
        assert!(done
            .logs
            .contains("skipped a.md: a.html is published from another file"));
        assert!(done.logs.contains("wrote 2 files"));
    }

    #[tokio::test]
    async fn clashing_markdown_sources_publish_one_file() {
        let h = Harness::new();
        let commit = h.commit("main", &[("x.md", "one"), ("x.markdown", "two")]);
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let worker = h.worker(artifacts.clone(), fast_config());
        let d = h.deploy(&commit.id.to_string()).await;

        worker.run_until_idle().await.unwrap();
        assert_eq!(artifacts.paths(), vec![h.artifact_path(commit.id, "x.html")]);
        let done = h.deployment(d.id).await;
        assert_eq!(done.status, DeploymentStatus::Success);
        assert!(done.logs.contains("wrote 1 files"));
        assert!(done.logs.contains("is published from another file"));
    }

    #[tokio::test]
    async fn malformed_and_unknown_requests_are_dropped() {
        let h = Harness::new();
        let worker = h.worker(Arc::new(MemoryArtifactStore::new()), fast_config());

        h.stream
            .publish(Fields::from([("foo".to_string(), "bar".to_string())]))
            .await
            .unwrap();
        h.stream
            .publish(DeploymentRequested::new(DeploymentId::new()).to_fields())
            .await
            .unwrap();

        let stats = worker.run_until_idle().await.unwrap();
        assert_eq!(stats.dropped, 2);
        assert_eq!(h.stream.pending_len(), 0);
    }

    #[tokio::test]
    async fn redelivered_request_has_no_further_effect() {
        let h = Harness::new();
        let commit = h.commit("main", &[("index.html", "hi")]);
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let worker = h.worker(artifacts.clone(), fast_config());

        let d = h.deploy(&commit.id.to_string()).await;
        worker.run_until_idle().await.unwrap();
        let finished = h.deployment(d.id).await;
        let history = h.records.statuses(d.id);

        h.stream
            .publish(DeploymentRequested::new(d.id).to_fields())
            .await
            .unwrap();
        let message = h.stream.try_claim().await.unwrap().unwrap();
        let outcome = worker.handle(message).await.unwrap();

        assert_eq!(outcome, Outcome::AlreadyFinished { deployment_id: d.id });
        assert_eq!(h.deployment(d.id).await, finished);
        assert_eq!(h.records.statuses(d.id), history);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(h.stream.pending_len(), 0);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let h = Harness::new();
        let commit = h.commit("main", &[("index.html", "hi"), ("guide.md", "# Guide")]);
        let artifacts = Arc::new(FlakyArtifacts::failing(1));
        let worker = h.worker(artifacts.clone(), fast_config());
        let d = h.deploy(&commit.id.to_string()).await;

        let first = h.stream.try_claim().await.unwrap().unwrap();
        let outcome = worker.handle(first).await.unwrap();
        assert!(matches!(outcome, Outcome::Retry { .. }));
        assert_eq!(h.deployment(d.id).await.status, DeploymentStatus::Building);
        assert_eq!(h.stream.pending_len(), 1);

        let second = h.stream.try_claim().await.unwrap().unwrap();
        assert_eq!(second.delivery_count, 2);
        let outcome = worker.handle(second).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Built {
                deployment_id: d.id,
                files: 2
            }
        );

        let done = h.deployment(d.id).await;
        assert_eq!(done.status, DeploymentStatus::Success);
        assert!(done.logs.contains("attempt 1 failed"));
        assert!(done.logs.contains("resuming build"));
        assert_forward_only(&h.records.statuses(d.id));
        assert_eq!(
            artifacts.inner.read(h.artifact_path(commit.id, "guide.html")),
            Some(b"<html><body><pre># Guide</pre></body></html>".to_vec())
        );
        assert_eq!(h.stream.pending_len(), 0);
    }

    #[tokio::test]
    async fn gives_up_after_max_deliveries() {
        let h = Harness::new();
        let commit = h.commit("main", &[("index.html", "hi")]);
        let worker = h.worker(Arc::new(FlakyArtifacts::failing(usize::MAX)), fast_config());
        let d = h.deploy(&commit.id.to_string()).await;

        let stats = worker.run_until_idle().await.unwrap();
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.dead_lettered, 1);

        let done = h.deployment(d.id).await;
        assert_eq!(done.status, DeploymentStatus::Failed);
        assert!(done.logs.contains("gave up after 3 attempts"));
        assert_forward_only(&h.records.statuses(d.id));
        assert_eq!(h.stream.pending_len(), 0);
    }

    #[tokio::test]
    async fn status_history_is_forward_only() {
        let h = Harness::new();
        let commit = h.commit("main", &[("index.html", "hi")]);
        let worker = h.worker(Arc::new(MemoryArtifactStore::new()), fast_config());

        let ok = h.deploy(&commit.id.to_string()).await;
        let bad = h.deploy("bogus").await;
        assert_eq!(h.records.statuses(ok.id), vec![DeploymentStatus::Pending]);

        worker.run_until_idle().await.unwrap();
        assert_eq!(
            h.records.statuses(ok.id),
            vec![
                DeploymentStatus::Pending,
                DeploymentStatus::Building,
                DeploymentStatus::Success
            ]
        );
        assert_eq!(
            h.records.statuses(bad.id),
            vec![
                DeploymentStatus::Pending,
                DeploymentStatus::Building,
                DeploymentStatus::Failed
            ]
        );
    }

    // -----------------------------------------------------------------------
    // Consumer loop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn run_builds_requests_published_while_waiting() {
        let h = Harness::new();
        let commit = h.commit("main", &[("index.html", "hi")]);
        let worker = h.worker(Arc::new(MemoryArtifactStore::new()), fast_config());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let driver = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let d = h.deploy(&commit.id.to_string()).await;
            for _ in 0..400 {
                if h.deployment(d.id).await.status.is_terminal() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            shutdown_tx.send(true).unwrap();
            d.id
        };

        let (stats, id) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(worker.run(shutdown_rx), driver)
        })
        .await
        .unwrap();

        assert_eq!(stats.built, 1);
        assert_eq!(h.deployment(id).await.status, DeploymentStatus::Success);
    }

    #[tokio::test]
    async fn idle_worker_stops_on_shutdown() {
        let h = Harness::new();
        let worker = h.worker(Arc::new(MemoryArtifactStore::new()), fast_config());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let stop = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(shutdown_tx);
        };
        let (stats, ()) = tokio::time::timeout(Duration::from_secs(1), async {
            tokio::join!(worker.run(shutdown_rx), stop)
        })
        .await
        .unwrap();
        assert_eq!(stats, WorkerStats::default());
    }
}
