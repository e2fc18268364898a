use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use sg_deploy::{
    AuditSink, Deployment, DeploymentService, DeploymentStatus, DeploymentStore,
    InMemoryDeploymentStore, TracingAuditSink,
};
use sg_engine::VersionEngine;
use sg_store::InMemoryGraphStore;
use sg_stream::{DurableStream, EventPublisher, StreamConsumer};
use sg_types::{EnvironmentId, SiteId, UserId, WorkspaceId};
use sg_worker::{ArtifactStore, BuildWorker, LocalArtifactStore, WorkerStats};
use tokio::sync::watch;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cli::*;
use crate::config::SiteGraphConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = SiteGraphConfig::load(&cli.config)?;
    if let Some(root) = cli.storage_root {
        config.worker.storage_root = root;
    }

    match cli.command {
        Command::Publish(args) => cmd_publish(&config, args).await,
        Command::Worker(args) => cmd_worker(&config, args).await,
        Command::Config(_) => cmd_config(&config),
    }
}

/// Every component of a single-process deployment pipeline.
struct Pipeline {
    engine: VersionEngine<InMemoryGraphStore>,
    deployments: DeploymentService,
    stream: Arc<DurableStream>,
    worker: BuildWorker<InMemoryGraphStore>,
}

impl Pipeline {
    fn open(config: &SiteGraphConfig, audit: Arc<dyn AuditSink>) -> anyhow::Result<Self> {
        let graph = Arc::new(InMemoryGraphStore::new());
        let engine = VersionEngine::with_config(Arc::clone(&graph), config.engine.clone());

        let stream_dir = config.stream_dir();
        let stream = Arc::new(
            DurableStream::open(&stream_dir, config.stream.clone())
                .with_context(|| format!("opening stream in {}", stream_dir.display()))?,
        );
        let store: Arc<dyn DeploymentStore> = Arc::new(InMemoryDeploymentStore::new());
        let deployments =
            DeploymentService::new(store, Arc::clone(&stream) as Arc<dyn EventPublisher>)
                .with_audit(audit);

        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(LocalArtifactStore::new(config.worker.storage_root.clone()));
        let worker = BuildWorker::new(
            graph,
            deployments.clone(),
            Arc::clone(&stream) as Arc<dyn StreamConsumer>,
            artifacts,
            config.worker.clone(),
        );

        Ok(Self {
            engine,
            deployments,
            stream,
            worker,
        })
    }
}

/// Read every regular file under `dir`, keyed by its `/`-separated relative path.
fn collect_site_files(dir: &Path) -> anyhow::Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir)?;
        let path = relative
            .components()
            .map(|c| {
                c.as_os_str()
                    .to_str()
                    .ok_or_else(|| anyhow!("non-UTF-8 path: {}", relative.display()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?
            .join("/");
        let bytes = fs::read(entry.path())
            .with_context(|| format!("reading {}", entry.path().display()))?;
        files.insert(path, bytes);
    }
    Ok(files)
}

/// Commit `args.site_dir` to a fresh site and build the resulting deployment.
async fn publish(
    pipeline: &Pipeline,
    config: &SiteGraphConfig,
    args: &PublishArgs,
) -> anyhow::Result<Deployment> {
    let files = collect_site_files(&args.site_dir)?;
    if files.is_empty() {
        warn!(dir = %args.site_dir.display(), "site directory has no files");
    }

    let workspace = WorkspaceId::new();
    let site = SiteId::new();
    let environment = EnvironmentId::new();
    let user = UserId::new();
    let branch = args
        .branch
        .clone()
        .unwrap_or_else(|| config.engine.default_branch.clone());
    let message = args
        .message
        .clone()
        .unwrap_or_else(|| format!("Publish {}", args.site_dir.display()));

    pipeline.engine.create_branch(site, &branch, None)?;
    let commit = pipeline
        .engine
        .commit_changes(site, &branch, &message, user, &files)?;
    let deployment = pipeline
        .deployments
        .create_deployment(workspace, site, environment, &commit.id.to_string(), user)
        .await?;

    let stats = pipeline.worker.run_until_idle().await?;
    info!(
        processed = stats.processed(),
        dropped = stats.dropped,
        "stream drained"
    );
    Ok(pipeline.deployments.get(deployment.id).await?)
}

async fn cmd_publish(config: &SiteGraphConfig, args: PublishArgs) -> anyhow::Result<()> {
    let pipeline = Pipeline::open(config, Arc::new(TracingAuditSink))?;
    let deployment = publish(&pipeline, config, &args).await?;
    println!("Commit {}", deployment.commit_ref.yellow());
    println!("Deployment {} {}", deployment.id, status_label(deployment.status));
    if !deployment.logs.is_empty() {
        for line in deployment.logs.lines() {
            println!("  {}", line.dimmed());
        }
    }

    if deployment.status != DeploymentStatus::Success {
        bail!("deployment {} did not succeed", deployment.id);
    }
    if let Some(path) = &deployment.storage_path {
        println!(
            "{} Published to {}",
            "✓".green().bold(),
            config.worker.storage_root.join(path).display()
        );
    }
    if let Some(url) = &deployment.url {
        println!("  URL: {}", url.blue());
    }
    Ok(())
}

async fn cmd_worker(config: &SiteGraphConfig, args: WorkerArgs) -> anyhow::Result<()> {
    let pipeline = Pipeline::open(config, Arc::new(TracingAuditSink))?;
    println!(
        "Stream {}: {} pending",
        config.stream.stream_name.bold(),
        pipeline.stream.pending_len()
    );

    let stats = if args.follow {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; stopping worker");
                let _ = shutdown_tx.send(true);
            }
        });
        pipeline.worker.run(shutdown_rx).await
    } else {
        pipeline.worker.run_until_idle().await?
    };

    print_stats(&stats);
    Ok(())
}

fn cmd_config(config: &SiteGraphConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

fn status_label(status: DeploymentStatus) -> colored::ColoredString {
    match status {
        DeploymentStatus::Success => status.to_string().green(),
        DeploymentStatus::Failed => status.to_string().red(),
        _ => status.to_string().yellow(),
    }
}

fn print_stats(stats: &WorkerStats) {
    println!(
        "{} {} built, {} failed, {} retried, {} dead-lettered, {} duplicate, {} dropped",
        "✓".green().bold(),
        stats.built,
        stats.failed,
        stats.retried,
        stats.dead_lettered,
        stats.duplicates,
        stats.dropped
    );
}
