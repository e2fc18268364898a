use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sitegraph",
    about = "SiteGraph: versioned documentation sites with static deployments",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file; defaults apply when it does not exist
    #[arg(long, global = true, default_value = "sitegraph.toml")]
    pub config: PathBuf,

    /// Override the directory deployment artifacts are written under
    #[arg(long, global = true)]
    pub storage_root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Commit a directory as a full snapshot and deploy it
    Publish(PublishArgs),
    /// Process build requests left in the durable stream
    Worker(WorkerArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct PublishArgs {
    /// Directory whose files make up the site
    #[arg(long)]
    pub site_dir: PathBuf,
    /// Branch to commit to (defaults to the engine's default branch)
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(short, long)]
    pub message: Option<String>,
}

#[derive(Args)]
pub struct WorkerArgs {
    /// Keep consuming until interrupted instead of stopping when idle
    #[arg(long)]
    pub follow: bool,
}

#[derive(Args)]
pub struct ConfigArgs {}
