use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sg_engine::EngineConfig;
use sg_stream::StreamConfig;
use sg_worker::WorkerConfig;
use tracing::debug;

/// Configuration of every SiteGraph component, as read from TOML.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteGraphConfig {
    /// Directory holding the durable stream log.
    pub data_dir: PathBuf,
    pub engine: EngineConfig,
    pub stream: StreamConfig,
    pub worker: WorkerConfig,
}

impl Default for SiteGraphConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("sitegraph-data"),
            engine: EngineConfig::default(),
            stream: StreamConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl SiteGraphConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn stream_dir(&self) -> PathBuf {
        self.data_dir.join("stream")
    }
}
