use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Build worker configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Directory artifacts are written under.
    pub storage_root: PathBuf,
    /// Base URL the storage root is served from.
    pub public_base_url: String,
    /// Deliveries of one message before its deployment is failed for good.
    pub max_deliveries: u32,
    /// First sleep after a stream read error or a retryable build failure.
    pub read_backoff_initial_ms: u64,
    /// Upper bound for the doubling read backoff.
    pub read_backoff_max_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("sitegraph-data/artifacts"),
            public_base_url: "http://localhost:8080/sites".to_string(),
            max_deliveries: 5,
            read_backoff_initial_ms: 100,
            read_backoff_max_ms: 5_000,
        }
    }
}

impl WorkerConfig {
    pub fn read_backoff_initial(&self) -> Duration {
        Duration::from_millis(self.read_backoff_initial_ms)
    }

    pub fn read_backoff_max(&self) -> Duration {
        Duration::from_millis(self.read_backoff_max_ms.max(self.read_backoff_initial_ms))
    }

    /// Public URL of an artifact directory relative to the storage root.
    pub fn public_url(&self, storage_path: &str) -> String {
        format!("{}/{}/", self.public_base_url.trim_end_matches('/'), storage_path)
    }
}
