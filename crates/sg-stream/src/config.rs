use serde::{Deserialize, Serialize};

/// Stream and consumer-group naming plus durability settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Name of the stream; also the durable log's file stem.
    pub stream_name: String,
    /// Consumer group the build workers join.
    pub group_name: String,
    /// Name this process claims messages under.
    pub consumer_name: String,
    /// `fsync` the durable log after every record.
    pub sync_every_write: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_name: "deployment-requests".to_string(),
            group_name: "deployment-builders".to_string(),
            consumer_name: "builder-1".to_string(),
            sync_every_write: false,
        }
    }
}

impl StreamConfig {
    /// File name of the durable log for this stream.
    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.stream_name)
    }
}
