//! Stream message and event schema.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sg_types::DeploymentId;

use crate::error::{Result, StreamError};

/// Flat string key/value payload carried by every stream message.
pub type Fields = BTreeMap<String, String>;

/// Payload key holding the deployment id of a [`DeploymentRequested`] event.
pub const DEPLOYMENT_ID_FIELD: &str = "deployment_id";

/// Position of a message in its stream. Assigned in publish order, starting at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A claimed message as handed to a consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamMessage {
    pub id: MessageId,
    pub fields: Fields,
    /// How many times this message has been claimed, this claim included.
    pub delivery_count: u32,
}

/// "Build this deployment" event, one per deployment creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequested {
    pub deployment_id: DeploymentId,
}

impl DeploymentRequested {
    pub fn new(deployment_id: DeploymentId) -> Self {
        Self { deployment_id }
    }

    /// Encode as stream message fields.
    pub fn to_fields(&self) -> Fields {
        Fields::from([(
            DEPLOYMENT_ID_FIELD.to_string(),
            self.deployment_id.to_string(),
        )])
    }

    /// Decode from stream message fields.
    pub fn from_fields(fields: &Fields) -> Result<Self> {
        let raw = fields.get(DEPLOYMENT_ID_FIELD).ok_or_else(|| {
            StreamError::MalformedPayload(format!("missing field {DEPLOYMENT_ID_FIELD:?}"))
        })?;
        let deployment_id = raw
            .parse()
            .map_err(|e| StreamError::MalformedPayload(format!("{e}")))?;
        Ok(Self { deployment_id })
    }

    /// The logical JSON form, `{"deployment_id": "<uuid>"}`.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StreamError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StreamError::MalformedPayload(e.to_string()))
    }
}
