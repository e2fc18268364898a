use async_trait::async_trait;

use crate::error::Result;
use crate::event::{Fields, MessageId, StreamMessage};

/// Append side of the stream.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Append a message and return its id.
    async fn publish(&self, fields: Fields) -> Result<MessageId>;
}

/// Consumer-group side of the stream.
///
/// A claimed message is invisible to every other claim until it is either
/// acknowledged (removed for good) or released (claimable again).
#[async_trait]
pub trait StreamConsumer: Send + Sync {
    /// Wait until a message is claimable, then claim it.
    async fn claim_next(&self) -> Result<StreamMessage>;

    /// Claim a message if one is claimable right now.
    async fn try_claim(&self) -> Result<Option<StreamMessage>>;

    /// Acknowledge a message. Acknowledging twice is a no-op.
    async fn ack(&self, id: MessageId) -> Result<()>;

    /// Hand a claimed message back for redelivery.
    async fn release(&self, id: MessageId) -> Result<()>;
}
