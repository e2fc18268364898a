use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::event::{Fields, MessageId, StreamMessage};
use crate::group::GroupState;
use crate::traits::{EventPublisher, StreamConsumer};

/// In-process stream with consumer-group semantics.
///
/// Nothing survives a restart; use [`DurableStream`](crate::DurableStream)
/// for that. `claim_next` parks on a [`Notify`] until a publish or release
/// makes a message claimable, so an idle consumer never polls.
pub struct InMemoryStream {
    config: StreamConfig,
    state: Mutex<GroupState>,
    notify: Notify,
}

impl InMemoryStream {
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GroupState::default()),
            notify: Notify::new(),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, GroupState>> {
        self.state
            .lock()
            .map_err(|e| StreamError::Unavailable(format!("stream lock poisoned: {e}")))
    }

    /// Messages published but not yet acknowledged.
    pub fn pending_len(&self) -> usize {
        self.lock().map(|s| s.pending_len()).unwrap_or(0)
    }

    /// Messages claimable right now.
    pub fn claimable_len(&self) -> usize {
        self.lock().map(|s| s.claimable_len()).unwrap_or(0)
    }
}

impl Default for InMemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryStream {
    async fn publish(&self, fields: Fields) -> Result<MessageId> {
        let id = self.lock()?.push(fields);
        self.notify.notify_one();
        debug!(stream = %self.config.stream_name, id = %id, "message published");
        Ok(id)
    }
}

#[async_trait]
impl StreamConsumer for InMemoryStream {
    async fn claim_next(&self) -> Result<StreamMessage> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let claimed = self.lock()?.claim();
            if let Some(message) = claimed {
                return Ok(message);
            }
            notified.await;
        }
    }

    async fn try_claim(&self) -> Result<Option<StreamMessage>> {
        Ok(self.lock()?.claim())
    }

    async fn ack(&self, id: MessageId) -> Result<()> {
        if self.lock()?.ack(id)? {
            debug!(group = %self.config.group_name, id = %id, "message acknowledged");
        }
        Ok(())
    }

    async fn release(&self, id: MessageId) -> Result<()> {
        if self.lock()?.release(id)? {
            self.notify.notify_one();
            debug!(group = %self.config.group_name, id = %id, "message released");
        }
        Ok(())
    }
}
