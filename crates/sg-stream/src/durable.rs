use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::event::{Fields, MessageId, StreamMessage};
use crate::group::GroupState;
use crate::log::{LogRecord, StreamLog};
use crate::traits::{EventPublisher, StreamConsumer};

/// File-backed stream that survives restarts.
///
/// Every publish and every acknowledgement is appended to a [`StreamLog`]
/// before it takes effect in memory. Opening the stream replays the log,
/// compacts it down to the unacknowledged messages, and makes all of them
/// claimable again. Claims themselves are not logged, so a message that was
/// in flight when the process stopped is delivered again after a restart and
/// its delivery count starts over.
pub struct DurableStream {
    config: StreamConfig,
    log: StreamLog,
    state: Mutex<GroupState>,
    notify: Notify,
}

impl DurableStream {
    /// Open the stream's log inside `dir`, creating it if needed.
    pub fn open(dir: &Path, config: StreamConfig) -> Result<Self> {
        let log = StreamLog::open(&dir.join(config.log_file_name()), config.sync_every_write)?;

        let mut state = GroupState::default();
        let mut acked = 0usize;
        for record in log.recover()? {
            match record {
                LogRecord::Append { id, fields } => state.restore(id, fields),
                LogRecord::Ack { id } => match state.ack(id) {
                    Ok(_) => acked += 1,
                    Err(e) => warn!(id = %id, error = %e, "ack for unknown message in log"),
                },
            }
        }

        if acked > 0 {
            let live: Vec<LogRecord> = state
                .unacked()
                .map(|(id, fields)| LogRecord::Append {
                    id,
                    fields: fields.clone(),
                })
                .collect();
            log.rewrite(&live)?;
        }

        info!(
            stream = %config.stream_name,
            group = %config.group_name,
            pending = state.pending_len(),
            compacted = acked,
            "durable stream opened"
        );

        Ok(Self {
            config,
            log,
            state: Mutex::new(state),
            notify: Notify::new(),
        })
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
}

#[async_trait]
impl EventPublisher for DurableStream {
    async fn publish(&self, fields: Fields) -> Result<MessageId> {
        let id = {
            let mut state = self.lock()?;
            let id = state.next_id();
            self.log.append(&LogRecord::Append {
                id,
                fields: fields.clone(),
            })?;
            state.push(fields)
        };
        self.notify.notify_one();
        debug!(stream = %self.config.stream_name, id = %id, "message published");
        Ok(id)
    }
}

#[async_trait]
impl StreamConsumer for DurableStream {
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
        let mut state = self.lock()?;
        if state.ack(id)? {
            // Logged after the in-memory ack; a failed write only means the
            // message is delivered again after a restart.
            self.log.append(&LogRecord::Ack { id })?;
            debug!(group = %self.config.group_name, id = %id, "message acknowledged");
        }
        Ok(())
    }

    async fn release(&self, id: MessageId) -> Result<()> {
        let released = self.lock()?.release(id)?;
        if released {
            self.notify.notify_one();
            debug!(group = %self.config.group_name, id = %id, "message released");
        }
        Ok(())
    }
}
