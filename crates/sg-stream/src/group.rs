//! Consumer-group bookkeeping shared by the in-memory and durable streams.

use std::collections::BTreeMap;

use crate::error::{Result, StreamError};
use crate::event::{Fields, MessageId, StreamMessage};

#[derive(Debug)]
struct Entry {
    fields: Fields,
    claimed: bool,
    delivery_count: u32,
}

/// Unacknowledged messages of one stream and their claim state.
///
/// Claims are handed out lowest id first, so delivery follows publish order
/// except where a released message jumps back ahead of newer ones.
#[derive(Debug, Default)]
pub(crate) struct GroupState {
    last_id: u64,
    entries: BTreeMap<MessageId, Entry>,
}

impl GroupState {
    /// Allocate the next id and enqueue `fields` under it.
    pub(crate) fn push(&mut self, fields: Fields) -> MessageId {
        self.last_id += 1;
        let id = MessageId(self.last_id);
        self.restore(id, fields);
        id
    }

    /// Id the next `push` will use.
    pub(crate) fn next_id(&self) -> MessageId {
        MessageId(self.last_id + 1)
    }

    /// Re-insert a message with a known id (log replay).
    pub(crate) fn restore(&mut self, id: MessageId, fields: Fields) {
        self.last_id = self.last_id.max(id.0);
        self.entries.insert(
            id,
            Entry {
                fields,
                claimed: false,
                delivery_count: 0,
            },
        );
    }

    pub(crate) fn claim(&mut self) -> Option<StreamMessage> {
        let (id, entry) = self.entries.iter_mut().find(|(_, e)| !e.claimed)?;
        entry.claimed = true;
        entry.delivery_count += 1;
        Some(StreamMessage {
            id: *id,
            fields: entry.fields.clone(),
            delivery_count: entry.delivery_count,
        })
    }

    /// Returns `true` if the message was newly acknowledged.
    pub(crate) fn ack(&mut self, id: MessageId) -> Result<bool> {
        if self.entries.remove(&id).is_some() {
            return Ok(true);
        }
        if self.was_acked(id) {
            return Ok(false);
        }
        Err(StreamError::UnknownMessage(id))
    }

    /// Ids are allocated densely, so an allocated id with no entry was acked.
    fn was_acked(&self, id: MessageId) -> bool {
        id.0 >= 1 && id.0 <= self.last_id && !self.entries.contains_key(&id)
    }

    /// Returns `true` if a claimed message became claimable again.
    pub(crate) fn release(&mut self, id: MessageId) -> Result<bool> {
        if let Some(entry) = self.entries.get_mut(&id) {
            if entry.claimed {
                entry.claimed = false;
                return Ok(true);
            }
            return Ok(false);
        }
        if self.was_acked(id) {
            Ok(false)
        } else {
            Err(StreamError::UnknownMessage(id))
        }
    }

    /// Every unacknowledged message, in id order.
    pub(crate) fn unacked(&self) -> impl Iterator<Item = (MessageId, &Fields)> + '_ {
        self.entries.iter().map(|(id, e)| (*id, &e.fields))
    }

    /// Messages not yet acknowledged, claimed or not.
    pub(crate) fn pending_len(&self) -> usize {
        self.entries.len()
    }

    /// Messages claimable right now.
    pub(crate) fn claimable_len(&self) -> usize {
        self.entries.values().filter(|e| !e.claimed).count()
    }
}
