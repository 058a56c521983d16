use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{report_parts, ChannelStore, MessageId, Progress, StoreError, StoreResult};

/// A message held by a [`MemoryChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub name: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    messages: BTreeMap<MessageId, Message>,
    last_id: MessageId,
}

/// In-memory channel store.
///
/// Clones share the same message map, so a test can keep a handle and assert
/// on the channel state while the driver owns the boxed store.
#[derive(Debug, Default, Clone)]
pub struct MemoryChannel {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently in the channel.
    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    /// Snapshot of one message.
    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.lock().messages.get(&id).cloned()
    }

    /// Ids currently in the channel, in ascending order.
    pub fn message_ids(&self) -> Vec<MessageId> {
        self.lock().messages.keys().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
impl MemoryChannel {
    /// Flip one payload byte, simulating corruption of the stored object.
    pub(crate) fn tamper(&self, id: MessageId, index: usize) {
        let mut inner = self.lock();
        let message = inner.messages.get_mut(&id).expect("no such message");
        message.payload[index] ^= 0xff;
    }

    /// Drop every message, simulating a wiped channel.
    pub(crate) fn clear(&self) {
        self.lock().messages.clear();
    }
}

impl ChannelStore for MemoryChannel {
    fn send(&mut self, name: &str, payload: &[u8], progress: Progress) -> StoreResult<MessageId> {
        report_parts(payload.len(), progress);
        let mut inner = self.lock();
        inner.last_id += 1;
        let id = inner.last_id;
        inner.messages.insert(
            id,
            Message {
                name: name.to_string(),
                payload: payload.to_vec(),
            },
        );
        Ok(id)
    }

    fn fetch(&mut self, id: MessageId) -> StoreResult<Vec<u8>> {
        self.lock()
            .messages
            .get(&id)
            .map(|message| message.payload.clone())
            .ok_or(StoreError::NoSuchMessage(id))
    }

    fn delete(&mut self, ids: &[MessageId]) -> StoreResult<()> {
        let mut inner = self.lock();
        for id in ids {
            if inner.messages.remove(id).is_none() {
                warn!("delete of unknown message {id}");
            }
        }
        Ok(())
    }
}
