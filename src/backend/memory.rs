//! In-process reference backend. Deterministic and offline: store-assigned
//! uuid ids, monotonic timestamps, and inserts broadcast to every live
//! subscriber of the conversation. Used by tests and demos in place of the
//! hosted store + realtime channel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::StoreError;

use super::{
    ConversationStore, MessageRecord, NewMessage, ParticipantRecord, PushChannel, PushEvent,
    PushSubscription, SessionInfo, SessionProvider,
};

#[derive(Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    session: Option<SessionInfo>,
    participants: HashMap<String, Vec<ParticipantRecord>>,
    messages: HashMap<String, Vec<MessageRecord>>,
    subscribers: HashMap<u64, (String, flume::Sender<PushEvent>)>,
    next_sub_id: u64,
    last_assigned_at: Option<DateTime<Utc>>,
}

impl Inner {
    // Store-assigned timestamps are strictly increasing so rapid inserts
    // never tie (second-granularity ties caused paging nondeterminism in
    // earlier chat stacks).
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut ts = Utc::now();
        if let Some(last) = self.last_assigned_at {
            if ts <= last {
                ts = last + Duration::milliseconds(1);
            }
        }
        self.last_assigned_at = Some(ts);
        ts
    }

    fn broadcast(&mut self, conversation_id: &str, event: PushEvent) {
        // Prune subscribers whose receiver side is gone.
        self.subscribers.retain(|_, (cid, sender)| {
            if cid != conversation_id {
                return true;
            }
            sender.send(event.clone()).is_ok()
        });
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_session(&self, user_id: &str) {
        self.inner.lock().session = Some(SessionInfo {
            user_id: user_id.to_string(),
        });
    }

    pub fn clear_session(&self) {
        self.inner.lock().session = None;
    }

    pub fn add_conversation(&self, conversation_id: &str) {
        let mut inner = self.inner.lock();
        inner.participants.entry(conversation_id.to_string()).or_default();
        inner.messages.entry(conversation_id.to_string()).or_default();
    }

    pub fn add_participant(&self, conversation_id: &str, user_id: &str, display_name: Option<&str>) {
        self.add_conversation(conversation_id);
        let mut inner = self.inner.lock();
        if let Some(rows) = inner.participants.get_mut(conversation_id) {
            rows.push(ParticipantRecord {
                conversation_id: conversation_id.to_string(),
                user_id: user_id.to_string(),
                display_name: display_name.map(str::to_string),
            });
        }
    }

    /// Append a historical message without notifying subscribers. Fixture for
    /// pre-open history.
    pub fn seed_message(&self, conversation_id: &str, sender_id: &str, body: &str) -> MessageRecord {
        let mut inner = self.inner.lock();
        let record = MessageRecord {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            created_at: inner.next_timestamp(),
        };
        inner
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    /// Insert a message as the store of record would: assign id + timestamp,
    /// persist, then broadcast to live subscribers of the conversation.
    pub fn insert(
        &self,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<MessageRecord, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.messages.contains_key(conversation_id) {
            return Err(StoreError::NotFound(conversation_id.to_string()));
        }
        let record = MessageRecord {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            created_at: inner.next_timestamp(),
        };
        if let Some(rows) = inner.messages.get_mut(conversation_id) {
            rows.push(record.clone());
        }
        inner.broadcast(
            conversation_id,
            PushEvent::MessageInserted {
                message: record.clone(),
            },
        );
        Ok(record)
    }

    /// Deliver an event to the conversation's subscribers without touching
    /// storage. Fixture for duplicate redelivery and mis-tagged payloads.
    pub fn publish(&self, conversation_id: &str, event: PushEvent) {
        self.inner.lock().broadcast(conversation_id, event);
    }

    /// Drop every subscriber of the conversation, simulating a lost channel.
    pub fn drop_subscribers(&self, conversation_id: &str) {
        self.inner
            .lock()
            .subscribers
            .retain(|_, (cid, _)| cid != conversation_id);
    }

    pub fn message_count(&self, conversation_id: &str) -> usize {
        self.inner
            .lock()
            .messages
            .get(conversation_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self, conversation_id: &str) -> usize {
        self.inner
            .lock()
            .subscribers
            .values()
            .filter(|(cid, _)| cid == conversation_id)
            .count()
    }
}

#[async_trait]
impl SessionProvider for MemoryBackend {
    async fn current_session(&self) -> Result<Option<SessionInfo>, StoreError> {
        Ok(self.inner.lock().session.clone())
    }
}

#[async_trait]
impl ConversationStore for MemoryBackend {
    async fn participants(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ParticipantRecord>, StoreError> {
        self.inner
            .lock()
            .participants
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        self.inner
            .lock()
            .messages
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))
    }

    async fn insert_message(&self, message: NewMessage) -> Result<(), StoreError> {
        self.insert(&message.conversation_id, &message.sender_id, &message.body)?;
        Ok(())
    }
}

#[async_trait]
impl PushChannel for MemoryBackend {
    async fn subscribe(
        &self,
        conversation_id: &str,
    ) -> Result<Box<dyn PushSubscription>, StoreError> {
        let (tx, rx) = flume::unbounded();
        let id = {
            let mut inner = self.inner.lock();
            if !inner.messages.contains_key(conversation_id) {
                return Err(StoreError::NotFound(conversation_id.to_string()));
            }
            let id = inner.next_sub_id;
            inner.next_sub_id += 1;
            inner
                .subscribers
                .insert(id, (conversation_id.to_string(), tx));
            id
        };
        Ok(Box::new(MemorySubscription {
            id,
            rx,
            inner: self.inner.clone(),
        }))
    }
}

struct MemorySubscription {
    id: u64,
    rx: flume::Receiver<PushEvent>,
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl PushSubscription for MemorySubscription {
    async fn next_event(&mut self) -> Option<PushEvent> {
        self.rx.recv_async().await.ok()
    }

    async fn close(&mut self) {
        self.inner.lock().subscribers.remove(&self.id);
    }
}
