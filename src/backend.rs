//! Seams to the external collaborators: identity provider, store of record,
//! and push channel. The core only ever talks to these traits; tests and
//! hosts inject implementations.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use memory::MemoryBackend;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub user_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub conversation_id: String,
    pub user_id: String,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload. The store of record assigns `id` and `created_at`; the
/// caller never relies on a returned row (the echo arrives via the channel).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
}

#[derive(Clone, Debug)]
pub enum PushEvent {
    MessageInserted { message: MessageRecord },
}

#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    /// `Ok(None)` means no signed-in user.
    async fn current_session(&self) -> Result<Option<SessionInfo>, StoreError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync + 'static {
    async fn participants(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ParticipantRecord>, StoreError>;

    /// Persisted messages for the conversation, ordered ascending by
    /// `created_at`.
    async fn messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, StoreError>;

    async fn insert_message(&self, message: NewMessage) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PushChannel: Send + Sync + 'static {
    async fn subscribe(
        &self,
        conversation_id: &str,
    ) -> Result<Box<dyn PushSubscription>, StoreError>;
}

/// A live subscription scoped to one conversation id. `next_event` returning
/// `None` means the channel dropped; `close` releases server-side resources.
#[async_trait]
pub trait PushSubscription: Send {
    async fn next_event(&mut self) -> Option<PushEvent>;
    async fn close(&mut self);
}

/// The bundle of collaborators handed to [`crate::App::new`].
#[derive(Clone)]
pub struct Backend {
    pub sessions: Arc<dyn SessionProvider>,
    pub store: Arc<dyn ConversationStore>,
    pub channel: Arc<dyn PushChannel>,
}

impl Backend {
    /// Wire a single object implementing all three seams (the common case for
    /// [`MemoryBackend`] and test fixtures).
    pub fn from_parts<T>(backend: Arc<T>) -> Self
    where
        T: SessionProvider + ConversationStore + PushChannel,
    {
        Self {
            sessions: backend.clone(),
            store: backend.clone(),
            channel: backend,
        }
    }
}
