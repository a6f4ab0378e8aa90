//! Per-conversation message timeline. One instance lives for the duration of
//! a single conversation open; it owns the invariants the renderer relies on:
//! unique by message id, non-decreasing by `created_at`, only messages of its
//! own conversation.

use std::collections::HashSet;

use crate::backend::MessageRecord;

pub struct Timeline {
    conversation_id: String,
    messages: Vec<MessageRecord>,
    ids: HashSet<String>,
    seeded: bool,
    /// Live events that arrived before the history seed. Replayed through
    /// `merge` once the seed lands so history always precedes live data.
    pending: Vec<MessageRecord>,
}

impl Timeline {
    pub fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            messages: Vec::new(),
            ids: HashSet::new(),
            seeded: false,
            pending: Vec::new(),
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Replace the timeline wholesale with the loaded history. The loader
    /// returns rows already ascending by `created_at`; that order is kept
    /// as-is. Live events buffered while the load was in flight are then
    /// replayed, so a message that arrived both in history and over the
    /// channel lands exactly once.
    pub fn seed(&mut self, history: Vec<MessageRecord>) {
        self.messages.clear();
        self.ids.clear();
        for record in history {
            if self.ids.insert(record.id.clone()) {
                self.messages.push(record);
            }
        }
        self.seeded = true;
        for record in std::mem::take(&mut self.pending) {
            self.merge(record);
        }
    }

    /// Merge one live message. Returns whether the timeline changed (or, before
    /// the seed, whether the message was buffered). Messages for other
    /// conversations and already-known ids are dropped; out-of-order arrivals
    /// are placed by `created_at`, after existing equal timestamps.
    pub fn merge(&mut self, record: MessageRecord) -> bool {
        if record.conversation_id != self.conversation_id {
            return false;
        }
        if !self.seeded {
            if self.pending.iter().any(|p| p.id == record.id) {
                return false;
            }
            self.pending.push(record);
            return true;
        }
        if !self.ids.insert(record.id.clone()) {
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| m.created_at <= record.created_at);
        self.messages.insert(at, record);
        true
    }
}
