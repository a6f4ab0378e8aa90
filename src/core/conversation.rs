//! Conversation open/close and the participant + history loads.

use std::collections::HashMap;

use super::{AppCore, OpenConversation};
use crate::backend::{MessageRecord, ParticipantRecord};
use crate::error::StoreError;
use crate::state::{ChannelState, ConversationViewState};
use crate::timeline::Timeline;
use crate::updates::{CoreMsg, InternalEvent};

impl AppCore {
    pub(super) fn open_conversation(&mut self, conversation_id: &str) {
        tracing::info!(conversation_id = %conversation_id, "open_conversation");

        // Invalidate everything started under the previous open. Dropping the
        // old OpenConversation drops its detach sender, which ends the old
        // subscription task.
        self.open_token += 1;
        self.open = Some(OpenConversation {
            conversation_id: conversation_id.to_string(),
            timeline: Timeline::new(conversation_id),
            authors: HashMap::new(),
            detach: None,
        });

        self.state.conversation = Some(ConversationViewState {
            conversation_id: conversation_id.to_string(),
            counterpart_name: self.counterpart_placeholder(),
            messages: vec![],
            loading: true,
            load_error: None,
            channel: ChannelState::Detached,
            draft: String::new(),
            sending: false,
            send_error: None,
        });
        self.emit_conversation();

        self.resolve_identity();
    }

    pub(super) fn close_conversation(&mut self) {
        if self.open.is_none() && self.state.conversation.is_none() {
            return;
        }
        tracing::info!("close_conversation");
        self.open = None;
        self.open_token += 1;
        if self.state.conversation.take().is_some() {
            self.emit_conversation();
        }
    }

    /// Identity is confirmed: kick off the participant and history loads and
    /// attach the live channel. All three run concurrently under the current
    /// open token.
    pub(super) fn start_conversation_loads(&mut self) {
        let token = self.open_token;
        let Some(open) = self.open.as_ref() else {
            return;
        };
        let conversation_id = open.conversation_id.clone();

        let store = self.backend.store.clone();
        let tx = self.core_sender.clone();
        let cid = conversation_id.clone();
        self.runtime.spawn(async move {
            let result = store.participants(&cid).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ParticipantsLoaded { token, result },
            )));
        });

        let store = self.backend.store.clone();
        let tx = self.core_sender.clone();
        let cid = conversation_id;
        self.runtime.spawn(async move {
            let result = store.messages(&cid).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::HistoryLoaded {
                token,
                result,
            })));
        });

        self.attach_channel();
    }

    pub(super) fn on_participants_loaded(
        &mut self,
        token: u64,
        result: Result<Vec<ParticipantRecord>, StoreError>,
    ) {
        if self.is_stale(token) {
            tracing::debug!(token, "participants_loaded: stale, dropped");
            return;
        }
        match result {
            Ok(rows) => {
                let my_user_id = self.state.session.user_id().map(str::to_string);
                let counterpart = rows
                    .iter()
                    .find(|r| {
                        my_user_id.as_deref() != Some(r.user_id.as_str())
                            && r.display_name.is_some()
                    })
                    .and_then(|r| r.display_name.clone())
                    .unwrap_or_else(|| self.counterpart_placeholder());

                if let Some(open) = self.open.as_mut() {
                    open.authors = rows
                        .into_iter()
                        .filter_map(|r| r.display_name.map(|name| (r.user_id, name)))
                        .collect();
                }
                if let Some(view) = self.state.conversation.as_mut() {
                    view.counterpart_name = counterpart;
                }
                // Author names in already-merged messages may have resolved.
                self.rebuild_message_views();
                self.emit_conversation();
            }
            Err(e) => {
                // Non-fatal: the conversation stays usable under placeholder
                // names.
                tracing::warn!(error = %e, "participant load failed");
                self.banner("Couldn't load conversation details.");
            }
        }
    }

    pub(super) fn on_history_loaded(
        &mut self,
        token: u64,
        result: Result<Vec<MessageRecord>, StoreError>,
    ) {
        if self.is_stale(token) {
            tracing::debug!(token, "history_loaded: stale, dropped");
            return;
        }
        match result {
            Ok(mut rows) => {
                let limit = self.history_limit();
                if rows.len() > limit {
                    // Keep the newest rows; the loader returns ascending order.
                    rows.drain(..rows.len() - limit);
                }
                tracing::debug!(count = rows.len(), "history loaded");
                if let Some(open) = self.open.as_mut() {
                    open.timeline.seed(rows);
                }
                if let Some(view) = self.state.conversation.as_mut() {
                    view.loading = false;
                    view.load_error = None;
                }
                self.rebuild_message_views();
                self.emit_conversation();
            }
            Err(e) => {
                // Without history the live feed would render a conversation
                // that starts mid-stream, so the channel is detached too.
                tracing::warn!(error = %e, "history load failed");
                if let Some(open) = self.open.as_mut() {
                    open.detach = None;
                }
                if let Some(view) = self.state.conversation.as_mut() {
                    view.loading = false;
                    view.load_error = Some("Couldn't load messages.".to_string());
                    view.channel = ChannelState::Detached;
                }
                self.emit_conversation();
            }
        }
    }
}
