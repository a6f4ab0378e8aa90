//! Message composition. Sends are serialized per conversation (one in flight),
//! and the core never echoes its own message locally: the insert comes back
//! over the live channel and lands through the same dedup path as everyone
//! else's.

use super::AppCore;
use crate::backend::NewMessage;
use crate::error::{SendError, StoreError};
use crate::state::SessionState;
use crate::updates::{CoreMsg, InternalEvent};

const SIGN_IN_TO_SEND: &str = "Please sign in to send messages.";

/// Precondition checks, in order: identity, target, content. The first
/// failure wins.
fn validate_send(
    session: &SessionState,
    conversation_id: Option<&str>,
    body: &str,
) -> Result<(), SendError> {
    if !session.is_authenticated() {
        return Err(SendError::Unauthenticated);
    }
    if conversation_id.is_none() {
        return Err(SendError::NoConversation);
    }
    if body.trim().is_empty() {
        return Err(SendError::EmptyBody);
    }
    Ok(())
}

impl AppCore {
    pub(super) fn send_message(&mut self, body: &str) {
        let conversation_id = self
            .state
            .conversation
            .as_ref()
            .map(|v| v.conversation_id.clone());

        match validate_send(&self.state.session, conversation_id.as_deref(), body) {
            Ok(()) => {}
            Err(SendError::Unauthenticated) => {
                if let Some(view) = self.state.conversation.as_mut() {
                    view.send_error = Some(SIGN_IN_TO_SEND.to_string());
                    self.emit_conversation();
                } else {
                    self.banner(SIGN_IN_TO_SEND);
                }
                return;
            }
            Err(SendError::NoConversation) => {
                tracing::debug!("send_message: no conversation open");
                return;
            }
            Err(SendError::EmptyBody) => {
                return;
            }
            Err(SendError::Store(_)) => unreachable!("validation does not touch the store"),
        }

        let Some(conversation_id) = conversation_id else {
            return;
        };
        let Some(sender_id) = self.state.session.user_id().map(str::to_string) else {
            return;
        };

        let in_flight = self
            .state
            .conversation
            .as_ref()
            .map(|v| v.sending)
            .unwrap_or(false);
        if in_flight {
            tracing::debug!("send_message: send already in flight");
            return;
        }

        if let Some(view) = self.state.conversation.as_mut() {
            view.sending = true;
            view.send_error = None;
        }
        self.emit_conversation();

        let token = self.open_token;
        let message = NewMessage {
            conversation_id,
            sender_id,
            body: body.trim().to_string(),
        };
        let store = self.backend.store.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = store.insert_message(message).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendFinished {
                token,
                result,
            })));
        });
    }

    pub(super) fn on_send_finished(&mut self, token: u64, result: Result<(), StoreError>) {
        if self.is_stale(token) {
            tracing::debug!(token, "send_finished: stale, dropped");
            return;
        }
        {
            let Some(view) = self.state.conversation.as_mut() else {
                return;
            };
            view.sending = false;
            match result {
                Ok(()) => {
                    // Draft only clears on success; a failed send keeps the
                    // text for retry.
                    view.draft.clear();
                    view.send_error = None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "send failed");
                    view.send_error = Some(SendError::from(e).to_string());
                }
            }
        }
        self.emit_conversation();
    }
}
