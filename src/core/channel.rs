//! Live subscription lifecycle. Each conversation open owns at most one
//! subscription task; the task ends when its detach sender drops (close or
//! re-open) and always closes the channel-side subscription on the way out.

use super::AppCore;
use crate::backend::{MessageRecord, PushEvent};
use crate::state::ChannelState;
use crate::updates::{CoreMsg, InternalEvent};

impl AppCore {
    pub(super) fn attach_channel(&mut self) {
        let token = self.open_token;
        let (detach_tx, mut detach_rx) = tokio::sync::oneshot::channel::<()>();
        let conversation_id = {
            let Some(open) = self.open.as_mut() else {
                return;
            };
            open.detach = Some(detach_tx);
            open.conversation_id.clone()
        };
        if let Some(view) = self.state.conversation.as_mut() {
            view.channel = ChannelState::Attaching;
        }
        self.emit_conversation();

        let channel = self.backend.channel.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let mut sub = match channel.subscribe(&conversation_id).await {
                Ok(sub) => sub,
                Err(e) => {
                    let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ChannelLost {
                        token,
                        reason: e.to_string(),
                    })));
                    return;
                }
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ChannelAttached { token },
            )));

            loop {
                tokio::select! {
                    _ = &mut detach_rx => break,
                    event = sub.next_event() => match event {
                        Some(PushEvent::MessageInserted { message }) => {
                            let _ = tx.send(CoreMsg::Internal(Box::new(
                                InternalEvent::ChannelEvent { token, message },
                            )));
                        }
                        None => {
                            let _ = tx.send(CoreMsg::Internal(Box::new(
                                InternalEvent::ChannelLost {
                                    token,
                                    reason: "subscription stream ended".to_string(),
                                },
                            )));
                            break;
                        }
                    },
                }
            }
            sub.close().await;
        });
    }

    /// The detach handle doubles as the liveness marker for the current
    /// attach: once it is dropped (close, re-open, or the history-failure
    /// teardown) in-flight lifecycle events no longer apply, even under the
    /// same open token.
    fn channel_active(&self) -> bool {
        self.open
            .as_ref()
            .map(|open| open.detach.is_some())
            .unwrap_or(false)
    }

    pub(super) fn on_channel_attached(&mut self, token: u64) {
        if self.is_stale(token) {
            tracing::debug!(token, "channel_attached: stale, dropped");
            return;
        }
        if !self.channel_active() {
            tracing::debug!(token, "channel_attached: already detached, dropped");
            return;
        }
        tracing::debug!("channel attached");
        if let Some(view) = self.state.conversation.as_mut() {
            view.channel = ChannelState::Attached;
        }
        self.emit_conversation();
    }

    pub(super) fn on_channel_event(&mut self, token: u64, message: MessageRecord) {
        if self.is_stale(token) {
            tracing::debug!(token, message_id = %message.id, "channel_event: stale, dropped");
            return;
        }
        if !self.channel_active() {
            tracing::debug!(token, message_id = %message.id, "channel_event: already detached, dropped");
            return;
        }
        let visible = match self.open.as_mut() {
            Some(open) => open.timeline.merge(message) && open.timeline.is_seeded(),
            None => false,
        };
        // Buffered (pre-seed) and duplicate events change nothing visible.
        if visible {
            self.rebuild_message_views();
            self.emit_conversation();
        }
    }

    pub(super) fn on_channel_lost(&mut self, token: u64, reason: String) {
        if self.is_stale(token) {
            tracing::debug!(token, "channel_lost: stale, dropped");
            return;
        }
        if !self.channel_active() {
            tracing::debug!(token, "channel_lost: already detached, dropped");
            return;
        }
        tracing::warn!(reason = %reason, "channel lost");
        if let Some(open) = self.open.as_mut() {
            open.detach = None;
        }
        if let Some(view) = self.state.conversation.as_mut() {
            view.channel = ChannelState::Degraded { reason };
        }
        self.emit_conversation();
        self.banner("Live updates interrupted.");
    }
}
