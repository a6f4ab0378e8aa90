use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::backend::Backend;
use crate::state::{AppState, MessageView};
use crate::timeline::Timeline;
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

mod channel;
mod composer;
mod config;
mod conversation;
mod session;

use config::{load_app_config, AppConfig};

pub(crate) const DEFAULT_COUNTERPART_NAME: &str = "Conversation";
pub(crate) const DEFAULT_AUTHOR_NAME: &str = "Community member";
pub(crate) const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Actor-internal bookkeeping for the one conversation currently open. The
/// renderable projection lives in `state.conversation`; this holds what the
/// renderer never sees.
struct OpenConversation {
    conversation_id: String,
    timeline: Timeline,
    // sender user_id -> display name, from the participant rows
    authors: HashMap<String, String>,
    // Dropping this ends the subscription task, which closes the channel.
    detach: Option<tokio::sync::oneshot::Sender<()>>,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    backend: Backend,
    config: AppConfig,
    runtime: tokio::runtime::Runtime,

    open: Option<OpenConversation>,
    // Bumped on every open/close. Async results carry the token they were
    // started under; a mismatch means the result belongs to a previous open.
    open_token: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        backend: Backend,
    ) -> Self {
        let config = load_app_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            backend,
            config,
            runtime,
            open: None,
            open_token: 0,
        };

        // Ensure App.state() has an immediately-available snapshot.
        this.commit_state();
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn emit(&mut self, update: AppUpdate) {
        self.commit_state();
        let _ = self.update_sender.send(update);
    }

    fn commit_state(&self) {
        let snapshot = self.state.clone();
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot,
            Err(poison) => *poison.into_inner() = snapshot,
        }
    }

    fn emit_session(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::SessionChanged {
            rev,
            session: self.state.session.clone(),
        });
    }

    fn emit_conversation(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::ConversationChanged {
            rev,
            conversation: self.state.conversation.clone(),
        });
    }

    fn emit_banner(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::BannerChanged {
            rev,
            banner: self.state.banner.clone(),
        });
    }

    fn emit_sign_in_required(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::SignInRequired { rev });
    }

    fn banner(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI explicitly clears it, so rev-gap resyncs
        // via the state() snapshot still show it.
        self.state.banner = Some(msg.into());
        self.emit_banner();
    }

    fn is_stale(&self, token: u64) -> bool {
        token != self.open_token
    }

    /// Rebuild the renderable message list from the timeline and author map.
    fn rebuild_message_views(&mut self) {
        let Some(open) = self.open.as_ref() else {
            return;
        };
        let my_user_id = self.state.session.user_id().map(str::to_string);
        let fallback = self.author_placeholder();
        let views: Vec<MessageView> = open
            .timeline
            .messages()
            .iter()
            .map(|m| MessageView {
                id: m.id.clone(),
                sender_id: m.sender_id.clone(),
                author_name: open
                    .authors
                    .get(&m.sender_id)
                    .cloned()
                    .unwrap_or_else(|| fallback.clone()),
                body: m.body.clone(),
                sent_at: m.created_at,
                is_mine: my_user_id.as_deref() == Some(m.sender_id.as_str()),
            })
            .collect();
        if let Some(view) = self.state.conversation.as_mut() {
            view.messages = views;
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Tags only; drafts and bodies stay out of the logs.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::OpenConversation { conversation_id } => {
                self.open_conversation(&conversation_id);
            }
            AppAction::CloseConversation => {
                self.close_conversation();
            }
            AppAction::UpdateDraft { draft } => {
                let changed = match self.state.conversation.as_mut() {
                    Some(view) => {
                        let changed = view.draft != draft;
                        view.draft = draft;
                        changed
                    }
                    None => false,
                };
                if changed {
                    self.emit_conversation();
                }
            }
            AppAction::SendMessage { body } => {
                self.send_message(&body);
            }
            AppAction::ClearBanner => {
                if self.state.banner.take().is_some() {
                    self.emit_banner();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::SessionResolved { token, result } => {
                self.on_session_resolved(token, result);
            }
            InternalEvent::ParticipantsLoaded { token, result } => {
                self.on_participants_loaded(token, result);
            }
            InternalEvent::HistoryLoaded { token, result } => {
                self.on_history_loaded(token, result);
            }
            InternalEvent::ChannelAttached { token } => {
                self.on_channel_attached(token);
            }
            InternalEvent::ChannelEvent { token, message } => {
                self.on_channel_event(token, message);
            }
            InternalEvent::ChannelLost { token, reason } => {
                self.on_channel_lost(token, reason);
            }
            InternalEvent::SendFinished { token, result } => {
                self.on_send_finished(token, result);
            }
        }
    }
}
