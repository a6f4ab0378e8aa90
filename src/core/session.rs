//! Identity resolution. Runs once per conversation open; the rest of the open
//! sequence (participants, history, channel) only starts after a session is
//! confirmed.

use super::AppCore;
use crate::backend::SessionInfo;
use crate::error::StoreError;
use crate::state::SessionState;
use crate::updates::{CoreMsg, InternalEvent};

impl AppCore {
    pub(super) fn resolve_identity(&mut self) {
        let token = self.open_token;
        let sessions = self.backend.sessions.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = sessions.current_session().await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::SessionResolved { token, result },
            )));
        });
    }

    pub(super) fn on_session_resolved(
        &mut self,
        token: u64,
        result: Result<Option<SessionInfo>, StoreError>,
    ) {
        if self.is_stale(token) {
            tracing::debug!(token, "session_resolved: stale, dropped");
            return;
        }
        match result {
            Ok(Some(info)) => {
                tracing::info!(user_id = %info.user_id, "session resolved");
                let next = SessionState::Authenticated {
                    user_id: info.user_id,
                };
                if self.state.session != next {
                    self.state.session = next;
                    self.emit_session();
                }
                self.start_conversation_loads();
            }
            Ok(None) => {
                tracing::info!("no active session, sign-in required");
                self.abandon_open_for_sign_in();
            }
            Err(e) => {
                // Treated like a missing session; the sign-in flow re-resolves.
                tracing::warn!(error = %e, "session resolution failed");
                self.banner("Could not confirm your session.");
                self.abandon_open_for_sign_in();
            }
        }
    }

    /// No usable session: drop the open in progress and hand the caller off to
    /// the external sign-in flow.
    fn abandon_open_for_sign_in(&mut self) {
        self.open = None;
        self.open_token += 1;
        if self.state.session != SessionState::Unauthenticated {
            self.state.session = SessionState::Unauthenticated;
            self.emit_session();
        }
        if self.state.conversation.take().is_some() {
            self.emit_conversation();
        }
        self.emit_sign_in_required();
    }
}
