use crate::backend::{MessageRecord, ParticipantRecord, SessionInfo};
use crate::error::StoreError;
use crate::state::{ConversationViewState, SessionState};
use crate::AppAction;

/// State diffs streamed to the host. `rev` increases by exactly one per
/// update; a gap means the listener fell behind and should resync from the
/// `state()` snapshot.
#[derive(Clone, Debug)]
pub enum AppUpdate {
    SessionChanged {
        rev: u64,
        session: SessionState,
    },
    ConversationChanged {
        rev: u64,
        conversation: Option<ConversationViewState>,
    },
    BannerChanged {
        rev: u64,
        banner: Option<String>,
    },
    /// Navigation instruction: the caller must hand off to the external
    /// sign-in flow. The core does no further work for the open that
    /// triggered this.
    SignInRequired {
        rev: u64,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::SessionChanged { rev, .. } => *rev,
            AppUpdate::ConversationChanged { rev, .. } => *rev,
            AppUpdate::BannerChanged { rev, .. } => *rev,
            AppUpdate::SignInRequired { rev } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Results of async side effects, reported back into the actor. Every event
/// tied to a conversation open carries that open's token; a mismatched token
/// means the conversation changed underneath the operation and the result is
/// discarded.
#[derive(Debug)]
pub enum InternalEvent {
    SessionResolved {
        token: u64,
        result: Result<Option<SessionInfo>, StoreError>,
    },
    ParticipantsLoaded {
        token: u64,
        result: Result<Vec<ParticipantRecord>, StoreError>,
    },
    HistoryLoaded {
        token: u64,
        result: Result<Vec<MessageRecord>, StoreError>,
    },

    // Push channel lifecycle
    ChannelAttached {
        token: u64,
    },
    ChannelEvent {
        token: u64,
        message: MessageRecord,
    },
    ChannelLost {
        token: u64,
        reason: String,
    },

    SendFinished {
        token: u64,
        result: Result<(), StoreError>,
    },
}
