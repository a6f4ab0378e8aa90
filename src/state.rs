use chrono::{DateTime, Utc};

#[derive(Clone, Debug, PartialEq)]
pub struct AppState {
    pub rev: u64,
    pub session: SessionState,
    pub conversation: Option<ConversationViewState>,
    pub banner: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            session: SessionState::Unknown,
            conversation: None,
            banner: None,
        }
    }
}

/// Identity Gate outcome. `Unknown` until the first resolution completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unknown,
    Unauthenticated,
    Authenticated { user_id: String },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Authenticated { user_id } => Some(user_id),
            _ => None,
        }
    }
}

/// Everything the renderer needs for the currently open conversation.
/// `messages` is the Timeline Store projection: unique by id, non-decreasing
/// by sent time.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationViewState {
    pub conversation_id: String,
    pub counterpart_name: String,
    pub messages: Vec<MessageView>,
    pub loading: bool,
    pub load_error: Option<String>,
    pub channel: ChannelState,
    pub draft: String,
    pub sending: bool,
    pub send_error: Option<String>,
}

/// Live Subscription Manager lifecycle, surfaced for rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Detached,
    Attaching,
    Attached,
    Degraded { reason: String },
}

impl ChannelState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Attached)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageView {
    pub id: String,
    pub sender_id: String,
    pub author_name: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub is_mine: bool,
}

#[cfg(test)]
mod tests {
    use super::{ChannelState, SessionState};

    #[test]
    fn channel_state_liveness_mapping() {
        assert!(!ChannelState::Detached.is_live());
        assert!(!ChannelState::Attaching.is_live());
        assert!(ChannelState::Attached.is_live());
        assert!(!ChannelState::Degraded {
            reason: "socket closed".to_string(),
        }
        .is_live());
    }

    #[test]
    fn session_state_user_id_only_when_authenticated() {
        assert_eq!(SessionState::Unknown.user_id(), None);
        assert_eq!(SessionState::Unauthenticated.user_id(), None);
        let authed = SessionState::Authenticated {
            user_id: "user-1".to_string(),
        };
        assert!(authed.is_authenticated());
        assert_eq!(authed.user_id(), Some("user-1"));
    }
}
