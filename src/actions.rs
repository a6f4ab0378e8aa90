#[derive(Debug, Clone)]
pub enum AppAction {
    // Conversation lifecycle
    OpenConversation { conversation_id: String },
    CloseConversation,

    // Composer
    UpdateDraft { draft: String },
    SendMessage { body: String },

    // UI
    ClearBanner,
}

impl AppAction {
    /// Log-safe action tag (never includes message bodies or drafts).
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::OpenConversation { .. } => "OpenConversation",
            AppAction::CloseConversation => "CloseConversation",
            AppAction::UpdateDraft { .. } => "UpdateDraft",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::ClearBanner => "ClearBanner",
        }
    }
}
