use thiserror::Error;

/// Failures reported by the external collaborators (identity provider,
/// store of record, push channel).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Backend(String),
}

/// Composer precondition and delivery failures, checked in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("no conversation selected")]
    NoConversation,
    #[error("message is empty")]
    EmptyBody,
    #[error("send failed: {0}")]
    Store(#[from] StoreError),
}
