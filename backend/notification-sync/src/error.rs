use crate::realtime::TransportError;
use crate::store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Host-facing action that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationAction {
    MarkRead,
    MarkAllRead,
    Delete,
}

impl MutationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationAction::MarkRead => "mark_read",
            MutationAction::MarkAllRead => "mark_all_read",
            MutationAction::Delete => "delete",
        }
    }

    /// Message suitable for showing to an end user.
    pub fn failure_message(&self) -> &'static str {
        match self {
            MutationAction::MarkRead => "could not mark as read",
            MutationAction::MarkAllRead => "could not mark all as read",
            MutationAction::Delete => "could not delete notification",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("realtime transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("fetch failed: {0}")]
    Fetch(StoreError),

    #[error("{}: {source}", .action.failure_message())]
    Mutation {
        action: MutationAction,
        #[source]
        source: StoreError,
    },

    #[error("failed to load preferences: {0}")]
    PreferenceLoad(StoreError),

    #[error("no active session")]
    NoSession,

    #[error("notification engine is no longer running")]
    EngineStopped,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AppError {
    pub fn mutation(action: MutationAction, source: StoreError) -> Self {
        AppError::Mutation { action, source }
    }
}
