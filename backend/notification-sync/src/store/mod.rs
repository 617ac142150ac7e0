/// Collaborator contracts consumed by the sync engine
///
/// - NotificationStore: persisted notifications (list/count/mutations)
/// - PreferenceService: per-user alert preferences
/// - SessionProvider: who the engine syncs for
///
/// HTTP implementations live in `http`; `SnapshotFetcher` composes the
/// count and list queries into one authoritative snapshot.
pub mod http;
pub mod snapshot;

pub use http::{HttpNotificationStore, HttpPreferenceService};
pub use snapshot::{Snapshot, SnapshotFetcher, SnapshotOrigin};

use crate::models::{Notification, NotificationId, Preferences, Session};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Persisted notification operations, scoped to a single user
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Most recent notifications, newest first, at most `limit` entries.
    async fn list(&self, user_id: Uuid, limit: usize) -> Result<Vec<Notification>, StoreError>;

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, StoreError>;

    async fn mark_read(&self, id: &NotificationId) -> Result<(), StoreError>;

    async fn mark_all_read(&self, user_id: Uuid) -> Result<(), StoreError>;

    async fn delete(&self, id: &NotificationId) -> Result<(), StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceService: Send + Sync {
    async fn get_preferences(&self, user_id: Uuid) -> Result<Preferences, StoreError>;
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_session(&self) -> Option<Session>;
}

/// Session provider pinned to one user (or to nobody)
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSessionProvider {
    session: Option<Session>,
}

impl StaticSessionProvider {
    pub fn new(user_id: Option<Uuid>) -> Self {
        Self {
            session: user_id.map(|user_id| Session { user_id }),
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn current_session(&self) -> Option<Session> {
        self.session
    }
}

/// Bound a collaborator call by `limit`, mapping elapsed time to `StoreError::Timeout`.
pub async fn with_timeout<F, T>(limit: Duration, future: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
