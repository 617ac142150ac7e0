use super::{with_timeout, NotificationStore, StoreError};
use crate::models::Notification;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Where a snapshot came from. Informational only: merging is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotOrigin {
    /// Mount-time load
    Initial,
    /// Fallback poller tick
    Poll,
    /// Catch-up after the push channel recovered
    Resync,
}

impl SnapshotOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotOrigin::Initial => "initial",
            SnapshotOrigin::Poll => "poll",
            SnapshotOrigin::Resync => "resync",
        }
    }
}

impl fmt::Display for SnapshotOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative view of the top-N notifications plus the unread count
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    pub origin: SnapshotOrigin,
}

/// Fetches snapshots for one user
#[derive(Clone)]
pub struct SnapshotFetcher {
    store: Arc<dyn NotificationStore>,
    user_id: Uuid,
    limit: usize,
    timeout: Duration,
}

impl SnapshotFetcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        user_id: Uuid,
        limit: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            user_id,
            limit,
            timeout,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Count and list are requested concurrently; either failing fails the snapshot.
    pub async fn fetch(&self, origin: SnapshotOrigin) -> Result<Snapshot, StoreError> {
        let count = with_timeout(self.timeout, self.store.count_unread(self.user_id));
        let list = with_timeout(self.timeout, self.store.list(self.user_id, self.limit));
        let (count, notifications) = futures::try_join!(count, list)?;

        Ok(Snapshot {
            notifications,
            unread_count: count.max(0) as u64,
            origin,
        })
    }
}
