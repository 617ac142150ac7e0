use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque notification identifier assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Mirror of a persisted notification row
///
/// The engine never creates one of these on its own; every value comes from
/// either a store query or a realtime insert event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,

    /// Recipient user ID
    pub user_id: Uuid,

    /// Notification title
    pub title: String,

    /// Notification body/message
    #[serde(alias = "message")]
    pub body: String,

    /// Read status
    #[serde(default)]
    pub is_read: bool,

    /// Timestamp when marked as read
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Optional in-app navigation target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Notification {
    /// Flag as read, keeping the earliest read timestamp if one exists.
    pub fn mark_read(&mut self, at: DateTime<Utc>) {
        if !self.is_read {
            self.is_read = true;
            self.read_at = Some(at);
        }
    }
}

/// Per-user alert preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub sound_enabled: bool,
}

impl Preferences {
    /// Preferences applied when loading fails.
    pub fn muted() -> Self {
        Self {
            sound_enabled: false,
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
        }
    }
}

/// Authenticated session as seen by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
}

/// Reactive projection handed to the host application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationView {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    pub loading: bool,
}

impl NotificationView {
    pub fn ids(&self) -> Vec<&str> {
        self.notifications.iter().map(|n| n.id.as_str()).collect()
    }
}
