/// Message types exchanged between a realtime event source and the engine
use crate::models::Notification;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Row-level change kinds a source may deliver
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeEventType {
    Insert,
    Update,
    Delete,
}

/// A single change pushed by the source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    #[serde(rename = "eventType")]
    pub event_type: ChangeEventType,
    pub record: Notification,
}

impl ChangeEvent {
    pub fn insert(record: Notification) -> Self {
        Self {
            event_type: ChangeEventType::Insert,
            record,
        }
    }
}

/// Connection status reported by the source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connecting,
    Connected,
    Error,
    TimedOut,
    Closed,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Connected => "connected",
            ChannelStatus::Error => "error",
            ChannelStatus::TimedOut => "timed_out",
            ChannelStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side filter restricting a channel to one user's inserts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    pub event: ChangeEventType,
    pub schema: String,
    pub table: String,
    pub user_id: Uuid,
}

impl ChangeFilter {
    pub fn user_inserts(user_id: Uuid) -> Self {
        Self {
            event: ChangeEventType::Insert,
            schema: "public".to_string(),
            table: "notifications".to_string(),
            user_id,
        }
    }

    /// Filter expression in `column=eq.value` form.
    pub fn expression(&self) -> String {
        format!("user_id=eq.{}", self.user_id)
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.event_type == self.event && event.record.user_id == self.user_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    Event(ChangeEvent),
    Status(ChannelStatus),
}

/// A signal tagged with the generation of the channel that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub generation: u64,
    pub signal: ChannelSignal,
}

/// Callback side of a subscription, handed to the source on subscribe
///
/// Sends never block and never fail loudly: once the owning engine is gone,
/// signals are dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    generation: u64,
    tx: mpsc::UnboundedSender<ChannelMessage>,
}

impl ChannelSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<ChannelMessage>) -> Self {
        Self { generation, tx }
    }

    pub fn emit_event(&self, event: ChangeEvent) -> bool {
        self.emit(ChannelSignal::Event(event))
    }

    pub fn emit_status(&self, status: ChannelStatus) -> bool {
        self.emit(ChannelSignal::Status(status))
    }

    fn emit(&self, signal: ChannelSignal) -> bool {
        self.tx
            .send(ChannelMessage {
                generation: self.generation,
                signal,
            })
            .is_ok()
    }
}
