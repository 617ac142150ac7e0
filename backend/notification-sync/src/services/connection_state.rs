/// Push channel connection state machine
///
/// State transitions:
/// - Idle → Connecting: channel opened
/// - Connecting → Connected | Error | TimedOut | Closed
/// - Connected → Closed | Error | TimedOut: channel lost
/// - Error | TimedOut | Closed → Connecting: re-opened externally (remount, tab visible)
/// - Error | TimedOut | Closed → Connected: transport recovered on its own
///
/// Every degraded state asks for the fallback poller; reaching Connected
/// releases it. There is no internal retry: re-entry to Connecting only
/// happens through `begin_connect`, which callers drive.
use crate::realtime::ChannelStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No channel open
    Idle,
    /// Handshake in progress
    Connecting,
    /// Receiving push events
    Connected,
    /// Transport reported an error
    Error,
    /// Handshake or heartbeat timed out
    TimedOut,
    /// Channel closed remotely or explicitly
    Closed,
}

/// What the fallback poller should do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDirective {
    Activate,
    Deactivate,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub directive: FallbackDirective,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("status {status} is not valid in state {from}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub status: ChannelStatus,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
            ConnectionState::TimedOut => "timed_out",
            ConnectionState::Closed => "closed",
        }
    }

    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }

    /// Caller-driven (re)connect; valid from any state.
    pub fn begin_connect(self) -> Transition {
        Transition {
            from: self,
            to: ConnectionState::Connecting,
            directive: FallbackDirective::Hold,
        }
    }

    /// Apply a status reported by the transport.
    pub fn on_status(self, status: ChannelStatus) -> Result<Transition, InvalidTransition> {
        use ConnectionState::*;
        use FallbackDirective::*;

        let (to, directive) = match (self, status) {
            // Status without an open channel
            (Idle, _) => return Err(InvalidTransition { from: self, status }),

            (Connecting, ChannelStatus::Connecting) => (Connecting, Hold),
            (Connected, ChannelStatus::Connecting) => {
                return Err(InvalidTransition { from: self, status })
            }
            // Transport restarting its own handshake; keep polling meanwhile
            (Error | TimedOut | Closed, ChannelStatus::Connecting) => (Connecting, Hold),

            (Connected, ChannelStatus::Connected) => (Connected, Hold),
            (Connecting | Error | TimedOut | Closed, ChannelStatus::Connected) => {
                (Connected, Deactivate)
            }

            (_, ChannelStatus::Error) => (Error, Activate),
            (_, ChannelStatus::TimedOut) => (TimedOut, Activate),
            (_, ChannelStatus::Closed) => (Closed, Activate),
        };

        Ok(Transition {
            from: self,
            to,
            directive,
        })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
