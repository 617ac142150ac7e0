use super::{ChangeFilter, ChannelSink};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("subscribe to {channel} failed: {reason}")]
    Subscribe { channel: String, reason: String },

    #[error("unknown subscription handle {0}")]
    UnknownHandle(u64),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Opaque token identifying one live subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: u64,
    pub channel_key: String,
}

/// Push-style event source (external pub/sub)
///
/// `subscribe` returns immediately; the handshake outcome arrives later as a
/// status on the sink. Implementations must stop using the sink once
/// `unsubscribe` has been called for its handle.
pub trait RealtimeEventSource: Send + Sync {
    fn subscribe(
        &self,
        channel_key: &str,
        filter: &ChangeFilter,
        sink: ChannelSink,
    ) -> Result<SubscriptionHandle, TransportError>;

    fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), TransportError>;
}
