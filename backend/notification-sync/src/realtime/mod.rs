/// Realtime push channel plumbing
///
/// The engine never talks to a concrete transport. It hands a `ChannelSink`
/// to a `RealtimeEventSource`, which reports insert events and status
/// changes back through it.
///
/// - messages: wire types (change events, channel status, sink)
/// - source: the event-source contract
/// - broadcast: in-process source used by the service binary and tests
pub mod broadcast;
pub mod messages;
pub mod source;

pub use broadcast::BroadcastEventSource;
pub use messages::{
    ChangeEvent, ChangeEventType, ChangeFilter, ChannelMessage, ChannelSignal, ChannelSink,
    ChannelStatus,
};
pub use source::{RealtimeEventSource, SubscriptionHandle, TransportError};
