/// In-process realtime event source
///
/// Keeps a registry of live subscriptions keyed by channel key and routes
/// insert events to every subscriber whose filter matches. Used by the service
/// binary (events arrive over HTTP ingest) and by tests.
use super::{
    ChangeEvent, ChangeFilter, ChannelSink, ChannelStatus, RealtimeEventSource,
    SubscriptionHandle, TransportError,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

struct Subscriber {
    id: u64,
    filter: ChangeFilter,
    sink: ChannelSink,
}

#[derive(Clone)]
pub struct BroadcastEventSource {
    /// Map of channel key -> subscribers on that channel
    channels: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
    next_id: Arc<AtomicU64>,
    available: Arc<AtomicBool>,
}

impl BroadcastEventSource {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// While unavailable, new subscriptions are refused.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Route an event to matching subscribers; returns how many received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let channels = self.channels.read();
        let mut delivered = 0;

        for subscriber in channels.values().flatten() {
            if subscriber.filter.matches(&event) && subscriber.sink.emit_event(event.clone()) {
                delivered += 1;
            }
        }

        debug!(
            "Published notification {} for user {} to {} subscriber(s)",
            event.record.id, event.record.user_id, delivered
        );
        delivered
    }

    /// Report a status change on one channel.
    pub fn set_status(&self, channel_key: &str, status: ChannelStatus) -> usize {
        let channels = self.channels.read();
        channels
            .get(channel_key)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .filter(|s| s.sink.emit_status(status))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Report a status change on every channel.
    pub fn broadcast_status(&self, status: ChannelStatus) -> usize {
        let channels = self.channels.read();
        channels
            .values()
            .flatten()
            .filter(|s| s.sink.emit_status(status))
            .count()
    }

    pub fn subscriber_count(&self, channel_key: &str) -> usize {
        let channels = self.channels.read();
        channels.get(channel_key).map(|v| v.len()).unwrap_or(0)
    }

    pub fn total_subscriptions(&self) -> usize {
        let channels = self.channels.read();
        channels.values().map(|v| v.len()).sum()
    }
}

impl Default for BroadcastEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeEventSource for BroadcastEventSource {
    fn subscribe(
        &self,
        channel_key: &str,
        filter: &ChangeFilter,
        sink: ChannelSink,
    ) -> Result<SubscriptionHandle, TransportError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(TransportError::Subscribe {
                channel: channel_key.to_string(),
                reason: "source unavailable".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        sink.emit_status(ChannelStatus::Connecting);
        sink.emit_status(ChannelStatus::Connected);

        let mut channels = self.channels.write();
        channels
            .entry(channel_key.to_string())
            .or_insert_with(Vec::new)
            .push(Subscriber {
                id,
                filter: filter.clone(),
                sink,
            });

        Ok(SubscriptionHandle {
            id,
            channel_key: channel_key.to_string(),
        })
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), TransportError> {
        let mut channels = self.channels.write();
        let subscribers = channels
            .get_mut(&handle.channel_key)
            .ok_or(TransportError::UnknownHandle(handle.id))?;

        let before = subscribers.len();
        subscribers.retain(|s| s.id != handle.id);
        let removed = before != subscribers.len();

        if subscribers.is_empty() {
            channels.remove(&handle.channel_key);
        }

        if removed {
            Ok(())
        } else {
            Err(TransportError::UnknownHandle(handle.id))
        }
    }
}
