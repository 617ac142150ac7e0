/// Subscription manager: exactly one realtime channel per session
///
/// Owns the channel handle, the connection state and the generation counter
/// used to discard signals from channels that have already been released.
/// Novelty decisions are not made here; inserts are forwarded as-is.
use super::connection_state::{ConnectionState, FallbackDirective, Transition};
use crate::error::AppError;
use crate::metrics;
use crate::models::Notification;
use crate::realtime::{
    ChangeEventType, ChangeFilter, ChannelMessage, ChannelSignal, ChannelSink,
    RealtimeEventSource, SubscriptionHandle,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Deterministic channel key for a user's notification inserts.
pub fn channel_key(user_id: Uuid) -> String {
    format!("notifications:{}", user_id)
}

/// Result of handling one channel message
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    /// Stale, foreign or out-of-state message
    Ignored,
    /// Insert to hand to the reconciliation store
    Forward(Notification),
    /// Connection state moved
    Transitioned(Transition),
}

pub struct SubscriptionManager {
    source: Arc<dyn RealtimeEventSource>,
    sink_tx: mpsc::UnboundedSender<ChannelMessage>,
    handle: Option<SubscriptionHandle>,
    user_id: Option<Uuid>,
    generation: u64,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
}

impl SubscriptionManager {
    /// Channel signals are delivered to `sink_tx`.
    pub fn new(
        source: Arc<dyn RealtimeEventSource>,
        sink_tx: mpsc::UnboundedSender<ChannelMessage>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            source,
            sink_tx,
            handle: None,
            user_id: None,
            generation: 0,
            state: ConnectionState::Idle,
            state_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Open a channel for `user_id`, releasing any prior one first.
    ///
    /// A subscribe failure is not an error for the caller: it lands the
    /// state in `Error` and the returned directive asks for polling.
    pub fn open(&mut self, user_id: Uuid) -> FallbackDirective {
        self.release();

        self.generation += 1;
        self.user_id = Some(user_id);
        self.apply(self.state.begin_connect());

        let key = channel_key(user_id);
        let filter = ChangeFilter::user_inserts(user_id);
        let sink = ChannelSink::new(self.generation, self.sink_tx.clone());

        match self.source.subscribe(&key, &filter, sink) {
            Ok(handle) => {
                info!(
                    "Subscribed to {} ({}), generation {}",
                    key,
                    filter.expression(),
                    self.generation
                );
                self.handle = Some(handle);
                FallbackDirective::Hold
            }
            Err(e) => {
                warn!("{}; degrading to polling", AppError::from(e));
                self.apply(Transition {
                    from: self.state,
                    to: ConnectionState::Error,
                    directive: FallbackDirective::Activate,
                });
                FallbackDirective::Activate
            }
        }
    }

    /// Release the channel. Safe to call repeatedly or with nothing open.
    pub fn close(&mut self) {
        if self.release() {
            self.apply(Transition {
                from: self.state,
                to: ConnectionState::Closed,
                directive: FallbackDirective::Hold,
            });
        }
    }

    pub fn handle_message(&mut self, message: ChannelMessage) -> ChannelOutcome {
        if message.generation != self.generation || self.handle.is_none() {
            debug!(
                "Dropping signal from released channel generation {}",
                message.generation
            );
            return ChannelOutcome::Ignored;
        }

        match message.signal {
            ChannelSignal::Status(status) => match self.state.on_status(status) {
                Ok(transition) => {
                    self.apply(transition);
                    ChannelOutcome::Transitioned(transition)
                }
                Err(e) => {
                    warn!("Ignoring channel status: {}", e);
                    ChannelOutcome::Ignored
                }
            },
            ChannelSignal::Event(event) => {
                if !self.state.is_connected() {
                    debug!("Event received while {}, ignoring", self.state);
                    metrics::record_push_event("ignored");
                    return ChannelOutcome::Ignored;
                }
                if event.event_type != ChangeEventType::Insert {
                    metrics::record_push_event("ignored");
                    return ChannelOutcome::Ignored;
                }
                if Some(event.record.user_id) != self.user_id {
                    warn!(
                        "Dropping notification {} addressed to another user",
                        event.record.id
                    );
                    metrics::record_push_event("ignored");
                    return ChannelOutcome::Ignored;
                }
                ChannelOutcome::Forward(event.record)
            }
        }
    }

    // Unsubscribe the current handle, if any. Returns whether one was open.
    fn release(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };

        // Bump so late signals from this channel are dropped
        self.generation += 1;
        if let Err(e) = self.source.unsubscribe(&handle) {
            warn!("Failed to release channel {}: {}", handle.channel_key, AppError::Transport(e));
        } else {
            debug!("Released channel {}", handle.channel_key);
        }
        true
    }

    fn apply(&mut self, transition: Transition) {
        if transition.changed() {
            info!("Realtime channel: {} → {}", transition.from, transition.to);
            metrics::record_connection_transition(transition.to.as_str());
        }
        self.state = transition.to;
        self.state_tx.send_replace(transition.to);
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.release();
    }
}
