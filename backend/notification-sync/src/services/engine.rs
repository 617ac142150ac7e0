/// Notification sync engine
///
/// One engine instance per mounted session. All state lives in a single task
/// that processes host commands, channel signals, poll snapshots and finished
/// requests one at a time, so the reconciliation store needs no locking.
/// I/O always runs in spawned tasks and its result is applied in a later turn.
///
/// Teardown closes the channel, stops the poller and aborts every request in
/// flight; a response that resolves afterwards has nowhere to land.
use super::connection_state::{ConnectionState, FallbackDirective};
use super::delivery::{AudioAlert, DeliveryEffectTrigger};
use super::fallback_poller::FallbackPoller;
use super::reconciliation::{MutationUndo, ReconciliationStore};
use super::subscription::{ChannelOutcome, SubscriptionManager};
use crate::config::SyncConfig;
use crate::error::{AppError, MutationAction, Result};
use crate::metrics;
use crate::models::{Notification, NotificationId, NotificationView, Preferences};
use crate::realtime::{ChannelMessage, RealtimeEventSource};
use crate::store::{
    with_timeout, NotificationStore, PreferenceService, SessionProvider, Snapshot,
    SnapshotFetcher, SnapshotOrigin, StoreError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub visible_limit: usize,
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for EngineConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            visible_limit: config.visible_limit,
            request_timeout: config.request_timeout(),
        }
    }
}

/// External collaborators the engine consumes
#[derive(Clone)]
pub struct EngineDeps {
    pub store: Arc<dyn NotificationStore>,
    pub preferences: Arc<dyn PreferenceService>,
    pub sessions: Arc<dyn SessionProvider>,
    pub events: Arc<dyn RealtimeEventSource>,
    pub audio: Arc<dyn AudioAlert>,
}

/// Point-in-time diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub user_id: Option<Uuid>,
    pub connection: ConnectionState,
    pub poller_active: bool,
    pub alerts_enabled: bool,
    pub known_notifications: usize,
}

enum Command {
    MarkRead {
        id: NotificationId,
        reply: oneshot::Sender<Result<()>>,
    },
    MarkAllRead {
        reply: oneshot::Sender<Result<()>>,
    },
    Delete {
        id: NotificationId,
        reply: oneshot::Sender<Result<()>>,
    },
    Reconnect,
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Unmount {
        reply: oneshot::Sender<()>,
    },
}

// Result of a one-shot request, applied on the engine task
enum Completion {
    Snapshot {
        origin: SnapshotOrigin,
        result: std::result::Result<Snapshot, StoreError>,
    },
    Preferences(std::result::Result<Preferences, StoreError>),
    Mutation {
        action: MutationAction,
        undo: MutationUndo,
        result: std::result::Result<(), StoreError>,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Host-side handle: reactive projection plus imperative actions
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<NotificationView>,
}

impl EngineHandle {
    /// Subscribe to projection updates.
    pub fn view(&self) -> watch::Receiver<NotificationView> {
        self.view.clone()
    }

    /// Current projection.
    pub fn current(&self) -> NotificationView {
        self.view.borrow().clone()
    }

    pub async fn mark_read(&self, id: impl Into<NotificationId>) -> Result<()> {
        let id = id.into();
        self.request(|reply| Command::MarkRead { id, reply }).await?
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        self.request(|reply| Command::MarkAllRead { reply }).await?
    }

    pub async fn delete(&self, id: impl Into<NotificationId>) -> Result<()> {
        let id = id.into();
        self.request(|reply| Command::Delete { id, reply }).await?
    }

    /// Re-open the push channel (tab visible again, network regained).
    pub async fn reconnect(&self) -> Result<()> {
        self.commands
            .send(Command::Reconnect)
            .await
            .map_err(|_| AppError::EngineStopped)
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Tear the engine down. Returns once teardown has completed.
    pub async fn unmount(&self) {
        if let Ok(()) = self.request(|reply| Command::Unmount { reply }).await {
            debug!("Notification engine unmounted");
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| AppError::EngineStopped)?;
        response.await.map_err(|_| AppError::EngineStopped)
    }
}

pub struct NotificationEngine;

impl NotificationEngine {
    /// Spawn an engine instance. Must be called within a tokio runtime.
    pub fn mount(config: EngineConfig, deps: EngineDeps) -> EngineHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (view_tx, view_rx) = watch::channel(NotificationView {
            loading: true,
            ..NotificationView::default()
        });

        tokio::spawn(run(config, deps, commands_rx, view_tx));

        EngineHandle {
            commands: commands_tx,
            view: view_rx,
        }
    }
}

async fn run(
    config: EngineConfig,
    deps: EngineDeps,
    mut commands: mpsc::Receiver<Command>,
    view_tx: watch::Sender<NotificationView>,
) {
    loop {
        if let Some(session) = deps.sessions.current_session().await {
            info!(user_id = %session.user_id, "Mounting notification engine");
            SyncSession::new(&config, &deps, session.user_id, view_tx)
                .run(&mut commands)
                .await;
            return;
        }

        info!("No active session, notification engine idle");
        view_tx.send_replace(NotificationView::default());
        if !wait_for_session(&mut commands).await {
            return;
        }
    }
}

// Serve commands without a session until a reconnect asks to look again.
// Returns false when the engine should stop.
async fn wait_for_session(commands: &mut mpsc::Receiver<Command>) -> bool {
    while let Some(command) = commands.recv().await {
        match command {
            Command::MarkRead { reply, .. }
            | Command::MarkAllRead { reply }
            | Command::Delete { reply, .. } => {
                let _ = reply.send(Err(AppError::NoSession));
            }
            Command::Status { reply } => {
                let _ = reply.send(EngineStatus {
                    user_id: None,
                    connection: ConnectionState::Idle,
                    poller_active: false,
                    alerts_enabled: false,
                    known_notifications: 0,
                });
            }
            Command::Reconnect => return true,
            Command::Unmount { reply } => {
                let _ = reply.send(());
                return false;
            }
        }
    }
    false
}

struct SyncSession {
    user_id: Uuid,
    poll_interval: Duration,
    request_timeout: Duration,
    store: Arc<dyn NotificationStore>,
    preferences: Arc<dyn PreferenceService>,
    fetcher: SnapshotFetcher,
    reconciliation: ReconciliationStore,
    subscription: SubscriptionManager,
    poller: FallbackPoller,
    delivery: DeliveryEffectTrigger,
    in_flight: JoinSet<Completion>,
    channel_rx: mpsc::UnboundedReceiver<ChannelMessage>,
    poll_rx: mpsc::UnboundedReceiver<Snapshot>,
    view_tx: watch::Sender<NotificationView>,
    loading: bool,
    mounted_at: DateTime<Utc>,
    // The initial snapshot seeded the known set without alerting
    initial_loaded: bool,
    // The last snapshot attempt failed; a reconnect refetches
    snapshot_stale: bool,
    // Push delivery was down since the last Connected; catch up on return
    push_gap: bool,
}

impl SyncSession {
    fn new(
        config: &EngineConfig,
        deps: &EngineDeps,
        user_id: Uuid,
        view_tx: watch::Sender<NotificationView>,
    ) -> Self {
        let fetcher = SnapshotFetcher::new(
            deps.store.clone(),
            user_id,
            config.visible_limit,
            config.request_timeout,
        );
        let (channel_tx, channel_rx) = mpsc::unbounded_channel();
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let subscription = SubscriptionManager::new(deps.events.clone(), channel_tx);
        let poller = FallbackPoller::new(fetcher.clone(), subscription.watch_state(), poll_tx);

        Self {
            user_id,
            poll_interval: config.poll_interval,
            request_timeout: config.request_timeout,
            store: deps.store.clone(),
            preferences: deps.preferences.clone(),
            fetcher,
            reconciliation: ReconciliationStore::new(config.visible_limit),
            subscription,
            poller,
            delivery: DeliveryEffectTrigger::new(deps.audio.clone()),
            in_flight: JoinSet::new(),
            channel_rx,
            poll_rx,
            view_tx,
            loading: true,
            mounted_at: Utc::now(),
            initial_loaded: false,
            snapshot_stale: false,
            push_gap: false,
        }
    }

    async fn run(mut self, commands: &mut mpsc::Receiver<Command>) {
        self.request_snapshot(SnapshotOrigin::Initial);
        self.load_preferences();
        let directive = self.subscription.open(self.user_id);
        self.apply_directive(directive);
        self.publish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if let ControlFlow::Break(()) = self.handle_command(command) {
                            return;
                        }
                    }
                    None => break,
                },
                Some(message) = self.channel_rx.recv() => self.handle_channel(message),
                Some(snapshot) = self.poll_rx.recv() => {
                    self.handle_snapshot(SnapshotOrigin::Poll, Ok(snapshot));
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    match joined {
                        Ok(completion) => self.handle_completion(completion),
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => error!("Notification engine request task failed: {}", e),
                    }
                }
            }
            self.publish();
        }

        self.teardown();
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::MarkRead { id, reply } => {
                let undo = self.reconciliation.mark_read(&id, Utc::now());
                let store = self.store.clone();
                self.spawn_mutation(MutationAction::MarkRead, undo, reply, async move {
                    store.mark_read(&id).await
                });
            }
            Command::MarkAllRead { reply } => {
                let undo = self.reconciliation.mark_all_read(Utc::now());
                let store = self.store.clone();
                let user_id = self.user_id;
                self.spawn_mutation(MutationAction::MarkAllRead, undo, reply, async move {
                    store.mark_all_read(user_id).await
                });
            }
            Command::Delete { id, reply } => {
                let undo = self.reconciliation.remove(&id);
                let store = self.store.clone();
                self.spawn_mutation(MutationAction::Delete, undo, reply, async move {
                    store.delete(&id).await
                });
            }
            Command::Reconnect => {
                info!(user_id = %self.user_id, "Reconnect requested");
                let directive = self.subscription.open(self.user_id);
                self.apply_directive(directive);
                if self.snapshot_stale {
                    self.request_snapshot(SnapshotOrigin::Resync);
                }
            }
            Command::Status { reply } => {
                let _ = reply.send(EngineStatus {
                    user_id: Some(self.user_id),
                    connection: self.subscription.state(),
                    poller_active: self.poller.is_running(),
                    alerts_enabled: self.delivery.alerts_enabled(),
                    known_notifications: self.reconciliation.known_count(),
                });
            }
            Command::Unmount { reply } => {
                self.teardown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_channel(&mut self, message: ChannelMessage) {
        match self.subscription.handle_message(message) {
            ChannelOutcome::Ignored => {}
            ChannelOutcome::Forward(notification) => self.handle_push(notification),
            ChannelOutcome::Transitioned(transition) => {
                self.apply_directive(transition.directive);
                if transition.changed() && transition.to.is_connected() && self.push_gap {
                    self.push_gap = false;
                    self.request_snapshot(SnapshotOrigin::Resync);
                }
            }
        }
    }

    fn handle_push(&mut self, notification: Notification) {
        match self.reconciliation.apply_push_event(notification) {
            Some(id) => {
                debug!("Push notification {} applied", id);
                metrics::record_push_event("applied");
                self.delivery.on_newly_observed(&[id]);
            }
            None => {
                metrics::record_push_event("duplicate");
            }
        }
    }

    fn handle_snapshot(
        &mut self,
        origin: SnapshotOrigin,
        result: std::result::Result<Snapshot, StoreError>,
    ) {
        match result {
            Ok(snapshot) => {
                self.snapshot_stale = false;
                // Without an initial seed, only rows created after mount are news
                let fresh: Option<HashSet<NotificationId>> = (!self.initial_loaded
                    && origin != SnapshotOrigin::Initial)
                    .then(|| {
                        snapshot
                            .notifications
                            .iter()
                            .filter(|n| n.created_at >= self.mounted_at)
                            .map(|n| n.id.clone())
                            .collect()
                    });

                let newly_observed = self.reconciliation.apply_snapshot(snapshot);
                metrics::record_snapshot(origin.as_str(), "applied");

                if origin == SnapshotOrigin::Initial {
                    debug!(
                        "Seeded with {} notification(s) from initial snapshot",
                        newly_observed.len()
                    );
                    self.initial_loaded = true;
                } else {
                    let alertable: Vec<NotificationId> = match &fresh {
                        Some(fresh) => newly_observed
                            .into_iter()
                            .filter(|id| fresh.contains(id))
                            .collect(),
                        None => newly_observed,
                    };
                    self.delivery.on_newly_observed(&alertable);
                }
            }
            Err(e) => {
                self.snapshot_stale = true;
                warn!(user_id = %self.user_id, "{} snapshot: {}", origin, AppError::Fetch(e));
                metrics::record_snapshot(origin.as_str(), "failed");
            }
        }

        if origin == SnapshotOrigin::Initial {
            self.loading = false;
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Snapshot { origin, result } => self.handle_snapshot(origin, result),
            Completion::Preferences(Ok(preferences)) => {
                debug!("Loaded preferences: {:?}", preferences);
                self.delivery.set_preferences(preferences);
            }
            Completion::Preferences(Err(e)) => {
                warn!("{}; alerts muted", AppError::PreferenceLoad(e));
                // Held alerts are discarded along with later ones
                self.delivery.set_preferences(Preferences::muted());
            }
            Completion::Mutation {
                action,
                undo,
                result,
                reply,
            } => match result {
                Ok(()) => {
                    metrics::record_mutation(action.as_str(), "ok");
                    if undo.is_outside_window() {
                        debug!("{} touched a row outside the window, resyncing", action.as_str());
                        self.request_snapshot(SnapshotOrigin::Resync);
                    }
                    let _ = reply.send(Ok(()));
                }
                Err(e) => {
                    warn!("{} failed, rolling back: {}", action.as_str(), e);
                    metrics::record_mutation(action.as_str(), "failed");
                    self.reconciliation.rollback(undo);
                    let _ = reply.send(Err(AppError::mutation(action, e)));
                }
            },
        }
    }

    fn apply_directive(&mut self, directive: FallbackDirective) {
        match directive {
            FallbackDirective::Activate => {
                self.push_gap = true;
                self.poller.start(self.poll_interval);
            }
            FallbackDirective::Deactivate => {
                self.poller.stop();
            }
            FallbackDirective::Hold => {}
        }
    }

    fn request_snapshot(&mut self, origin: SnapshotOrigin) {
        let fetcher = self.fetcher.clone();
        self.in_flight.spawn(async move {
            let result = fetcher.fetch(origin).await;
            Completion::Snapshot { origin, result }
        });
    }

    fn load_preferences(&mut self) {
        let preferences = self.preferences.clone();
        let user_id = self.user_id;
        let timeout = self.request_timeout;
        self.in_flight.spawn(async move {
            Completion::Preferences(
                with_timeout(timeout, preferences.get_preferences(user_id)).await,
            )
        });
    }

    fn spawn_mutation<F>(
        &mut self,
        action: MutationAction,
        undo: MutationUndo,
        reply: oneshot::Sender<Result<()>>,
        call: F,
    ) where
        F: Future<Output = std::result::Result<(), StoreError>> + Send + 'static,
    {
        let timeout = self.request_timeout;
        self.in_flight.spawn(async move {
            let result = with_timeout(timeout, call).await;
            Completion::Mutation {
                action,
                undo,
                result,
                reply,
            }
        });
    }

    fn publish(&self) {
        let view = self.reconciliation.view(self.loading);
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }

    fn teardown(&mut self) {
        info!(user_id = %self.user_id, "Tearing down notification engine");
        self.in_flight.abort_all();
        self.poller.stop();
        self.subscription.close();
    }
}
