#![allow(dead_code)]
/// Shared fakes for engine integration tests
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use notification_sync::realtime::ChangeEvent;
use notification_sync::store::{StaticSessionProvider, StoreError};
use notification_sync::{
    AlertError, AudioAlert, BroadcastEventSource, EngineConfig, EngineDeps, EngineHandle,
    EngineStatus, Notification, NotificationEngine, NotificationId, NotificationStore,
    PreferenceService, Preferences, Session, SessionProvider,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        poll_interval: POLL_INTERVAL,
        visible_limit: 5,
        request_timeout: Duration::from_secs(10),
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// Unread notification whose creation time grows with `seq`
pub fn notification(user_id: Uuid, seq: i64) -> Notification {
    Notification {
        id: NotificationId::new(seq.to_string()),
        user_id,
        title: format!("Order #{}", 1000 + seq),
        body: format!("Installment {} is due", seq),
        is_read: false,
        read_at: None,
        created_at: base_time() + ChronoDuration::minutes(seq),
        link: Some(format!("/orders/{}", 1000 + seq)),
    }
}

/// Unread notification created after any engine mounted so far
pub fn fresh_notification(user_id: Uuid, seq: i64) -> Notification {
    Notification {
        created_at: Utc::now() + ChronoDuration::seconds(seq),
        ..notification(user_id, seq)
    }
}

#[derive(Default)]
struct StoreState {
    rows: Vec<Notification>,
    // Caps list responses below the requested limit
    list_cap: Option<usize>,
}

/// In-memory notification store with call counters, failure injection and
/// a gate that holds list calls in flight.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
    fail_reads: AtomicBool,
    fail_mutations: AtomicBool,
    hold_lists: AtomicBool,
    release: Notify,
    pub list_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
    pub mutation_calls: AtomicUsize,
}

impl FakeStore {
    pub fn with_rows(rows: Vec<Notification>) -> Arc<Self> {
        let store = Self::default();
        store.state.lock().rows = rows;
        Arc::new(store)
    }

    pub fn insert(&self, notification: Notification) {
        self.state.lock().rows.push(notification);
    }

    pub fn set_list_cap(&self, cap: Option<usize>) {
        self.state.lock().list_cap = cap;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    /// Block every subsequent list call until `release_lists`.
    pub fn hold_lists(&self) {
        self.hold_lists.store(true, Ordering::SeqCst);
    }

    pub fn release_lists(&self) {
        self.hold_lists.store(false, Ordering::SeqCst);
        self.release.notify_waiters();
    }

    pub fn is_read(&self, id: &str) -> Option<bool> {
        self.state
            .lock()
            .rows
            .iter()
            .find(|n| n.id.as_str() == id)
            .map(|n| n.is_read)
    }

    pub fn row_count(&self) -> usize {
        self.state.lock().rows.len()
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Request("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_mutations(&self) -> Result<(), StoreError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for FakeStore {
    async fn list(&self, user_id: Uuid, limit: usize) -> Result<Vec<Notification>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_lists.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.check_reads()?;

        let state = self.state.lock();
        let mut rows: Vec<Notification> = state
            .rows
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(state.list_cap.map_or(limit, |cap| cap.min(limit)));
        Ok(rows)
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, StoreError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;

        let state = self.state.lock();
        Ok(state
            .rows
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), StoreError> {
        self.check_mutations()?;
        let mut state = self.state.lock();
        if let Some(row) = state.rows.iter_mut().find(|n| &n.id == id) {
            row.mark_read(Utc::now());
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.check_mutations()?;
        let mut state = self.state.lock();
        for row in state.rows.iter_mut().filter(|n| n.user_id == user_id) {
            row.mark_read(Utc::now());
        }
        Ok(())
    }

    async fn delete(&self, id: &NotificationId) -> Result<(), StoreError> {
        self.check_mutations()?;
        self.state.lock().rows.retain(|n| &n.id != id);
        Ok(())
    }
}

pub struct FixedPreferences(pub Result<Preferences, StoreError>);

#[async_trait]
impl PreferenceService for FixedPreferences {
    async fn get_preferences(&self, _user_id: Uuid) -> Result<Preferences, StoreError> {
        self.0.clone()
    }
}

/// Preferences that resolve only after `delay`
pub struct DelayedPreferences {
    pub delay: Duration,
    pub preferences: Preferences,
}

#[async_trait]
impl PreferenceService for DelayedPreferences {
    async fn get_preferences(&self, _user_id: Uuid) -> Result<Preferences, StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.preferences)
    }
}

/// Session provider whose user can be swapped mid-test
#[derive(Default)]
pub struct SwitchableSession {
    user_id: Mutex<Option<Uuid>>,
}

impl SwitchableSession {
    pub fn sign_in(&self, user_id: Uuid) {
        *self.user_id.lock() = Some(user_id);
    }
}

#[async_trait]
impl SessionProvider for SwitchableSession {
    async fn current_session(&self) -> Option<Session> {
        self.user_id.lock().map(|user_id| Session { user_id })
    }
}

#[derive(Default)]
pub struct CountingAlert {
    plays: AtomicUsize,
}

impl CountingAlert {
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

impl AudioAlert for CountingAlert {
    fn play(&self) -> Result<(), AlertError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub user_id: Uuid,
    pub engine: EngineHandle,
    pub store: Arc<FakeStore>,
    pub source: BroadcastEventSource,
    pub audio: Arc<CountingAlert>,
}

impl Harness {
    /// Mount an engine for `user_id` over `store` with sound enabled.
    pub fn mount(user_id: Uuid, store: Arc<FakeStore>) -> Self {
        Self::mount_with(
            store,
            BroadcastEventSource::new(),
            Arc::new(StaticSessionProvider::new(Some(user_id))),
            user_id,
        )
    }

    pub fn mount_with(
        store: Arc<FakeStore>,
        source: BroadcastEventSource,
        sessions: Arc<dyn SessionProvider>,
        user_id: Uuid,
    ) -> Self {
        Self::mount_with_preferences(
            store,
            source,
            sessions,
            Arc::new(FixedPreferences(Ok(Preferences::default()))),
            user_id,
        )
    }

    pub fn mount_with_preferences(
        store: Arc<FakeStore>,
        source: BroadcastEventSource,
        sessions: Arc<dyn SessionProvider>,
        preferences: Arc<dyn PreferenceService>,
        user_id: Uuid,
    ) -> Self {
        let audio = Arc::new(CountingAlert::default());
        let engine = NotificationEngine::mount(
            engine_config(),
            EngineDeps {
                store: store.clone(),
                preferences,
                sessions,
                events: Arc::new(source.clone()),
                audio: audio.clone(),
            },
        );

        Self {
            user_id,
            engine,
            store,
            source,
            audio,
        }
    }

    /// Push an insert through the event source, mirroring it in the store.
    pub fn push(&self, notification: Notification) -> usize {
        self.store.insert(notification.clone());
        self.source.publish(ChangeEvent::insert(notification))
    }

    pub fn channel_key(&self) -> String {
        notification_sync::channel_key(self.user_id)
    }

    /// Wait until initial load finished, the channel is up and preferences loaded.
    pub async fn ready(&self) -> EngineStatus {
        let mut view = self.engine.view();
        view.wait_for(|v| !v.loading).await.unwrap();
        wait_for_status(&self.engine, |s| s.connection.is_connected() && s.alerts_enabled).await
    }
}

/// Poll engine diagnostics until `predicate` holds.
pub async fn wait_for_status(
    engine: &EngineHandle,
    predicate: impl Fn(&EngineStatus) -> bool,
) -> EngineStatus {
    for _ in 0..1000 {
        let status = engine.status().await.expect("engine should be running");
        if predicate(&status) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("engine status never reached the expected condition");
}

/// Let the engine drain everything already queued.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
