/// Engine integration tests
///
/// This test module covers:
/// - Initial load, push delivery, degrade-and-poll, local mutations
/// - At-most-once alerts across push and poll
/// - Poller/channel mutual exclusion and reconnect
/// - Teardown while requests are in flight
/// - Failed initial loads and late preference loads
/// - Sessionless mounts
mod common;

use common::*;
use notification_sync::realtime::{ChangeEvent, ChannelStatus};
use notification_sync::store::StaticSessionProvider;
use notification_sync::error::MutationAction;
use notification_sync::{AppError, BroadcastEventSource, ConnectionState, Preferences};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn seeded(user_id: Uuid, count: i64) -> Arc<FakeStore> {
    FakeStore::with_rows((1..=count).map(|seq| notification(user_id, seq)).collect())
}

#[tokio::test(start_paused = true)]
async fn test_initial_load_populates_view() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 3));
    harness.ready().await;

    let view = harness.engine.current();
    assert!(!view.loading);
    assert_eq!(view.unread_count, 3);
    assert_eq!(view.ids(), vec!["3", "2", "1"]);

    // Pre-existing notifications are not announced
    assert_eq!(harness.audio.plays(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_push_while_connected() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 3));
    harness.ready().await;

    assert_eq!(harness.push(notification(user_id, 4)), 1);

    let mut view = harness.engine.view();
    view.wait_for(|v| v.unread_count == 4).await.unwrap();
    assert_eq!(harness.engine.current().ids(), vec!["4", "3", "2", "1"]);
    assert_eq!(harness.audio.plays(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_degrade_then_poll_reconciles() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 3));
    harness.ready().await;

    harness.push(notification(user_id, 4));
    let mut view = harness.engine.view();
    view.wait_for(|v| v.unread_count == 4).await.unwrap();

    harness.store.set_list_cap(Some(3));
    harness
        .source
        .set_status(&harness.channel_key(), ChannelStatus::TimedOut);

    let status = wait_for_status(&harness.engine, |s| s.poller_active).await;
    assert_eq!(status.connection, ConnectionState::TimedOut);

    view.wait_for(|v| v.ids() == vec!["4", "3", "2"]).await.unwrap();
    assert_eq!(harness.engine.current().unread_count, 4);
    // 4 was already known from the push
    assert_eq!(harness.audio.plays(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_stops_poller_in_same_turn() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 2));
    harness.ready().await;

    let key = harness.channel_key();
    harness.source.set_status(&key, ChannelStatus::Error);
    wait_for_status(&harness.engine, |s| s.poller_active).await;

    harness.source.set_status(&key, ChannelStatus::Connected);
    let status = wait_for_status(&harness.engine, |s| s.connection.is_connected()).await;
    assert!(!status.poller_active);
}

#[tokio::test(start_paused = true)]
async fn test_connected_and_polling_never_overlap() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 2));
    harness.ready().await;

    let key = harness.channel_key();
    let statuses = [
        ChannelStatus::Error,
        ChannelStatus::Connected,
        ChannelStatus::TimedOut,
        ChannelStatus::Connecting,
        ChannelStatus::Connected,
        ChannelStatus::Closed,
        ChannelStatus::Connected,
    ];

    for status in statuses {
        harness.source.set_status(&key, status);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = harness.engine.status().await.unwrap();
        assert!(
            !(snapshot.connection.is_connected() && snapshot.poller_active),
            "poller running while connected after {}",
            status
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_missed_inserts_caught_up_on_recovery() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 2));
    harness.ready().await;

    let key = harness.channel_key();
    harness.source.set_status(&key, ChannelStatus::Closed);
    wait_for_status(&harness.engine, |s| s.poller_active).await;

    // Inserted while push was down, recovered before the first poll tick
    harness.store.insert(notification(user_id, 3));
    harness.source.set_status(&key, ChannelStatus::Connected);

    let mut view = harness.engine.view();
    view.wait_for(|v| v.unread_count == 3).await.unwrap();
    assert_eq!(harness.engine.current().ids(), vec!["3", "2", "1"]);
    assert_eq!(harness.audio.plays(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_each_notification_alerts_once_across_channels() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 2));
    harness.ready().await;
    let mut view = harness.engine.view();
    let key = harness.channel_key();

    // Redelivered push
    harness.push(notification(user_id, 3));
    harness
        .source
        .publish(ChangeEvent::insert(notification(user_id, 3)));
    view.wait_for(|v| v.unread_count == 3).await.unwrap();

    // Missed while degraded, picked up by polling
    harness.source.set_status(&key, ChannelStatus::Error);
    harness.store.insert(notification(user_id, 4));
    harness.store.insert(notification(user_id, 5));
    view.wait_for(|v| v.ids().first() == Some(&"5")).await.unwrap();

    // Back online: resync and a late push of an already polled id
    harness.source.set_status(&key, ChannelStatus::Connected);
    wait_for_status(&harness.engine, |s| s.connection.is_connected()).await;
    settle().await;
    harness
        .source
        .publish(ChangeEvent::insert(notification(user_id, 5)));
    harness.push(notification(user_id, 6));
    view.wait_for(|v| v.ids().first() == Some(&"6")).await.unwrap();

    // 3, 4, 5 and 6 exactly once each
    assert_eq!(harness.audio.plays(), 4);
    assert_eq!(harness.engine.current().unread_count, 6);
    assert_eq!(harness.engine.current().notifications.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_mark_read_decrements() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 4));
    harness.ready().await;

    harness.engine.mark_read("2").await.unwrap();

    let view = harness.engine.current();
    assert_eq!(view.unread_count, 3);
    let second = view
        .notifications
        .iter()
        .find(|n| n.id.as_str() == "2")
        .unwrap();
    assert!(second.is_read);
    assert!(second.read_at.is_some());
    assert_eq!(harness.store.is_read("2"), Some(true));

    // Already read: no further change
    harness.engine.mark_read("2").await.unwrap();
    assert_eq!(harness.engine.current().unread_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_mark_read_failure_rolls_back() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 3));
    harness.ready().await;
    harness.store.fail_mutations(true);

    let err = harness.engine.mark_read("3").await.unwrap_err();
    match &err {
        AppError::Mutation { action, .. } => assert_eq!(*action, MutationAction::MarkRead),
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().starts_with("could not mark as read"));

    let view = harness.engine.current();
    assert_eq!(view.unread_count, 3);
    assert!(view.notifications.iter().all(|n| !n.is_read));
}

#[tokio::test(start_paused = true)]
async fn test_mark_all_read_and_delete() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 3));
    harness.ready().await;

    harness.engine.delete("1").await.unwrap();
    let view = harness.engine.current();
    assert_eq!(view.ids(), vec!["3", "2"]);
    assert_eq!(view.unread_count, 2);
    assert_eq!(harness.store.row_count(), 2);

    harness.engine.mark_all_read().await.unwrap();
    let view = harness.engine.current();
    assert_eq!(view.unread_count, 0);
    assert!(view.notifications.iter().all(|n| n.is_read));

    // A deleted id pushed again is still known
    harness
        .source
        .publish(ChangeEvent::insert(notification(user_id, 1)));
    harness.push(notification(user_id, 4));
    let mut rx = harness.engine.view();
    rx.wait_for(|v| v.unread_count == 1).await.unwrap();
    assert_eq!(harness.engine.current().ids(), vec!["4", "3", "2"]);
    assert_eq!(harness.audio.plays(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delete_failure_restores_item() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 3));
    harness.ready().await;
    harness.store.fail_mutations(true);

    let err = harness.engine.delete("2").await.unwrap_err();
    assert!(err.to_string().starts_with("could not delete notification"));

    let view = harness.engine.current();
    assert_eq!(view.ids(), vec!["3", "2", "1"]);
    assert_eq!(view.unread_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_during_poll_tick() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 3));
    harness.ready().await;

    harness
        .source
        .set_status(&harness.channel_key(), ChannelStatus::TimedOut);
    wait_for_status(&harness.engine, |s| s.poller_active).await;

    let before = harness.store.list_calls.load(Ordering::SeqCst);
    harness.store.hold_lists();
    harness.store.insert(notification(user_id, 4));
    while harness.store.list_calls.load(Ordering::SeqCst) == before {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    let view = harness.engine.view();
    harness.engine.unmount().await;
    harness.store.release_lists();
    tokio::time::sleep(POLL_INTERVAL * 3).await;

    assert_eq!(view.borrow().ids(), vec!["3", "2", "1"]);
    assert_eq!(view.borrow().unread_count, 3);
    assert_eq!(harness.audio.plays(), 0);
    assert_eq!(harness.source.total_subscriptions(), 0);
    // No further tick after teardown
    assert_eq!(harness.store.list_calls.load(Ordering::SeqCst), before + 1);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_releases_channel() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 1));
    harness.ready().await;
    assert_eq!(harness.source.subscriber_count(&harness.channel_key()), 1);

    harness.engine.unmount().await;

    assert_eq!(harness.source.total_subscriptions(), 0);
    assert!(matches!(
        harness.engine.mark_read("1").await,
        Err(AppError::EngineStopped)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_remount_gets_fresh_channel() {
    let user_id = Uuid::new_v4();
    let store = seeded(user_id, 2);
    let source = BroadcastEventSource::new();
    let sessions = Arc::new(StaticSessionProvider::new(Some(user_id)));

    let first = Harness::mount_with(store.clone(), source.clone(), sessions.clone(), user_id);
    first.ready().await;
    first.engine.unmount().await;

    let second = Harness::mount_with(store, source.clone(), sessions, user_id);
    second.ready().await;
    assert_eq!(source.total_subscriptions(), 1);

    // Known set starts over, but the initial load still does not alert
    assert_eq!(second.audio.plays(), 0);
    second.push(notification(user_id, 3));
    let mut view = second.engine.view();
    view.wait_for(|v| v.unread_count == 3).await.unwrap();
    assert_eq!(second.audio.plays(), 1);
    assert_eq!(first.audio.plays(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_failure_falls_back_to_polling() {
    let user_id = Uuid::new_v4();
    let source = BroadcastEventSource::new();
    source.set_available(false);
    let harness = Harness::mount_with(
        seeded(user_id, 2),
        source,
        Arc::new(StaticSessionProvider::new(Some(user_id))),
        user_id,
    );

    let status = wait_for_status(&harness.engine, |s| s.poller_active).await;
    assert_eq!(status.connection, ConnectionState::Error);

    // Polling keeps the view current while push is unavailable
    harness.store.insert(notification(user_id, 3));
    let mut view = harness.engine.view();
    view.wait_for(|v| v.unread_count == 3).await.unwrap();
    assert_eq!(harness.audio.plays(), 1);

    harness.source.set_available(true);
    harness.engine.reconnect().await.unwrap();
    let status = wait_for_status(&harness.engine, |s| s.connection.is_connected()).await;
    assert!(!status.poller_active);
    assert_eq!(harness.source.total_subscriptions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_initial_load_failure_clears_loading() {
    let user_id = Uuid::new_v4();
    let store = seeded(user_id, 2);
    store.fail_reads(true);
    let harness = Harness::mount(user_id, store);

    let mut view = harness.engine.view();
    view.wait_for(|v| !v.loading).await.unwrap();
    assert!(harness.engine.current().notifications.is_empty());
    assert_eq!(harness.engine.current().unread_count, 0);

    // Next natural trigger: a reconnect after the channel dropped
    harness.store.fail_reads(false);
    harness
        .source
        .set_status(&harness.channel_key(), ChannelStatus::Closed);
    harness
        .source
        .set_status(&harness.channel_key(), ChannelStatus::Connected);
    view.wait_for(|v| v.unread_count == 2).await.unwrap();

    // Both rows predate the mount
    assert_eq!(harness.audio.plays(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_refetches_after_failed_initial_load() {
    let user_id = Uuid::new_v4();
    let store = seeded(user_id, 3);
    store.fail_reads(true);
    let harness = Harness::mount(user_id, store);
    harness.ready().await;
    assert_eq!(harness.engine.current().unread_count, 0);

    harness.store.fail_reads(false);
    harness.engine.reconnect().await.unwrap();

    let mut view = harness.engine.view();
    view.wait_for(|v| v.unread_count == 3).await.unwrap();
    assert_eq!(harness.engine.current().ids(), vec!["3", "2", "1"]);
    assert_eq!(harness.audio.plays(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_outage_insert_alerts_after_failed_initial_load() {
    let user_id = Uuid::new_v4();
    let store = seeded(user_id, 2);
    store.fail_reads(true);
    let harness = Harness::mount(user_id, store);
    harness.ready().await;

    // Created while the store was unreachable, never pushed
    harness.store.insert(fresh_notification(user_id, 3));
    harness.store.fail_reads(false);
    harness
        .source
        .set_status(&harness.channel_key(), ChannelStatus::Closed);

    let mut view = harness.engine.view();
    view.wait_for(|v| v.unread_count == 3).await.unwrap();
    assert_eq!(harness.engine.current().ids(), vec!["3", "2", "1"]);
    assert_eq!(harness.audio.plays(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_push_before_preferences_load_still_alerts() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount_with_preferences(
        seeded(user_id, 3),
        BroadcastEventSource::new(),
        Arc::new(StaticSessionProvider::new(Some(user_id))),
        Arc::new(DelayedPreferences {
            delay: Duration::from_secs(2),
            preferences: Preferences::default(),
        }),
        user_id,
    );

    let mut view = harness.engine.view();
    view.wait_for(|v| !v.loading).await.unwrap();
    let status = wait_for_status(&harness.engine, |s| s.connection.is_connected()).await;
    assert!(!status.alerts_enabled);

    harness.push(notification(user_id, 4));
    view.wait_for(|v| v.unread_count == 4).await.unwrap();
    assert_eq!(harness.audio.plays(), 0);

    wait_for_status(&harness.engine, |s| s.alerts_enabled).await;
    assert_eq!(harness.audio.plays(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_mark_read_outside_window_refreshes_count() {
    let user_id = Uuid::new_v4();
    let harness = Harness::mount(user_id, seeded(user_id, 7));
    harness.ready().await;
    assert_eq!(harness.engine.current().ids(), vec!["7", "6", "5", "4", "3"]);
    assert_eq!(harness.engine.current().unread_count, 7);

    harness.engine.mark_read("1").await.unwrap();

    let mut view = harness.engine.view();
    view.wait_for(|v| v.unread_count == 6).await.unwrap();
    assert_eq!(harness.store.is_read("1"), Some(true));
    assert_eq!(harness.engine.current().ids(), vec!["7", "6", "5", "4", "3"]);
    assert_eq!(harness.audio.plays(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_session_stays_idle() {
    let harness = Harness::mount_with(
        FakeStore::with_rows(Vec::new()),
        BroadcastEventSource::new(),
        Arc::new(StaticSessionProvider::new(None)),
        Uuid::nil(),
    );

    let mut view = harness.engine.view();
    view.wait_for(|v| !v.loading).await.unwrap();
    assert!(harness.engine.current().notifications.is_empty());

    assert!(matches!(
        harness.engine.mark_read("1").await,
        Err(AppError::NoSession)
    ));
    assert!(matches!(
        harness.engine.mark_all_read().await,
        Err(AppError::NoSession)
    ));

    let status = harness.engine.status().await.unwrap();
    assert_eq!(status.connection, ConnectionState::Idle);
    assert_eq!(status.user_id, None);
    assert_eq!(harness.source.total_subscriptions(), 0);
    assert_eq!(harness.store.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_sign_in() {
    let user_id = Uuid::new_v4();
    let sessions = Arc::new(SwitchableSession::default());
    let harness = Harness::mount_with(
        seeded(user_id, 2),
        BroadcastEventSource::new(),
        sessions.clone(),
        user_id,
    );
    wait_for_status(&harness.engine, |s| s.connection == ConnectionState::Idle).await;

    sessions.sign_in(user_id);
    harness.engine.reconnect().await.unwrap();

    let status = wait_for_status(&harness.engine, |s| s.connection.is_connected()).await;
    assert_eq!(status.user_id, Some(user_id));

    let mut view = harness.engine.view();
    view.wait_for(|v| !v.loading && v.unread_count == 2)
        .await
        .unwrap();
    assert_eq!(harness.engine.current().ids(), vec!["2", "1"]);
}
