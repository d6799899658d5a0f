//! Lifecycle of the replay manager's background loops.
//!
//! Tokio time is paused; the runtime advances it whenever every task is idle.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Duration as ChronoDuration;
use farm_mfa_core::environment::Clock;
use farm_mfa_replay::mocks::{MemoryFeedCache, RecordingNotifier, StaticFeedSource};
use farm_mfa_replay::{
    FarmNotification, FeedCache, FeedConfig, FeedKind, ReplayConfig, ReplayLevel, ReplayManager,
    ReplayRecord,
};
use farm_mfa_testing::{ManualClock, test_clock};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

type TestManager = ReplayManager<StaticFeedSource, MemoryFeedCache, RecordingNotifier>;

fn manager_with(config: ReplayConfig, clock: &ManualClock) -> (TestManager, StaticFeedSource, MemoryFeedCache, RecordingNotifier) {
    let source = StaticFeedSource::new();
    let cache = MemoryFeedCache::new();
    let notifier = RecordingNotifier::new();
    let manager = ReplayManager::new(
        Arc::new(config),
        source.clone(),
        cache.clone(),
        notifier.clone(),
        Arc::new(clock.clone()),
    );
    (manager, source, cache, notifier)
}

fn record(clock: &ManualClock, window: u32) -> ReplayRecord {
    ReplayRecord::new(
        "alice",
        "123456",
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        clock.now(),
        window,
        ReplayLevel::Full,
    )
}

#[tokio::test(start_paused = true)]
async fn cleanup_loop_removes_expired_records() {
    let clock = ManualClock::new(test_clock().now());
    let config = ReplayConfig::new(std::env::temp_dir()).with_cleanup_interval(Duration::from_secs(60));
    let (manager, ..) = manager_with(config, &clock);

    assert!(manager.start());
    assert!(manager.add_to_replay(record(&clock, 30)));

    clock.advance(ChronoDuration::seconds(31));
    // Expired but the loop has not run yet
    assert_eq!(manager.records().len(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(manager.records().is_empty());
    assert!(manager.add_to_replay(record(&clock, 30)));

    manager.close();
    manager.drain().await;
}

#[tokio::test(start_paused = true)]
async fn cleanup_loop_keeps_live_records() {
    let clock = ManualClock::new(test_clock().now());
    let config = ReplayConfig::new(std::env::temp_dir()).with_cleanup_interval(Duration::from_secs(60));
    let (manager, ..) = manager_with(config, &clock);

    manager.start();
    manager.add_to_replay(record(&clock, 300));

    clock.advance(ChronoDuration::seconds(120));
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(manager.records().len(), 1);
    manager.close();
}

#[tokio::test(start_paused = true)]
async fn start_and_close_are_idempotent() {
    let clock = ManualClock::new(test_clock().now());
    let (manager, ..) = manager_with(ReplayConfig::new(std::env::temp_dir()), &clock);

    assert!(!manager.close());
    assert!(manager.start());
    assert!(!manager.start());
    assert!(manager.is_started());

    assert!(manager.close());
    assert!(!manager.close());
    assert!(!manager.is_started());

    tokio::time::timeout(Duration::from_secs(1), manager.drain())
        .await
        .expect("loops stop promptly after close");
}

#[tokio::test(start_paused = true)]
async fn manager_can_restart_after_close() {
    let clock = ManualClock::new(test_clock().now());
    let (manager, ..) = manager_with(ReplayConfig::new(std::env::temp_dir()), &clock);

    manager.start();
    manager.close();
    manager.drain().await;

    assert!(manager.start());
    manager.close();
    manager.drain().await;
}

#[test]
fn start_outside_a_runtime_fails() {
    let clock = ManualClock::new(test_clock().now());
    let (manager, ..) = manager_with(ReplayConfig::new(std::env::temp_dir()), &clock);

    assert!(!manager.start());
    assert!(!manager.is_started());
}

#[tokio::test(start_paused = true)]
async fn empty_cache_triggers_an_immediate_refresh() {
    let clock = ManualClock::new(test_clock().now());
    let config = ReplayConfig::new(std::env::temp_dir())
        .with_payload_feed(FeedConfig::new("https://feeds.example/blob.jwt"));
    let (manager, source, cache, notifier) = manager_with(config, &clock);
    let claims = URL_SAFE_NO_PAD.encode(r#"{"no":5,"nextUpdate":"2025-01-02"}"#);
    source.serve(FeedKind::Payload, format!("h.{claims}.s"));

    manager.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(source.fetches(), 1);
    assert!(cache.body_exists(FeedKind::Payload).await);
    assert_eq!(notifier.received(), vec![FarmNotification::ReloadConfiguration]);

    manager.close();
    manager.drain().await;
}

#[tokio::test(start_paused = true)]
async fn refresh_runs_again_after_the_interval() {
    let clock = ManualClock::new(test_clock().now());
    let config = ReplayConfig::new(std::env::temp_dir()).with_payload_feed(
        FeedConfig::new("https://feeds.example/blob.jwt").with_refresh_interval(Duration::from_secs(3600)),
    );
    let (manager, source, cache, _) = manager_with(config, &clock);
    let claims = URL_SAFE_NO_PAD.encode(r#"{"no":5,"nextUpdate":"2025-01-01"}"#);
    source.serve(FeedKind::Payload, format!("h.{claims}.s"));

    manager.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.fetches(), 1);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(source.fetches(), 2);
    // Same version both times
    assert_eq!(cache.writes(), 1);

    manager.close();
    manager.drain().await;
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_does_not_stop_the_loop() {
    let clock = ManualClock::new(test_clock().now());
    let config = ReplayConfig::new(std::env::temp_dir()).with_payload_feed(
        FeedConfig::new("https://feeds.example/blob.jwt").with_refresh_interval(Duration::from_secs(60)),
    );
    let (manager, source, cache, _) = manager_with(config, &clock);

    manager.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.fetches(), 1);
    assert_eq!(cache.writes(), 0);

    let claims = URL_SAFE_NO_PAD.encode(r#"{"no":6,"nextUpdate":"2025-01-01"}"#);
    source.serve(FeedKind::Payload, format!("h.{claims}.s"));
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(cache.writes(), 1);
    manager.close();
    manager.drain().await;
}
