//! Replay checks, resets and notifications relayed across the farm.

use farm_mfa_core::environment::Clock;
use farm_mfa_replay::mocks::{MockPeerClient, PeerBehavior, PeerCall, RecordingNotifier};
use farm_mfa_replay::{FarmNotification, ReplayLevel, ReplayRecord, ReplayService, ReplaySet};
use farm_mfa_testing::test_clock;
use std::net::{IpAddr, Ipv4Addr};

fn farm() -> Vec<String> {
    ["ADFS1", "adfs2", "adfs3"].map(String::from).to_vec()
}

fn service(peers: MockPeerClient) -> (ReplayService<MockPeerClient, RecordingNotifier>, RecordingNotifier) {
    let notifier = RecordingNotifier::new();
    let service = ReplayService::new("adfs1", ReplaySet::new(), peers, notifier.clone());
    (service, notifier)
}

fn record(code: &str) -> ReplayRecord {
    ReplayRecord::new(
        "alice@contoso.com",
        code,
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        test_clock().now(),
        300,
        ReplayLevel::Full,
    )
}

fn checked_servers(calls: &[PeerCall]) -> Vec<String> {
    let mut servers: Vec<String> = calls
        .iter()
        .filter_map(|call| match call {
            PeerCall::Check(server, _) => Some(server.clone()),
            _ => None,
        })
        .collect();
    servers.sort();
    servers
}

#[tokio::test]
async fn check_is_relayed_to_every_other_node_once() {
    let peers = MockPeerClient::new();
    let (service, _) = service(peers.clone());

    assert!(service.check(&farm(), record("123456")).await);

    let calls = peers.calls();
    assert_eq!(checked_servers(&calls), vec!["adfs2", "adfs3"]);
    for call in calls {
        if let PeerCall::Check(_, request) = call {
            assert!(!request.record.must_dispatch, "relayed checks must not be relayed again");
            assert_eq!(request.servers, farm());
        }
    }
    assert!(service.records().contains("alice@contoso.com", "123456"));
}

#[tokio::test]
async fn relayed_check_stays_local() {
    let peers = MockPeerClient::new();
    let (service, _) = service(peers.clone());

    assert!(service.check(&farm(), record("123456").with_dispatch(false)).await);
    assert!(peers.calls().is_empty());
}

#[tokio::test]
async fn peer_rejection_rejects_the_code() {
    let peers = MockPeerClient::new().with_peer("adfs3", PeerBehavior::Reject);
    let (service, _) = service(peers);

    assert!(!service.check(&farm(), record("123456")).await);
    // The local node still remembers the attempt
    assert!(service.records().contains("alice@contoso.com", "123456"));
}

#[tokio::test]
async fn unreachable_peer_is_ignored() {
    let peers = MockPeerClient::new().with_peer("adfs2", PeerBehavior::Unreachable);
    let (service, _) = service(peers.clone());

    assert!(service.check(&farm(), record("123456")).await);
    assert_eq!(checked_servers(&peers.calls()), vec!["adfs2", "adfs3"]);
}

#[tokio::test]
async fn local_replay_is_not_relayed() {
    let peers = MockPeerClient::new();
    let (service, _) = service(peers.clone());
    service.records().add_to_replay(record("123456"));

    assert!(!service.check(&farm(), record("123456")).await);
    assert!(peers.calls().is_empty());
}

#[tokio::test]
async fn reset_reports_each_peer() {
    let peers = MockPeerClient::new().with_peer("adfs3", PeerBehavior::Unreachable);
    let (service, _) = service(peers.clone());
    service.records().add_to_replay(record("123456"));

    let report = service.reset(&farm(), true).await;

    assert!(service.records().is_empty());
    assert_eq!(report.delivered, vec!["adfs2"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "adfs3");
    assert!(peers.calls().iter().all(|call| match call {
        PeerCall::Reset(_, request) => !request.must_dispatch,
        _ => false,
    }));
}

#[tokio::test]
async fn local_reset_sends_nothing() {
    let peers = MockPeerClient::new();
    let (service, _) = service(peers.clone());

    let report = service.reset(&farm(), false).await;

    assert!(report.delivered.is_empty());
    assert!(peers.calls().is_empty());
}

#[tokio::test]
async fn broadcast_applies_locally_and_notifies_peers() {
    let peers = MockPeerClient::new();
    let (service, notifier) = service(peers.clone());

    let report = service
        .broadcast(&farm(), FarmNotification::ReloadConfiguration)
        .await;

    assert_eq!(notifier.received(), vec![FarmNotification::ReloadConfiguration]);
    let mut delivered = report.delivered;
    delivered.sort();
    assert_eq!(delivered, vec!["adfs2", "adfs3"]);
    assert!(peers.calls().iter().all(|call| matches!(
        call,
        PeerCall::Notify(_, FarmNotification::ReloadConfiguration)
    )));
}

#[tokio::test]
async fn reset_notification_empties_the_local_list() {
    let (service, notifier) = service(MockPeerClient::new());
    service.records().add_to_replay(record("123456"));

    service.notify_local(FarmNotification::ResetReplay).await.unwrap();

    assert!(service.records().is_empty());
    assert!(notifier.received().is_empty());
}

#[tokio::test]
async fn warm_up_probes_other_nodes() {
    let peers = MockPeerClient::new().with_peer("adfs2", PeerBehavior::Unreachable);
    let (service, _) = service(peers.clone());
    service.warm_up();

    let report = service.warm_up_farm(&farm()).await;

    assert_eq!(report.delivered, vec!["adfs3"]);
    assert_eq!(report.failed[0].0, "adfs2");
    assert_eq!(service.node(), "adfs1");
}
