use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vnet_peering_devkit::{PeeringBuilder, StubPage, TestHarness};
use vnet_peering_exporter::{CycleError, CycleOutcome, CycleReport, ListError, SyncSeriesPolicy};

fn peer_a() -> vnet_peering_exporter::PeeringRecord {
    PeeringBuilder::new("peerA")
        .state("Connected")
        .sync_level("FullyInSync")
        .build()
}

fn peer_b() -> vnet_peering_exporter::PeeringRecord {
    PeeringBuilder::new("peerB").state("Disconnected").build()
}

#[tokio::test]
async fn test_one_cycle_publishes_every_peering() {
    let harness = TestHarness::new();
    harness
        .lister
        .push_cycle(vec![StubPage::Records(vec![peer_a(), peer_b()])]);

    let report = harness.run_cycle().await.unwrap();

    assert_eq!(report, CycleReport { pages: 1, peerings: 2 });
    assert_eq!(harness.state("peerA"), Some(1.0));
    assert_eq!(harness.state("peerB"), Some(0.0));
    assert_eq!(harness.sync_level("peerA", "FullyInSync"), Some(1.0));
    assert_eq!(harness.sync_level("peerB", "Unknown"), Some(-1.0));

    let calls = harness.lister.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].resource_group(), "rg-network");
    assert_eq!(calls[0].vnet_name(), "vnet-hub");
}

#[tokio::test]
async fn test_every_page_is_published() {
    let harness = TestHarness::new();
    harness.lister.push_cycle(vec![
        StubPage::Records(vec![peer_a()]),
        StubPage::Records(vec![]),
        StubPage::Records(vec![peer_b()]),
    ]);

    let report = harness.run_cycle().await.unwrap();

    assert_eq!(report, CycleReport { pages: 3, peerings: 2 });
    assert_eq!(harness.state("peerA"), Some(1.0));
    assert_eq!(harness.state("peerB"), Some(0.0));
}

#[tokio::test]
async fn test_page_failure_keeps_earlier_pages() {
    let harness = TestHarness::new();
    harness.lister.push_cycle(vec![
        StubPage::Records(vec![peer_a()]),
        StubPage::Fail("429 Too Many Requests".into()),
        StubPage::Records(vec![peer_b()]),
    ]);

    let err = harness.run_cycle().await.unwrap_err();

    match err {
        CycleError::Page { completed, source } => {
            assert_eq!(completed, CycleReport { pages: 1, peerings: 1 });
            assert!(matches!(source, ListError::Provider(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.state("peerA"), Some(1.0));
    assert_eq!(harness.state("peerB"), None);
}

#[tokio::test]
async fn test_failed_cycle_leaves_last_values() {
    let harness = TestHarness::new();
    harness
        .lister
        .push_cycle(vec![StubPage::Records(vec![peer_a(), peer_b()])]);
    harness
        .lister
        .push_cycle(vec![StubPage::Fail("service unavailable".into())]);

    harness.run_cycle().await.unwrap();
    assert!(harness.run_cycle().await.is_err());

    assert_eq!(harness.state("peerA"), Some(1.0));
    assert_eq!(harness.state("peerB"), Some(0.0));
}

#[tokio::test]
async fn test_repeated_cycle_is_idempotent() {
    let harness = TestHarness::new();
    harness
        .lister
        .push_cycle(vec![StubPage::Records(vec![peer_a(), peer_b()])]);
    harness
        .lister
        .push_cycle(vec![StubPage::Records(vec![peer_a(), peer_b()])]);

    harness.run_cycle().await.unwrap();
    let first = harness.metrics.export().unwrap();
    harness.run_cycle().await.unwrap();
    let second = harness.metrics.export().unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_vanished_peering_keeps_last_value() {
    let harness = TestHarness::new();
    harness
        .lister
        .push_cycle(vec![StubPage::Records(vec![peer_a(), peer_b()])]);
    harness.lister.push_cycle(vec![StubPage::Records(vec![peer_a()])]);

    harness.run_cycle().await.unwrap();
    harness.run_cycle().await.unwrap();

    assert_eq!(harness.state("peerB"), Some(0.0));
}

#[tokio::test]
async fn test_sync_transition_retains_old_series() {
    let harness = TestHarness::with_policy(SyncSeriesPolicy::Retain);
    harness.lister.push_cycle(vec![StubPage::Records(vec![peer_a()])]);
    harness.lister.push_cycle(vec![StubPage::Records(vec![PeeringBuilder::new("peerA")
        .sync_level("LocalNotInSync")
        .build()])]);

    harness.run_cycle().await.unwrap();
    harness.run_cycle().await.unwrap();

    assert_eq!(
        harness.sync_statuses("peerA"),
        vec!["FullyInSync".to_string(), "LocalNotInSync".to_string()]
    );
    assert_eq!(harness.sync_level("peerA", "FullyInSync"), Some(1.0));
    assert_eq!(harness.sync_level("peerA", "LocalNotInSync"), Some(0.0));
}

#[tokio::test]
async fn test_sync_transition_replaces_old_series() {
    let harness = TestHarness::with_policy(SyncSeriesPolicy::Replace);
    harness.lister.push_cycle(vec![StubPage::Records(vec![peer_a()])]);
    harness.lister.push_cycle(vec![StubPage::Records(vec![PeeringBuilder::new("peerA")
        .sync_level("RemoteNotInSync")
        .build()])]);

    harness.run_cycle().await.unwrap();
    harness.run_cycle().await.unwrap();

    assert_eq!(harness.sync_statuses("peerA"), vec!["RemoteNotInSync".to_string()]);
    assert_eq!(harness.sync_level("peerA", "RemoteNotInSync"), Some(-1.0));
}

#[tokio::test]
async fn test_run_loop_counts_cycles_and_stops_on_cancel() {
    let harness = TestHarness::new();
    harness
        .lister
        .push_cycle(vec![StubPage::Records(vec![peer_a()])]);
    harness
        .lister
        .push_cycle(vec![StubPage::Fail("gateway timeout".into())]);

    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn(
        harness
            .poller(Duration::from_millis(20))
            .run(cancel.clone()),
    );

    harness
        .wait_for_cycles(3, Duration::from_secs(5))
        .await
        .unwrap();
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), loop_handle)
        .await
        .expect("poll loop did not stop")
        .unwrap();

    assert!(harness.cycles(CycleOutcome::Success) >= 2.0);
    assert_eq!(harness.cycles(CycleOutcome::Error), 1.0);
    assert_eq!(harness.state("peerA"), Some(1.0));
    assert!(harness.lister.call_count() >= 3);
}

#[tokio::test]
async fn test_cancel_during_sleep() {
    let harness = TestHarness::new();
    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn(
        harness
            .poller(Duration::from_secs(3600))
            .run(cancel.clone()),
    );

    harness
        .wait_for_cycles(1, Duration::from_secs(5))
        .await
        .unwrap();
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), loop_handle)
        .await
        .expect("poll loop did not stop while sleeping")
        .unwrap();

    assert_eq!(harness.lister.call_count(), 1);
}

#[tokio::test]
async fn test_cancel_during_hung_fetch() {
    let harness = TestHarness::new();
    harness.lister.push_cycle(vec![
        StubPage::Records(vec![peer_a()]),
        StubPage::Hang,
    ]);

    let cancel = CancellationToken::new();
    let poller = harness.poller(Duration::from_secs(300));
    let cycle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.run_cycle(&cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.state("peerA"), Some(1.0));
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), cycle)
        .await
        .expect("cycle did not observe cancellation")
        .unwrap();
    assert!(matches!(
        result,
        Err(CycleError::Cancelled(CycleReport { pages: 1, peerings: 1 }))
    ));
    assert_eq!(harness.cycles(CycleOutcome::Error), 0.0);
}
