/*!
Poll cycle harness

Wires a [`StubLister`] and a private [`PeeringMetrics`] into a [`Poller`] and
offers lookups on the published gauges, so poll loop tests read like the
scrape output they check.
*/

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use vnet_peering_exporter::metrics::{CYCLES_TOTAL, PEERING_STATE, PEERING_SYNC_LEVEL};
use vnet_peering_exporter::{
    CycleError, CycleOutcome, CycleReport, PeeringMetrics, PeeringTarget, Poller, SyncSeriesPolicy,
};

use crate::stub_lister::StubLister;

pub const TEST_RESOURCE_GROUP: &str = "rg-network";
pub const TEST_VNET: &str = "vnet-hub";

pub struct TestHarness {
    pub lister: StubLister,
    pub metrics: Arc<PeeringMetrics>,
    pub target: PeeringTarget,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_policy(SyncSeriesPolicy::Retain)
    }

    pub fn with_policy(policy: SyncSeriesPolicy) -> Self {
        init_test_tracing();

        Self {
            lister: StubLister::new(),
            metrics: Arc::new(
                PeeringMetrics::new(policy).expect("metrics registry for tests"),
            ),
            target: PeeringTarget::new(TEST_RESOURCE_GROUP, TEST_VNET)
                .expect("static test target"),
        }
    }

    /// A poller sharing this harness' lister and metrics
    pub fn poller(&self, interval: Duration) -> Poller {
        Poller::new(
            Arc::new(self.lister.clone()),
            Arc::clone(&self.metrics),
            self.target.clone(),
            interval,
        )
    }

    /// Run exactly one cycle (no sleep, no cancellation)
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        self.poller(Duration::from_secs(300))
            .run_cycle(&CancellationToken::new())
            .await
    }

    /// `azure_vnet_peering_state` for one peering of the test target
    pub fn state(&self, peering: &str) -> Option<f64> {
        self.metrics.sample(
            PEERING_STATE,
            &[
                ("resource_group", TEST_RESOURCE_GROUP),
                ("vnet_name", TEST_VNET),
                ("peering_name", peering),
            ],
        )
    }

    /// `azure_vnet_peering_sync_level` for one peering and sync status
    pub fn sync_level(&self, peering: &str, sync_status: &str) -> Option<f64> {
        self.metrics.sample(
            PEERING_SYNC_LEVEL,
            &[
                ("resource_group", TEST_RESOURCE_GROUP),
                ("vnet_name", TEST_VNET),
                ("peering_name", peering),
                ("sync_status", sync_status),
            ],
        )
    }

    /// Every sync status label currently exported for `peering`, sorted
    pub fn sync_statuses(&self, peering: &str) -> Vec<String> {
        let mut statuses: Vec<String> = self
            .metrics
            .series(PEERING_SYNC_LEVEL)
            .into_iter()
            .filter(|(labels, _)| labels.iter().any(|(k, v)| k == "peering_name" && v == peering))
            .filter_map(|(labels, _)| {
                labels
                    .into_iter()
                    .find(|(k, _)| k == "sync_status")
                    .map(|(_, v)| v)
            })
            .collect();
        statuses.sort();
        statuses
    }

    pub fn cycles(&self, outcome: CycleOutcome) -> f64 {
        self.metrics
            .sample(CYCLES_TOTAL, &[("result", outcome.as_label())])
            .unwrap_or(0.0)
    }

    /// Wait until at least `count` cycles (any outcome) have been recorded
    pub async fn wait_for_cycles(&self, count: usize, timeout: Duration) -> Result<()> {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            let done = self.cycles(CycleOutcome::Success) + self.cycles(CycleOutcome::Error);
            if done as usize >= count {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        anyhow::bail!("timed out waiting for {count} poll cycles");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
